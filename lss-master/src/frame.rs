//! Wire format for LSS frames.
//!
//! Every LSS frame is exactly 8 data bytes. Byte 0 is the command specifier
//! (CS); remaining layout is per-service. Multi-byte fields are little-endian
//! on the wire, regardless of host endianness.

use int_enum::IntEnum;

/// An 11-bit or 29-bit CAN identifier.
///
/// LSS only ever uses standard 11-bit identifiers (spec §6), but the type
/// carries the extended variant too so it composes with a real CAN driver's
/// identifier type without a wrapper conversion at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanId {
    /// An extended 29-bit identifier
    Extended(u32),
    /// A standard 11-bit identifier
    Std(u16),
}

impl CanId {
    /// Get the raw identifier value
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }
}

/// An 8-byte LSS frame, ready for transmission or as received from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LssFrame {
    /// The identifier this frame was sent/received on
    pub id: CanId,
    /// The 8-byte payload. Unused bytes are always zero.
    pub data: [u8; 8],
}

impl LssFrame {
    pub(crate) fn new(id: CanId, data: [u8; 8]) -> Self {
        Self { id, data }
    }
}

/// All LSS command specifier values used by the master (spec §6).
///
/// Values not relevant to the master (e.g. slave-only responses used only as
/// confirmations) are still enumerated here since the master must recognize
/// them on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
#[repr(u8)]
pub enum LssCommandSpecifier {
    /// Switch the LSS mode of all slaves (global)
    SwitchGlobal = 0x04,
    /// Set node ID of the slave(s) in configuration state
    CfgNodeId = 0x11,
    /// Set the bit timing of the slave(s) in configuration state
    CfgBitTiming = 0x13,
    /// Command slaves to activate a new bit rate
    CfgActivateBitTiming = 0x15,
    /// Command the slave(s) in configuration state to store their config
    CfgStore = 0x17,
    /// Select slave(s) by vendor ID
    SelVendor = 0x40,
    /// Select slave(s) by product code
    SelProduct = 0x41,
    /// Select slave(s) by revision number
    SelRev = 0x42,
    /// Select slave(s) by serial number; triggers the confirmation on match
    SelSerial = 0x43,
    /// Confirmation that a slave recognized its identity and switched state
    Sel = 0x44,
    /// Confirmation to a Fastscan probe
    IdentSlave = 0x4F,
    /// Fastscan binary-search probe
    IdentFastscan = 0x51,
    /// Inquire vendor ID
    InquireVendor = 0x5A,
    /// Inquire product code
    InquireProduct = 0x5B,
    /// Inquire revision number
    InquireRev = 0x5C,
    /// Inquire serial number
    InquireSerial = 0x5D,
}

impl LssFrame {
    /// Build a frame with only the CS byte set
    pub(crate) fn cs_only(id: CanId, cs: LssCommandSpecifier) -> Self {
        let mut data = [0u8; 8];
        data[0] = u8::from(cs);
        Self { id, data }
    }

    /// Build a frame with CS followed by a little-endian u32 in bytes 1..5
    pub(crate) fn cs_u32(id: CanId, cs: LssCommandSpecifier, value: u32) -> Self {
        let mut data = [0u8; 8];
        data[0] = u8::from(cs);
        data[1..5].copy_from_slice(&value.to_le_bytes());
        Self { id, data }
    }
}
