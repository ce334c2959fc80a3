//! Fastscan: identify an unconfigured slave's 128-bit identity via bitwise
//! binary search, without foreknowledge of its identity (spec §4.3).
//!
//! Ground truth for the bit order, VERIFY re-send, and next-field wraparound
//! is `CO_LSSmaster_IdentifyFastscan` / `CO_LSSmaster_FsSearchNext` in the
//! original CANopenNode source; `zencan_client::LssMaster::fast_scan` and
//! `zencan_node::lss::LssSlave` (the slave side of the same exchange) ground
//! the Rust idiom for the loop shape.

/// How a single identity field participates in a Fastscan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Binary-search scan for this field's value
    Scan,
    /// Skip scanning; verify against a caller-supplied value instead
    Match,
    /// Skip this field entirely (at most two of the four fields may be
    /// `Skip`, and vendor ID may never be `Skip`)
    Skip,
}

/// Index of one of the four 32-bit identity fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LssSub {
    /// Vendor ID
    Vendor = 0,
    /// Product code
    Product = 1,
    /// Revision number
    Rev = 2,
    /// Serial number
    Serial = 3,
}

impl LssSub {
    pub(crate) fn from_index(i: u8) -> Self {
        match i {
            0 => LssSub::Vendor,
            1 => LssSub::Product,
            2 => LssSub::Rev,
            _ => LssSub::Serial,
        }
    }
}

/// A Fastscan request: per-field scan mode and, for `Match` fields, the
/// pre-known value to verify against.
#[derive(Debug, Clone, Copy)]
pub struct FastscanRequest {
    /// Scan mode for each of the four fields, in vendor/product/rev/serial
    /// order
    pub mode: [ScanMode; 4],
    /// Match value for fields in `Match` mode (ignored for `Scan`/`Skip`)
    pub match_value: [u32; 4],
}

impl FastscanRequest {
    /// Validate the request against spec §4.3's constraints: vendor ID must
    /// not be `Skip`, and at most two of the four fields may be `Skip`.
    pub(crate) fn validate(&self) -> bool {
        if self.mode[0] == ScanMode::Skip {
            return false;
        }
        let skipped = self.mode.iter().filter(|m| **m == ScanMode::Skip).count();
        skipped <= 2
    }
}

/// The resolved identity fields after a successful Fastscan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FastscanResult {
    /// Vendor ID
    pub vendor_id: u32,
    /// Product code
    pub product_code: u32,
    /// Revision number
    pub revision: u32,
    /// Serial number
    pub serial: u32,
}

impl FastscanResult {
    pub(crate) fn set(&mut self, sub: LssSub, value: u32) {
        match sub {
            LssSub::Vendor => self.vendor_id = value,
            LssSub::Product => self.product_code = value,
            LssSub::Rev => self.revision = value,
            LssSub::Serial => self.serial = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FsPhase {
    Check,
    Scan,
    Verify,
}

/// Internal Fastscan sub-state: `(phase, lssSub, bitChecked, idNumber)`
/// (spec §3).
#[derive(Debug, Clone, Copy)]
pub(crate) struct FastscanState {
    pub phase: FsPhase,
    pub lss_sub: u8,
    pub bit_checked: u8,
    pub id_number: u32,
    pub found: FastscanResult,
    /// Latched across CHECK-phase calls: a CHECK ack can arrive on any tick
    /// before the window elapses, not only the final one (spec §9's
    /// documented "wait full window" behavior).
    pub check_ack: bool,
}

impl FastscanState {
    pub(crate) fn new() -> Self {
        Self {
            phase: FsPhase::Check,
            lss_sub: 0,
            bit_checked: 0,
            id_number: 0,
            found: FastscanResult::default(),
            check_ack: false,
        }
    }

    /// Scan `lss_sub + 1 ..= 3` for the next non-`Skip` field. If none
    /// remains, wrap back to vendor (0), which the slave interprets as "enter
    /// LSS configuration mode" (spec §4.3.4).
    pub(crate) fn search_next(&self, request: &FastscanRequest) -> u8 {
        for i in (self.lss_sub + 1)..=3 {
            if request.mode[i as usize] != ScanMode::Skip {
                return i;
            }
        }
        0
    }
}
