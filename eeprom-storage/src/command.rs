//! Object-dictionary write glue for OD 1010h (Store parameters) and OD 1011h
//! (Restore default parameters) (spec §4.5-§4.6, §6).
//!
//! Grounded in `zencan_node::storage::StorageCommandObject`/`StorageContext`
//! for the shape of an OD-facing collaborator type that holds a callback into
//! the engine, and in `zencan_common::sdo::AbortCode` for the abort-code
//! family an OD server reports back to the writing client on failure.

use int_enum::IntEnum;

use crate::engine::{StorageEngine, StorageError};
use crate::device::EepromDevice;

/// Four-byte ASCII magic word that must accompany a Store/Restore write.
const SAVE_MAGIC: [u8; 4] = *b"save";
const LOAD_MAGIC: [u8; 4] = *b"load";

/// Abort code families an OD server reports for a failed Store/Restore
/// write, matching `zencan_common::sdo::AbortCode`'s numeric values.
#[derive(Clone, Copy, Debug, PartialEq, IntEnum)]
#[repr(u32)]
pub enum StorageAbort {
    /// Sub-index does not exist, or is reserved (< 2).
    NoSuchSubIndex = 0x0609_0011,
    /// Payload was not the expected magic word.
    IncompatibleParameter = 0x0604_0043,
    /// EEPROM device was too small for a registered entry.
    ResourceNotAvailable = 0x060A_0023,
    /// The save or restore's device I/O or verify-read failed.
    HardwareError = 0x0606_0000,
}

impl From<StorageError> for StorageAbort {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IllegalArgument => StorageAbort::NoSuchSubIndex,
            StorageError::OutOfMemory => StorageAbort::ResourceNotAvailable,
            StorageError::DataCorrupt | StorageError::HardwareError => {
                StorageAbort::HardwareError
            }
        }
    }
}

/// Which OD object a [`StorageCommand`] answers writes for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// OD 1010h.
    Store,
    /// OD 1011h.
    Restore,
}

/// OD-facing handler for 1010h/1011h writes, delegating to a
/// [`StorageEngine`] (spec §6's "object-dictionary collaborator").
pub struct StorageCommand<'engine, 'entries, D> {
    engine: &'engine mut StorageEngine<'entries, D>,
    kind: Kind,
}

impl<'engine, 'entries, D> StorageCommand<'engine, 'entries, D>
where
    D: EepromDevice,
{
    pub fn new(engine: &'engine mut StorageEngine<'entries, D>, kind: Kind) -> Self {
        Self { engine, kind }
    }

    /// Handle a write to sub-index `sub` with payload `data`.
    pub fn on_write(&mut self, sub: u8, data: &[u8]) -> Result<(), StorageAbort> {
        if sub < 2 {
            return Err(StorageAbort::NoSuchSubIndex);
        }
        let expected = match self.kind {
            Kind::Store => &SAVE_MAGIC,
            Kind::Restore => &LOAD_MAGIC,
        };
        if data != expected {
            return Err(StorageAbort::IncompatibleParameter);
        }
        let result = match self.kind {
            Kind::Store => self.engine.save(sub),
            Kind::Restore => self.engine.restore(sub),
        };
        result.map_err(StorageAbort::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryAttr, StorageEntry};

    struct FakeEeprom {
        bytes: [u8; 64],
        next_free: usize,
    }

    impl FakeEeprom {
        fn new() -> Self {
            Self {
                bytes: [0xFFu8; 64],
                next_free: 0,
            }
        }
    }

    impl EepromDevice for FakeEeprom {
        fn init(&mut self) -> bool {
            true
        }
        fn alloc(&mut self, _is_auto: bool, size: usize, overflow: &mut bool) -> usize {
            let addr = self.next_free;
            if addr + size > self.bytes.len() {
                *overflow = true;
            }
            self.next_free += size;
            addr
        }
        fn read_block(&mut self, dst: &mut [u8], addr: usize) {
            dst.copy_from_slice(&self.bytes[addr..addr + dst.len()]);
        }
        fn write_block(&mut self, src: &[u8], addr: usize) -> bool {
            self.bytes[addr..addr + src.len()].copy_from_slice(src);
            true
        }
        fn update_byte(&mut self, byte: u8, addr: usize) -> bool {
            self.bytes[addr] = byte;
            true
        }
        fn crc_block(&mut self, addr: usize, len: usize) -> u16 {
            crc16::State::<crc16::XMODEM>::calculate(&self.bytes[addr..addr + len])
        }
    }

    #[test]
    fn wrong_magic_is_incompatible_parameter() {
        let mut ram = [0u8; 4];
        let mut entries = [StorageEntry::new(&mut ram, EntryAttr::RESTORE, 2).unwrap()];
        let mut engine = StorageEngine::new(FakeEeprom::new(), &mut entries);
        let _ = engine.init();
        let mut cmd = StorageCommand::new(&mut engine, Kind::Store);
        assert_eq!(
            cmd.on_write(2, b"nope"),
            Err(StorageAbort::IncompatibleParameter)
        );
    }

    #[test]
    fn reserved_sub_index_is_no_such_sub_index() {
        let mut ram = [0u8; 4];
        let mut entries = [StorageEntry::new(&mut ram, EntryAttr::RESTORE, 2).unwrap()];
        let mut engine = StorageEngine::new(FakeEeprom::new(), &mut entries);
        let _ = engine.init();
        let mut cmd = StorageCommand::new(&mut engine, Kind::Store);
        assert_eq!(cmd.on_write(1, b"save"), Err(StorageAbort::NoSuchSubIndex));
    }

    #[test]
    fn save_magic_dispatches_to_matching_entry() {
        let mut ram = [0x5Au8; 4];
        let mut entries = [StorageEntry::new(&mut ram, EntryAttr::RESTORE, 2).unwrap()];
        let mut engine = StorageEngine::new(FakeEeprom::new(), &mut entries);
        let _ = engine.init();
        let mut cmd = StorageCommand::new(&mut engine, Kind::Store);
        assert_eq!(cmd.on_write(2, b"save"), Ok(()));
    }
}
