//! Save/restore/init/auto-save procedures (spec §4.5-§4.8).
//!
//! Grounded directly in `storeEeprom`/`restoreEeprom`/`CO_storageEeprom_init`/
//! `CO_storageEeprom_auto_process` in `original_source/storage/CO_storageEeprom.c`.
//! One deliberate deviation from the original's mechanics, not its
//! semantics: where the C source reads the whole entries-count-sized
//! signature table into a variable-length stack array up front, this engine
//! reads each entry's 4-byte signature individually as it processes that
//! entry. Same bytes off the same device, no stack array sized by a runtime
//! entry count.

use defmt_or_log::{debug, warn};
use snafu::Snafu;

use crate::device::EepromDevice;
use crate::entry::{EntryAttr, StorageEntry};

/// Storage-engine-level errors (spec §7).
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum StorageError {
    /// No entries were registered.
    #[snafu(display("no storage entries registered"))]
    IllegalArgument,
    /// The EEPROM adapter failed to initialize, or one or more entries
    /// failed their signature/CRC check at init.
    #[snafu(display("storage data is corrupt"))]
    DataCorrupt,
    /// The EEPROM device is too small to hold the registered entries.
    #[snafu(display("eeprom is too small for the registered entries"))]
    OutOfMemory,
    /// A save or restore's device I/O or read-back-verify failed.
    #[snafu(display("eeprom read/write/verify failed"))]
    HardwareError,
}

/// Reliable block-oriented persistence layer over an EEPROM-like device
/// (spec §2).
pub struct StorageEngine<'a, D> {
    device: D,
    entries: &'a mut [StorageEntry<'a>],
    enabled: bool,
    /// Bit `i` set means the entry with `sub_index_od == min(i, 31)` was
    /// corrupt at the last `init()`, or `0xFFFF_FFFF` if the device itself
    /// failed to initialize (spec §4.7).
    init_error: u32,
}

impl<'a, D> StorageEngine<'a, D>
where
    D: EepromDevice,
{
    /// Construct a new engine over `entries`, not yet initialized.
    pub fn new(device: D, entries: &'a mut [StorageEntry<'a>]) -> Self {
        Self {
            device,
            entries,
            enabled: false,
            init_error: 0,
        }
    }

    /// Bitmask accumulated by the last `init()` call (spec §4.7's
    /// `storageInitError`).
    pub fn init_error(&self) -> u32 {
        self.init_error
    }

    /// Whether `init()` completed without a fatal error (entries may still
    /// individually be marked corrupt in `init_error()`).
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Bring up the EEPROM device, allocate space for every registered
    /// entry, and load persisted data into RAM (spec §4.7).
    pub fn init(&mut self) -> Result<(), StorageError> {
        self.enabled = false;
        self.init_error = 0;

        if self.entries.is_empty() {
            return IllegalArgumentSnafu.fail();
        }
        if !self.device.init() {
            self.init_error = 0xFFFF_FFFF;
            return DataCorruptSnafu.fail();
        }

        let mut overflow = false;
        let signatures_base = self
            .device
            .alloc(false, self.entries.len() * 4, &mut overflow);

        let mut had_corruption = false;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.eeprom_addr_signature = signatures_base + 4 * i;
            entry.eeprom_addr = self.device.alloc(
                entry.attr.contains(EntryAttr::AUTO),
                entry.data.len(),
                &mut overflow,
            );
            entry.offset = 0;

            if overflow {
                self.init_error = i as u32;
                return OutOfMemorySnafu.fail();
            }

            let mut sig_buf = [0u8; 4];
            self.device.read_block(&mut sig_buf, entry.eeprom_addr_signature);
            let signature = u32::from_le_bytes(sig_buf);
            let sig_len = (signature & 0xFFFF) as usize;
            entry.crc = (signature >> 16) as u16;

            let corrupt = if sig_len != entry.data.len() {
                true
            } else {
                self.device.read_block(entry.data, entry.eeprom_addr);
                if entry.attr.contains(EntryAttr::AUTO) {
                    // AUTO entries are written byte-incrementally without a
                    // signature update and may be mid-write across a reset;
                    // skip CRC verification and accept best-effort recovery.
                    false
                } else {
                    let crc = crc16::State::<crc16::XMODEM>::calculate(entry.data);
                    crc != entry.crc
                }
            };

            if corrupt {
                let bit = entry.sub_index_od.min(31);
                self.init_error |= 1u32 << bit;
                had_corruption = true;
                warn!("storage entry {} is corrupt", entry.sub_index_od);
            }
        }

        self.enabled = true;
        if had_corruption {
            DataCorruptSnafu.fail()
        } else {
            Ok(())
        }
    }

    /// Save the RAM region backing `sub_index_od`'s entry to EEPROM (spec
    /// §4.5).
    pub fn save(&mut self, sub_index_od: u8) -> Result<(), StorageError> {
        let device = &mut self.device;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.sub_index_od == sub_index_od)
            .ok_or(StorageError::IllegalArgument)?;

        let crc = crc16::State::<crc16::XMODEM>::calculate(entry.data);
        entry.crc = crc;

        let write_ok = device.write_block(entry.data, entry.eeprom_addr);
        let crc_read = device.crc_block(entry.eeprom_addr, entry.data.len());
        if !write_ok || crc != crc_read {
            return HardwareSnafu.fail();
        }

        let signature = ((crc as u32) << 16) | (entry.data.len() as u32 & 0xFFFF);
        let sig_bytes = signature.to_le_bytes();
        let write_ok = device.write_block(&sig_bytes, entry.eeprom_addr_signature);

        let mut read_back = [0u8; 4];
        device.read_block(&mut read_back, entry.eeprom_addr_signature);
        if !write_ok || sig_bytes != read_back {
            return HardwareSnafu.fail();
        }

        debug!("storage entry {} saved", sub_index_od);
        Ok(())
    }

    /// Erase `sub_index_od`'s entry's signature so the next `init()` treats
    /// it as uninitialized and leaves caller defaults in RAM (spec §4.6).
    pub fn restore(&mut self, sub_index_od: u8) -> Result<(), StorageError> {
        let device = &mut self.device;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.sub_index_od == sub_index_od)
            .ok_or(StorageError::IllegalArgument)?;
        if !entry.attr.contains(EntryAttr::RESTORE) {
            return IllegalArgumentSnafu.fail();
        }

        let sig_bytes = 0xFFFF_FFFFu32.to_le_bytes();
        let write_ok = device.write_block(&sig_bytes, entry.eeprom_addr_signature);

        let mut read_back = [0u8; 4];
        device.read_block(&mut read_back, entry.eeprom_addr_signature);
        if !write_ok || sig_bytes != read_back {
            return HardwareSnafu.fail();
        }

        debug!("storage entry {} restored to defaults", sub_index_od);
        Ok(())
    }

    /// Periodic incremental differential writer for `AUTO` entries (spec
    /// §4.8). `save_all` drains every byte in one sweep; otherwise each call
    /// updates exactly one byte per `AUTO` entry and advances its offset.
    ///
    /// Matches the original's retry-until-success sweep: a device that never
    /// accepts `update_byte` for a given byte stalls this call on that byte
    /// rather than skipping it, since auto-saved entries have no CRC to
    /// detect a skipped byte later.
    pub fn auto_process(&mut self, save_all: bool) {
        if !self.enabled {
            return;
        }
        for entry in self.entries.iter_mut() {
            if !entry.attr.contains(EntryAttr::AUTO) {
                continue;
            }
            if save_all {
                let mut i = 0;
                while i < entry.data.len() {
                    if self.device.update_byte(entry.data[i], entry.eeprom_addr + i) {
                        i += 1;
                    }
                }
            } else if self
                .device
                .update_byte(entry.data[entry.offset], entry.eeprom_addr + entry.offset)
            {
                entry.offset += 1;
                if entry.offset >= entry.data.len() {
                    entry.offset = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEeprom {
        bytes: [u8; 256],
        next_free: usize,
    }

    impl FakeEeprom {
        fn new() -> Self {
            Self {
                bytes: [0xFFu8; 256],
                next_free: 0,
            }
        }
    }

    impl EepromDevice for FakeEeprom {
        fn init(&mut self) -> bool {
            // A real device re-derives the same addresses every boot because
            // the bump allocator restarts from zero and entries register in
            // the same order; model that here rather than leaking state
            // across the "reboots" these tests simulate.
            self.next_free = 0;
            true
        }

        fn alloc(&mut self, _is_auto: bool, size: usize, overflow: &mut bool) -> usize {
            let addr = self.next_free;
            if addr + size > self.bytes.len() {
                *overflow = true;
                return addr;
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
    fn round_trip_save_then_init() {
        let mut ram = [0xAAu8; 8];
        let mut entries = [StorageEntry::new(&mut ram, EntryAttr::RESTORE, 2).unwrap()];
        let mut engine = StorageEngine::new(FakeEeprom::new(), &mut entries);
        // First boot: nothing persisted yet, so init reports corruption even
        // though it still allocates addresses and comes up enabled.
        engine.init().unwrap_err();
        engine.save(2).unwrap();

        // Simulate a reboot: fresh RAM, same device, re-init.
        let mut ram2 = [0u8; 8];
        let mut entries2 = [StorageEntry::new(&mut ram2, EntryAttr::RESTORE, 2).unwrap()];
        let mut engine2 = StorageEngine::new(engine.device, &mut entries2);
        engine2.init().unwrap();
        assert_eq!(engine2.entries[0].data, &[0xAAu8; 8]);
    }

    #[test]
    fn corruption_detection_flips_init_error_bit() {
        let mut ram = [0x11u8; 4];
        let mut entries = [StorageEntry::new(&mut ram, EntryAttr::RESTORE, 5).unwrap()];
        let mut engine = StorageEngine::new(FakeEeprom::new(), &mut entries);
        engine.init().unwrap_err();
        engine.save(5).unwrap();

        // Flip one persisted data byte directly in the fake device.
        let addr = engine.entries[0].eeprom_addr;
        engine.device.bytes[addr] ^= 0xFF;

        let mut ram2 = [0u8; 4];
        let mut entries2 = [StorageEntry::new(&mut ram2, EntryAttr::RESTORE, 5).unwrap()];
        let mut engine2 = StorageEngine::new(engine.device, &mut entries2);
        let result = engine2.init();
        assert!(matches!(result, Err(StorageError::DataCorrupt)));
        assert_eq!(engine2.init_error(), 1 << 5);
    }

    #[test]
    fn restore_then_init_leaves_ram_untouched() {
        let mut ram = [0x22u8; 4];
        let mut entries = [StorageEntry::new(&mut ram, EntryAttr::RESTORE, 3).unwrap()];
        let mut engine = StorageEngine::new(FakeEeprom::new(), &mut entries);
        engine.init().unwrap_err();
        engine.save(3).unwrap();
        engine.restore(3).unwrap();

        let sig_addr = engine.entries[0].eeprom_addr_signature;
        let mut sig = [0u8; 4];
        engine.device.read_block(&mut sig, sig_addr);
        assert_eq!(u32::from_le_bytes(sig), 0xFFFF_FFFF);

        let mut ram2 = [0x99u8; 4];
        let defaults = ram2;
        let mut entries2 = [StorageEntry::new(&mut ram2, EntryAttr::RESTORE, 3).unwrap()];
        let mut engine2 = StorageEngine::new(engine.device, &mut entries2);
        engine2.init().unwrap_err();
        assert_eq!(engine2.entries[0].data, &defaults);
    }

    #[test]
    fn auto_save_cycles_offset() {
        let mut ram = [0u8; 16];
        let mut entries = [StorageEntry::new(&mut ram, EntryAttr::AUTO, 4).unwrap()];
        let mut engine = StorageEngine::new(FakeEeprom::new(), &mut entries);
        engine.init().unwrap_err();

        for (i, byte) in engine.entries[0].data.iter_mut().enumerate() {
            *byte = i as u8;
        }

        for expected_offset in 1..=16 {
            engine.auto_process(false);
            let addr = engine.entries[0].eeprom_addr;
            let updated = (expected_offset - 1) % 16;
            assert_eq!(engine.device.bytes[addr + updated], updated as u8);
            assert_eq!(engine.entries[0].offset, expected_offset % 16);
        }
    }
}
