//! Storage entry table (spec §3).
//!
//! Grounded in `CO_storage_entry_t` (`original_source/storage/CO_storageEeprom.c`)
//! for the field set, and in `zencan_common::objects::SubInfo`'s hand-rolled
//! access-flag style for `EntryAttr` (no `bitflags` crate in this codebase's
//! dependency tree).

use snafu::Snafu;

/// Per-entry attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryAttr(u8);

impl EntryAttr {
    /// No attributes.
    pub const NONE: EntryAttr = EntryAttr(0);
    /// Incremental auto-save: periodically streamed byte-by-byte rather
    /// than written as a single block on an explicit save command.
    pub const AUTO: EntryAttr = EntryAttr(1 << 0);
    /// Supports restore-defaults (OD 1011h).
    pub const RESTORE: EntryAttr = EntryAttr(1 << 1);

    /// Whether all bits of `other` are set.
    pub const fn contains(self, other: EntryAttr) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for EntryAttr {
    type Output = EntryAttr;
    fn bitor(self, rhs: EntryAttr) -> EntryAttr {
        EntryAttr(self.0 | rhs.0)
    }
}

/// Entry registration errors.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum EntryError {
    /// The RAM region backing the entry was empty.
    #[snafu(display("storage entry has zero length"))]
    EmptyRegion,
    /// Sub-index 0 is reserved (max sub-number) and 1 is reserved
    /// (`storageInitError`-style control sub-indices); entries start at 2.
    #[snafu(display("sub-index {sub_index_od} is reserved, entries require >= 2"))]
    ReservedSubIndex {
        /// The rejected sub-index
        sub_index_od: u8,
    },
}

/// A single registered storable region (spec §3).
///
/// `addr_ram`, `len` (implicit in the slice), `attr`, and `sub_index_od` are
/// caller-owned and immutable after construction. `eeprom_addr`,
/// `eeprom_addr_signature`, `crc`, and `offset` are owned by the engine and
/// mutated as entries are allocated, saved, restored, and auto-saved.
pub struct StorageEntry<'a> {
    pub(crate) data: &'a mut [u8],
    pub(crate) attr: EntryAttr,
    pub(crate) sub_index_od: u8,
    pub(crate) eeprom_addr: usize,
    pub(crate) eeprom_addr_signature: usize,
    pub(crate) crc: u16,
    pub(crate) offset: usize,
}

impl<'a> StorageEntry<'a> {
    /// Register a storable RAM region. `sub_index_od` must be `>= 2`.
    pub fn new(data: &'a mut [u8], attr: EntryAttr, sub_index_od: u8) -> Result<Self, EntryError> {
        if data.is_empty() {
            return EmptyRegionSnafu.fail();
        }
        if sub_index_od < 2 {
            return ReservedSubIndexSnafu { sub_index_od }.fail();
        }
        Ok(Self {
            data,
            attr,
            sub_index_od,
            eeprom_addr: 0,
            eeprom_addr_signature: 0,
            crc: 0,
            offset: 0,
        })
    }

    /// The OD sub-index this entry answers save/restore commands for.
    pub fn sub_index_od(&self) -> u8 {
        self.sub_index_od
    }

    /// Length of the backing RAM region, in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the backing RAM region is empty (always `false`: construction
    /// rejects empty regions, kept for API symmetry with `len`).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The most recently computed/verified CRC-16-CCITT over the RAM region.
    pub fn crc(&self) -> u16 {
        self.crc
    }
}
