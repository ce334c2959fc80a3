//! Reliable block-oriented parameter storage engine over an EEPROM-like
//! device.
//!
//! The [`StorageEngine`] owns a caller-registered table of [`StorageEntry`]
//! regions, each backed by RAM the caller owns and mirrored to a persistent
//! signature + data block on an [`EepromDevice`]. [`StorageCommand`] wires
//! save/restore up to object-dictionary writes of the CiA 301 magic words;
//! [`StorageEngine::auto_process`] streams `AUTO`-flagged entries to EEPROM
//! byte-by-byte to amortize wear. The engine owns no timer and no concurrency
//! of its own: every call runs to completion on the caller's thread.
#![cfg_attr(not(feature = "std"), no_std)]

mod command;
mod device;
mod engine;
mod entry;

pub use command::{Kind, StorageAbort, StorageCommand};
pub use device::EepromDevice;
pub use engine::{StorageEngine, StorageError};
pub use entry::{EntryAttr, EntryError, StorageEntry};
