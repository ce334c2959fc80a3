//! CANopen Layer Setting Services (LSS) master protocol actor.
//!
//! The [`LssMaster`] drives the LSS master state machine described in CiA
//! DSP-305: switching slaves into and out of LSS configuration mode,
//! configuring bit timing / node ID / store, inquiring identity, and running
//! the Fastscan binary-search identification algorithm. It owns no timer and
//! no CAN hardware; the caller drives it with a periodic tick supplying
//! elapsed microseconds, and feeds it received frames through [`RxMailbox`].
#![cfg_attr(not(feature = "std"), no_std)]

mod fastscan;
mod frame;
mod mailbox;
mod master;
mod state;

pub use fastscan::{FastscanRequest, FastscanResult, LssSub, ScanMode};
pub use frame::{CanId, LssCommandSpecifier, LssFrame};
pub use mailbox::RxMailbox;
pub use master::{LssAddress, LssMaster, LssMasterError, LssStatus};
pub use state::{Command, OuterState};
