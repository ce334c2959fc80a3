//! Outer/command state sum types.
//!
//! Per the Design Notes (spec §9): the original C source tracks `state` and
//! `command` as parallel integer constants, guarded by if-ladders with empty
//! "MISRA C 2004 14.10" branches. Representing them as Rust enums lets the
//! invariants in spec §3 be partially enforced by the type checker instead of
//! re-checked at every call site.

/// Whether zero, one (selective), or all (global) slaves are currently in
/// LSS configuration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterState {
    /// No slave is selected
    Waiting,
    /// A single slave, selected by address or by Fastscan, is configuring
    ConfigSelective,
    /// All slaves are in configuration mode (global switch)
    ConfigGlobal,
}

/// Which service, if any, is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// No service in flight
    Waiting,
    /// Switch-state-selective, awaiting confirmation
    SwitchState,
    /// Configure bit timing, awaiting confirmation
    CfgBitTiming,
    /// Configure node ID, awaiting confirmation
    CfgNodeId,
    /// Configure store, awaiting confirmation
    CfgStore,
    /// Inquire vendor ID, awaiting reply
    InquireVendor,
    /// Inquire product code, awaiting reply
    InquireProduct,
    /// Inquire revision number, awaiting reply
    InquireRev,
    /// Inquire serial number, awaiting reply
    InquireSerial,
    /// Inquire a single caller-chosen field, awaiting reply
    Inquire,
    /// Fastscan identification in progress
    IdentifyFastscan,
}

impl Command {
    pub(crate) fn is_waiting(&self) -> bool {
        matches!(self, Command::Waiting)
    }
}
