//! Single-slot receive handoff between a CAN receive interrupt and the
//! driving thread.
//!
//! Grounded in the shared-mailbox pattern used throughout this codebase for
//! passing received frames from interrupt/driver context to a polled
//! `process()` call: a `critical_section`-protected cell holding at most one
//! pending value, with an optional wake callback. Spec §4.1/§5: the receive
//! callback is the sole writer, runs the three gates (length, overflow,
//! command-in-flight) in order, and only ever holds one frame at a time.

use critical_section::Mutex;
use core::cell::Cell;

type NotifyFn = &'static (dyn Fn() + Sync);

/// The single-slot mailbox an LSS master uses to receive frames.
///
/// Create one, hand a `'static` reference to your CAN receive interrupt
/// handler (calling [`RxMailbox::on_frame`] for every inbound frame on the
/// LSS slave response identifier), and pass the same reference to
/// [`crate::LssMaster`].
pub struct RxMailbox {
    slot: Mutex<Cell<Option<[u8; 8]>>>,
    accepting: Mutex<Cell<bool>>,
    notify: Mutex<Cell<Option<NotifyFn>>>,
}

impl Default for RxMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl RxMailbox {
    /// Create a new, empty mailbox. Not accepting frames until the master
    /// starts a command.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
            accepting: Mutex::new(Cell::new(false)),
            notify: Mutex::new(Cell::new(None)),
        }
    }

    /// Register a callback invoked when a frame is accepted into the
    /// mailbox, e.g. to wake a worker task blocked waiting for `process` to
    /// be called again.
    pub fn set_notify_callback(&self, callback: NotifyFn) {
        critical_section::with(|cs| self.notify.borrow(cs).set(Some(callback)));
    }

    /// Called from CAN receive (interrupt/driver) context for every inbound
    /// frame on the LSS slave response identifier.
    ///
    /// Runs the three gates from spec §4.1, in order: `data.len() == 8`,
    /// no frame already pending, and the master is currently expecting a
    /// reply. A frame failing any gate is silently dropped, per spec §5 (the
    /// LSS protocol's single-in-flight discipline is assumed to guarantee no
    /// loss on correct peers).
    pub fn on_frame(&self, data: &[u8]) {
        if data.len() != 8 {
            return;
        }
        critical_section::with(|cs| {
            if !self.accepting.borrow(cs).get() {
                return;
            }
            if self.slot.borrow(cs).get().is_some() {
                return;
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(data);
            self.slot.borrow(cs).set(Some(buf));
        });
        if let Some(cb) = critical_section::with(|cs| self.notify.borrow(cs).get()) {
            cb();
        }
    }

    /// Drain the pending frame, if any. Clears `has_new`.
    pub(crate) fn take(&self) -> Option<[u8; 8]> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }

    /// Open the mailbox to accept a frame (entering a new command clears any
    /// stale pending frame and starts accepting).
    pub(crate) fn arm(&self) {
        critical_section::with(|cs| {
            self.accepting.borrow(cs).set(true);
            self.slot.borrow(cs).set(None);
        });
    }

    /// Close the mailbox; frames arriving after this are dropped by the
    /// `command != Waiting` gate.
    pub(crate) fn disarm(&self) {
        critical_section::with(|cs| {
            self.accepting.borrow(cs).set(false);
            self.slot.borrow(cs).set(None);
        });
    }
}
