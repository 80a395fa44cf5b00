//! Observable state holders for the capture and history screens.
//!
//! Each holder publishes its state through `tokio::sync::watch` channels and
//! runs at most one instance of each operation at a time.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod capture;
pub mod history;

pub use capture::{CaptureViewModel, SaveState, WeatherDisplay, WeatherState};
pub use history::{HistoryState, HistoryViewModel};

/// What happened to a dispatched user intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Completed,
    /// The same operation was already in flight; state was left untouched.
    Rejected,
}

/// Admits one operation at a time.
#[derive(Debug, Default)]
pub struct OpGate {
    busy: AtomicBool,
}

impl OpGate {
    pub fn try_begin(&self) -> Option<OpGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| OpGuard { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the gate on drop, including when the operation is cancelled.
#[derive(Debug)]
pub struct OpGuard<'a> {
    gate: &'a OpGate,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}
