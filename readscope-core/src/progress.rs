//! Progress fan-out and cooperative cancellation shared by save and load
//! tasks. Listeners are an injected list enumerated per event; the cancel
//! flag is an atomic polled at row granularity by every codec loop.

use crate::format::{FormatError, LoadedProject};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rows between progress reports inside per-read and per-probe loops.
pub const REPORT_INTERVAL: u64 = 1000;

/// Payload delivered with a successful completion event.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Saved { path: PathBuf },
    Loaded(Arc<LoadedProject>),
}

/// Receiver for save/load lifecycle events. All callbacks run on the worker
/// thread; default implementations ignore the event.
pub trait ProgressListener: Send + Sync {
    fn updated(&self, _message: &str, _current: u64, _max: u64) {}
    fn complete(&self, _tag: &str, _outcome: &TaskOutcome) {}
    fn cancelled(&self) {}
    fn exception(&self, _error: &FormatError) {}
    fn warning(&self, _message: &str) {}
}

/// Per-operation state: the listener list and the shared cancellation flag.
#[derive(Clone)]
pub struct ProgressContext {
    listeners: Arc<Vec<Arc<dyn ProgressListener>>>,
    cancel: Arc<AtomicBool>,
}

impl ProgressContext {
    pub fn new(listeners: Vec<Arc<dyn ProgressListener>>) -> Self {
        Self {
            listeners: Arc::new(listeners),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag the initiating thread sets to request cancellation.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Returns `Err(Cancelled)` once cancellation has been requested.
    pub fn checkpoint(&self) -> Result<(), FormatError> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(FormatError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn updated(&self, message: &str, current: u64, max: u64) {
        for listener in self.listeners.iter() {
            listener.updated(message, current, max);
        }
    }

    pub fn complete(&self, tag: &str, outcome: &TaskOutcome) {
        for listener in self.listeners.iter() {
            listener.complete(tag, outcome);
        }
    }

    pub fn cancelled(&self) {
        for listener in self.listeners.iter() {
            listener.cancelled();
        }
    }

    pub fn exception(&self, error: &FormatError) {
        for listener in self.listeners.iter() {
            listener.exception(error);
        }
    }

    pub fn warning(&self, message: &str) {
        for listener in self.listeners.iter() {
            listener.warning(message);
        }
    }
}

/// Row counter for one section of work: checks the cancel flag on every row
/// and reports progress every [`REPORT_INTERVAL`] rows.
pub struct SectionProgress<'a> {
    ctx: &'a ProgressContext,
    message: String,
    current: u64,
    max: u64,
}

impl<'a> SectionProgress<'a> {
    pub fn new(ctx: &'a ProgressContext, message: impl Into<String>, max: u64) -> Self {
        let message = message.into();
        ctx.updated(&message, 0, max);
        Self {
            ctx,
            message,
            current: 0,
            max,
        }
    }

    pub fn tick(&mut self) -> Result<(), FormatError> {
        self.ctx.checkpoint()?;
        self.current += 1;
        if self.current % REPORT_INTERVAL == 0 {
            self.ctx.updated(&self.message, self.current, self.max);
        }
        Ok(())
    }
}
