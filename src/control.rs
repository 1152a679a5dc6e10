use crate::sync::{Arc, AtomicBool, Ordering};

/// Shared run/stop signal.
///
/// The flag starts out running. Whoever owns the program's lifecycle calls
/// [`stop`](Self::stop); worker loops, the scheduler loop and the sequential
/// baseline only read it, at iteration boundaries. There is no way to restart
/// a stopped flag.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl Default for RunFlag {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl RunFlag {
    /// Create a flag in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the loops should keep going.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Ask every loop observing this flag to finish.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}
