use std::time::Instant;

use tracing::debug;

/// Logs how long a scope took when dropped.
#[must_use = "the elapsed time is logged when the guard is dropped"]
pub struct Stopwatch {
    label: &'static str,
    started: Instant,
}

impl Stopwatch {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        debug!("{} took: {:.3} seconds", self.label, self.elapsed_secs());
    }
}
