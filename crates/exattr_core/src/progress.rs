//! Progress reporting for long attribution loops.

use indicatif::{ProgressBar, ProgressStyle};

/// Receives the total iteration count up front and one tick per completed
/// iteration.
pub trait ProgressSink {
    /// Called once before the first iteration.
    fn start(&mut self, label: &str, total: usize);

    /// Called after every completed iteration.
    fn advance(&mut self);

    /// Called once after the last iteration.
    fn finish(&mut self) {}
}

/// Discards all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _label: &str, _total: usize) {}

    fn advance(&mut self) {}
}

/// Reports progress as `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct LogProgress {
    label: String,
    total: usize,
    done: usize,
}

impl LogProgress {
    /// Create a new log-based progress sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterations completed so far.
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.done
    }

    /// Total announced by the last `start` call.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }
}

impl ProgressSink for LogProgress {
    fn start(&mut self, label: &str, total: usize) {
        self.label = label.to_string();
        self.total = total;
        self.done = 0;
        tracing::info!("{}: starting {} iterations", self.label, total);
    }

    fn advance(&mut self) {
        self.done += 1;
        tracing::info!("{}: {}/{}", self.label, self.done, self.total);
    }

    fn finish(&mut self) {
        tracing::info!("{}: completed", self.label);
    }
}

/// Terminal progress bar.
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    /// Create a bar that is drawn on the first `start` call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for BarProgress {
    fn start(&mut self, label: &str, total: usize) {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{elapsed_precise}] {bar:40} {pos}/{len}")
        {
            bar.set_style(style);
        }
        bar.set_message(label.to_string());
        self.bar = Some(bar);
    }

    fn advance(&mut self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

/// Progress bar when `show` is set, silence otherwise.
#[must_use]
pub fn progress_for(show: bool) -> Box<dyn ProgressSink> {
    if show {
        Box::new(BarProgress::new())
    } else {
        Box::new(NoProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_progress_counts() {
        let mut sink = LogProgress::new();
        sink.start("Sweep", 3);
        sink.advance();
        sink.advance();
        assert_eq!(sink.completed(), 2);
        assert_eq!(sink.total(), 3);
        sink.finish();
    }

    #[test]
    fn test_log_progress_restart_resets() {
        let mut sink = LogProgress::new();
        sink.start("A", 2);
        sink.advance();
        sink.start("B", 5);
        assert_eq!(sink.completed(), 0);
        assert_eq!(sink.total(), 5);
    }

    #[test]
    fn test_bar_progress_without_start() {
        let mut sink = BarProgress::new();
        sink.advance();
        sink.finish();
    }

    #[test]
    fn test_progress_for_disabled() {
        let mut sink = progress_for(false);
        sink.start("Quiet", 10);
        sink.advance();
        sink.finish();
    }
}
