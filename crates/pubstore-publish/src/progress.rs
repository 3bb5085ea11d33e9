//! Progress reporting for bulk operations.

use tracing::{debug, info};

/// Receiver of progress updates.
///
/// A reporter is exclusively borrowed for the duration of one bulk
/// operation; it is not meant to be shared between concurrent operations.
pub trait Progress {
    /// Start a bar expecting `total` units of work.
    fn init_bar(&mut self, total: u64, indeterminate: bool);

    /// Advance the bar by `delta` units.
    fn add_bar(&mut self, delta: u64);

    /// Tear the bar down.
    fn shutdown_bar(&mut self);
}

/// Discards all progress updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn init_bar(&mut self, _total: u64, _indeterminate: bool) {}
    fn add_bar(&mut self, _delta: u64) {}
    fn shutdown_bar(&mut self) {}
}

/// Reports progress as tracing events.
#[derive(Clone, Debug, Default)]
pub struct LogProgress {
    total: u64,
    done: u64,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units completed since the last `init_bar`.
    pub fn done(&self) -> u64 {
        self.done
    }
}

impl Progress for LogProgress {
    fn init_bar(&mut self, total: u64, indeterminate: bool) {
        self.total = total;
        self.done = 0;
        debug!(total, indeterminate, "progress started");
    }

    fn add_bar(&mut self, delta: u64) {
        self.done += delta;
        debug!(done = self.done, total = self.total, "progress");
    }

    fn shutdown_bar(&mut self) {
        info!(done = self.done, total = self.total, "progress finished");
    }
}

/// A running progress bar. Shuts the bar down when dropped, so every exit
/// path of the operation that started it closes it.
pub struct ProgressBar<'a> {
    progress: &'a mut dyn Progress,
}

impl<'a> ProgressBar<'a> {
    /// Initialize `progress` and hold it until the guard is dropped.
    pub fn start(progress: &'a mut dyn Progress, total: u64, indeterminate: bool) -> Self {
        progress.init_bar(total, indeterminate);
        Self { progress }
    }

    /// Advance the bar.
    pub fn add(&mut self, delta: u64) {
        self.progress.add_bar(delta);
    }
}

impl Drop for ProgressBar<'_> {
    fn drop(&mut self) {
        self.progress.shutdown_bar();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Progress for Recorder {
        fn init_bar(&mut self, total: u64, indeterminate: bool) {
            self.events.push(format!("init {total} {indeterminate}"));
        }
        fn add_bar(&mut self, delta: u64) {
            self.events.push(format!("add {delta}"));
        }
        fn shutdown_bar(&mut self) {
            self.events.push("shutdown".into());
        }
    }

    #[test]
    fn guard_shuts_down_on_drop() {
        let mut recorder = Recorder::default();
        {
            let mut bar = ProgressBar::start(&mut recorder, 3, false);
            bar.add(2);
            bar.add(1);
        }
        assert_eq!(recorder.events, vec!["init 3 false", "add 2", "add 1", "shutdown"]);
    }

    #[test]
    fn guard_shuts_down_on_early_return() {
        fn work(progress: &mut dyn Progress, fail: bool) -> Result<(), &'static str> {
            let mut bar = ProgressBar::start(progress, 10, true);
            bar.add(1);
            if fail {
                return Err("boom");
            }
            bar.add(9);
            Ok(())
        }

        let mut recorder = Recorder::default();
        assert!(work(&mut recorder, true).is_err());
        assert_eq!(recorder.events, vec!["init 10 true", "add 1", "shutdown"]);
    }

    #[test]
    fn log_progress_counts() {
        let mut progress = LogProgress::new();
        progress.init_bar(5, false);
        progress.add_bar(2);
        progress.add_bar(3);
        progress.shutdown_bar();
        assert_eq!(progress.done(), 5);

        progress.init_bar(1, false);
        assert_eq!(progress.done(), 0);
    }

    #[test]
    fn null_progress_accepts_everything() {
        let mut progress = NullProgress;
        let mut bar = ProgressBar::start(&mut progress, 0, true);
        bar.add(100);
    }
}
