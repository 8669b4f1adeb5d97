use std::io::Write;
use std::time::Instant;

/// One progress observation during an import run. Byte counts refer to the
/// file currently being read; `file_index` is zero-based.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressUpdate {
    pub file_index: usize,
    pub file_count: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Receiver for progress updates. Returning `false` requests cooperative
/// cancellation; the importer polls this between read chunks, so the
/// cancellation latency is bounded by one chunk.
pub trait ProgressSink {
    fn report(&mut self, update: &ProgressUpdate) -> bool;
}

/// Sink that never cancels and reports nothing.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _update: &ProgressUpdate) -> bool {
        true
    }
}

/// Stderr progress line for the CLI, throttled so a fast import does not
/// drown the terminal.
pub struct ConsoleProgress {
    last_report: Instant,
    wrote_anything: bool,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            last_report: Instant::now(),
            wrote_anything: false,
        }
    }

    pub fn finish(&mut self) {
        if self.wrote_anything {
            eprintln!();
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn report(&mut self, update: &ProgressUpdate) -> bool {
        if self.last_report.elapsed().as_millis() < 120 {
            return true;
        }
        self.last_report = Instant::now();
        let total = update.bytes_total.max(1);
        let percent = (update.bytes_done.min(total) * 100) / total;
        eprint!(
            "\rreading file {} of {}: {percent}%   ",
            update.file_index + 1,
            update.file_count
        );
        let _ = std::io::stderr().flush();
        self.wrote_anything = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CancelAfter {
        remaining: usize,
    }

    impl ProgressSink for CancelAfter {
        fn report(&mut self, _update: &ProgressUpdate) -> bool {
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            true
        }
    }

    #[test]
    fn no_progress_never_cancels() {
        let mut sink = NoProgress;
        assert!(sink.report(&ProgressUpdate::default()));
    }

    #[test]
    fn cancel_after_counts_down() {
        let mut sink = CancelAfter { remaining: 2 };
        assert!(sink.report(&ProgressUpdate::default()));
        assert!(sink.report(&ProgressUpdate::default()));
        assert!(!sink.report(&ProgressUpdate::default()));
    }
}
