use std::io::{self, Write};
use std::time::Instant;

use crate::batch::{BatchEvent, RunState};
use crate::table::TableStats;

/// Human-facing progress lines on stderr, prefixed with elapsed time.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {}", msg.as_ref());
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {}", progress_line(label, current, total));
    }

    pub fn stats(&self, stats: &TableStats) {
        self.info(format!(
            "translated {}/{} ({:.1}%)",
            stats.translated,
            stats.total,
            stats.percent()
        ));
    }

    /// Per-address events are too chatty for the console and are skipped.
    pub fn batch_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::Started {
                pending,
                batches,
                already_done,
            } => self.info(format!(
                "batch translation: {pending} pending in {batches} batch(es), {already_done} from checkpoint"
            )),
            BatchEvent::Translated { .. } => {}
            BatchEvent::BatchDone {
                index,
                total,
                parsed,
                skipped,
                ..
            } => {
                self.progress("batch", *index, *total);
                if *skipped > 0 {
                    self.info(format!("  {parsed} translated, {skipped} skipped by the provider"));
                }
            }
            BatchEvent::Finished(summary) => match &summary.state {
                RunState::Done => self.info(format!(
                    "batch translation done: {} new, {} skipped, checkpoint holds {}",
                    summary.translated, summary.skipped, summary.checkpoint_len
                )),
                RunState::Cancelled => self.info(format!(
                    "batch translation cancelled after {} batch(es)",
                    summary.batches_run
                )),
                RunState::Failed(reason) => self.info(format!("batch translation stopped: {reason}")),
            },
        }
    }
}

fn progress_line(label: &str, current: usize, total: usize) -> String {
    let total = total.max(1);
    let current = current.min(total);
    let pct = (current as f64 / total as f64) * 100.0;
    format!("{label} {current}/{total} ({pct:5.1}%)")
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
