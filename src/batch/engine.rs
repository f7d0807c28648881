use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::ir::TextEntry;
use crate::providers::{ProviderConfig, TranslationProvider};
use crate::textutil::clip_for_log;

use super::checkpoint::Checkpoint;
use super::envelope::reconcile;

pub const DEFAULT_BATCH_SIZE: usize = 120;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(5);

const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct BatchSettings {
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub delay: Duration,
    pub checkpoint_path: PathBuf,
    pub log_max_chars: usize,
}

impl BatchSettings {
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay: DEFAULT_BATCH_DELAY,
            checkpoint_path: checkpoint_path.into(),
            log_max_chars: 240,
        }
    }
}

/// Cooperative cancellation, checked only at batch boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Done,
    Cancelled,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,
    pub batches_run: usize,
    /// Addresses newly translated in this run.
    pub translated: usize,
    /// Addresses a reply dropped or left blank.
    pub skipped: usize,
    pub checkpoint_len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchEvent {
    Started {
        pending: usize,
        batches: usize,
        already_done: usize,
    },
    Translated {
        address: String,
        text: String,
    },
    BatchDone {
        index: usize,
        total: usize,
        parsed: usize,
        skipped: usize,
        checkpoint_len: usize,
    },
    Finished(RunSummary),
}

/// Sequential, checkpointed batch translation against one provider.
pub struct BatchEngine {
    settings: BatchSettings,
    provider: Arc<dyn TranslationProvider>,
    provider_cfg: ProviderConfig,
}

/// A run on a worker thread.
pub struct BatchHandle {
    pub events: Receiver<BatchEvent>,
    pub cancel: CancellationToken,
    join: JoinHandle<RunSummary>,
}

impl BatchHandle {
    /// Waits for the worker. A panicked worker is reported as a failed run.
    pub fn wait(self) -> RunSummary {
        match self.join.join() {
            Ok(summary) => summary,
            Err(_) => RunSummary {
                state: RunState::Failed("batch worker panicked".to_string()),
                batches_run: 0,
                translated: 0,
                skipped: 0,
                checkpoint_len: 0,
            },
        }
    }
}

impl BatchEngine {
    pub fn new(settings: BatchSettings, provider: Arc<dyn TranslationProvider>, provider_cfg: ProviderConfig) -> Self {
        Self {
            settings,
            provider,
            provider_cfg,
        }
    }

    /// Runs the loop on a worker thread; events arrive on the returned handle.
    pub fn spawn(self, entries: Vec<TextEntry>) -> BatchHandle {
        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let join = std::thread::spawn(move || self.run(&entries, &worker_cancel, &tx));
        BatchHandle {
            events: rx,
            cancel,
            join,
        }
    }

    /// `entries` are all known addresses in display order. Anything already in the checkpoint
    /// is replayed as `Translated` and not sent again.
    pub fn run(&self, entries: &[TextEntry], cancel: &CancellationToken, events: &Sender<BatchEvent>) -> RunSummary {
        let emit = |ev: BatchEvent| {
            // A dropped receiver only means nobody is watching.
            let _ = events.send(ev);
        };

        let mut checkpoint = Checkpoint::load(&self.settings.checkpoint_path);
        let mut summary = RunSummary {
            state: RunState::Done,
            batches_run: 0,
            translated: 0,
            skipped: 0,
            checkpoint_len: checkpoint.len(),
        };

        let mut pending: Vec<TextEntry> = Vec::new();
        let mut already_done = 0usize;
        for entry in entries {
            match checkpoint.get(&entry.address) {
                Some(text) => {
                    already_done += 1;
                    emit(BatchEvent::Translated {
                        address: entry.address.clone(),
                        text: text.to_string(),
                    });
                }
                None => pending.push(entry.clone()),
            }
        }

        let size = self.settings.batch_size.max(1);
        let total = pending.len().div_ceil(size);
        emit(BatchEvent::Started {
            pending: pending.len(),
            batches: total,
            already_done,
        });
        if pending.is_empty() {
            tracing::info!("nothing pending; {already_done} address(es) already in the checkpoint");
            emit(BatchEvent::Finished(summary.clone()));
            return summary;
        }
        tracing::info!(
            "batch run: {} pending in {total} batch(es) of up to {size}, {already_done} already done, provider={}",
            pending.len(),
            self.provider.name()
        );

        for (i, chunk) in pending.chunks(size).enumerate() {
            let index = i + 1;
            if cancel.is_cancelled() {
                tracing::warn!("cancelled before batch {index}/{total}");
                summary.state = RunState::Cancelled;
                break;
            }
            if i > 0 && !sleep_unless_cancelled(self.settings.delay, cancel) {
                tracing::warn!("cancelled before batch {index}/{total}");
                summary.state = RunState::Cancelled;
                break;
            }

            let t0 = Instant::now();
            let reply = match self.provider.translate_block(chunk, &self.provider_cfg) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("batch {index}/{total} failed: {e}");
                    summary.state = RunState::Failed(format!("batch {index}/{total}: {e}"));
                    break;
                }
            };
            summary.batches_run += 1;

            let parsed = reconcile(chunk, &reply);
            if parsed.translated.is_empty() {
                tracing::error!(
                    "batch {index}/{total}: no parseable entries in reply: {}",
                    clip_for_log(&reply, self.settings.log_max_chars)
                );
                summary.state = RunState::Failed(format!("batch {index}/{total}: reply had no parseable entries"));
                break;
            }
            if !parsed.missing.is_empty() {
                tracing::warn!(
                    "batch {index}/{total}: {} of {} address(es) missing from the reply; skipped",
                    parsed.missing.len(),
                    chunk.len()
                );
                for address in &parsed.missing {
                    tracing::debug!("skipped {address}");
                }
            }
            if !parsed.unexpected.is_empty() {
                tracing::warn!(
                    "batch {index}/{total}: ignored {} ID(s) not in the batch",
                    parsed.unexpected.len()
                );
            }

            checkpoint.merge(parsed.translated.iter().cloned());
            if let Err(e) = checkpoint.save() {
                tracing::error!("checkpoint save failed after batch {index}/{total}: {e}");
                summary.state = RunState::Failed(format!("checkpoint: {e}"));
                break;
            }

            summary.translated += parsed.translated.len();
            summary.skipped += parsed.missing.len();
            summary.checkpoint_len = checkpoint.len();
            let parsed_count = parsed.translated.len();
            for (address, text) in parsed.translated {
                emit(BatchEvent::Translated { address, text });
            }
            emit(BatchEvent::BatchDone {
                index,
                total,
                parsed: parsed_count,
                skipped: parsed.missing.len(),
                checkpoint_len: checkpoint.len(),
            });
            tracing::info!(
                "batch {index}/{total} done in {:.1}s: {parsed_count} translated, {} skipped, checkpoint={}",
                t0.elapsed().as_secs_f64(),
                parsed.missing.len(),
                checkpoint.len()
            );
        }

        emit(BatchEvent::Finished(summary.clone()));
        summary
    }
}

/// False when cancelled during the wait.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}
