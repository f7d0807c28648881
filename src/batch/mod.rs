pub mod checkpoint;
pub mod engine;
pub mod envelope;

pub use checkpoint::Checkpoint;
pub use engine::{
    BatchEngine, BatchEvent, BatchHandle, BatchSettings, CancellationToken, RunState, RunSummary,
};
pub use envelope::{encode_batch, parse_response, reconcile, BatchParse};
