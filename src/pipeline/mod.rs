//! Frame hand-off from the camera callback to the precheck path

pub mod pump;
pub mod queue;

use std::time::Duration;
use thiserror::Error;

pub use pump::{FramePump, FrameSink};
pub use queue::FrameQueue;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("queue closed")]
    Closed,
    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),
    #[error("worker did not stop within {0:?}")]
    JoinTimeout(Duration),
    #[error("pump already stopped")]
    AlreadyStopped,
}
