//! Merging of a frame group's partial buffers and collection of per-frame
//! timings at the coordinator.

mod reduction;
mod summary;
mod timing;

use engine::{CommError, Tag};
use protocol::BufferError;
use thiserror::Error;

pub use reduction::{fold_buffers, reduce_to_leader};
pub use summary::{RunMetadata, RunSummary};
pub use timing::{FrameTimer, SharedTimingTable, TimingCollector, send_report};

/// Local rank of the process that prints the run summary.
pub const COORDINATOR: usize = 0;

#[derive(Debug, Error)]
pub enum TimingError {
    #[error("a run needs at least one frame")]
    NoFrames,
    #[error("frame {frame_index} is outside a run of {frame_count} frames")]
    FrameOutOfRange {
        frame_index: usize,
        frame_count: usize,
    },
    #[error("frame {frame_index} was already timed")]
    Duplicate { frame_index: usize },
    #[error("no timing was recorded for frame {frame_index}")]
    Missing { frame_index: usize },
    #[error("report for frame {frame_index} arrived with tag {tag}")]
    TagMismatch { frame_index: usize, tag: Tag },
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("nothing to reduce")]
    NoBuffers,
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Comm(#[from] CommError),
    #[error(transparent)]
    Timing(#[from] TimingError),
}
