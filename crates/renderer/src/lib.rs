//! CPU rendering of patches: the per-unit executor and the thread team that
//! splits a unit's patch across its local threads.

mod executor;
mod pool;
mod seeds;

use patches::{PartitionError, Patch};
use protocol::BufferError;
use rand::rngs::SmallRng;
use thiserror::Error;

pub use executor::{WorkerExecutor, gamma_correct, quantize, to_bgr};
pub use pool::ThreadTeam;
pub use seeds::SeedStream;

/// Linear RGB color sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl Sample {
    pub const BLACK: Sample = Sample::new(0.0, 0.0, 0.0);

    pub const fn new(red: f32, green: f32, blue: f32) -> Self {
        Self { red, green, blue }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.red * factor, self.green * factor, self.blue * factor)
    }
}

impl std::ops::Add for Sample {
    type Output = Sample;

    fn add(self, other: Sample) -> Sample {
        Sample::new(
            self.red + other.red,
            self.green + other.green,
            self.blue + other.blue,
        )
    }
}

/// Produces a color sample for a point of the unit image-plane square.
///
/// `u` grows to the right and `v` grows upwards; both lie in `[0, 1)`.
pub trait SampleEvaluator: Sync {
    fn evaluate(&self, u: f32, v: f32, rng: &mut SmallRng) -> Sample;
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("a thread team needs at least one thread")]
    NoThreads,
    #[error("a pixel needs at least one sample")]
    NoSamples,
    #[error("patch {patch} lies outside the {width}x{height} frame")]
    PatchOutsideFrame { patch: Patch, width: u32, height: u32 },
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("failed to spawn render thread {thread}")]
    Spawn {
        thread: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("render thread {thread} panicked")]
    ThreadPanicked { thread: usize },
}
