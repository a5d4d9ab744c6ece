//! Batch raytracer front end: configuration, scene setup and the two run
//! modes behind the `raytrace` and `raytrace-threaded` binaries.

pub mod cli;
pub mod config;
mod hybrid;
mod threaded;

use aggregation::{AggregationError, RunSummary, TimingError};
use engine::{CommError, WorldError};
use frame_scheduler::{FrameScheduleError, GroupFormationError};
use images::ImageWriteError;
use log::info;
use patches::PartitionError;
use protocol::BufferError;
use renderer::RenderError;
use scene::{Camera, CameraSettings, Tracer};
use thiserror::Error;

use crate::config::{ConfigError, RunConfig, SceneSource, SummaryFormat};

pub use hybrid::run_hybrid;
pub use threaded::run_threaded;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Schedule(#[from] FrameScheduleError),
    #[error(transparent)]
    Group(#[from] GroupFormationError),
    #[error(transparent)]
    Comm(#[from] CommError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Timing(#[from] TimingError),
    #[error(transparent)]
    Image(#[from] ImageWriteError),
    #[error("a frame group of {size} units cannot be partitioned")]
    GroupTooLarge { size: usize },
    #[error("no patch for local unit {local_id} of frame {frame_index}")]
    MissingPatch { frame_index: usize, local_id: usize },
    #[error("failed to spawn unit {unit}")]
    Spawn {
        unit: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("unit {unit} panicked")]
    UnitPanicked { unit: usize },
    #[error("leader of frame {frame_index} stopped before receiving all tiles")]
    LeaderGone { frame_index: usize },
    #[error("a unit of frame {frame_index} stopped before sending its tile")]
    MissingTiles { frame_index: usize },
    #[error("the coordinator produced no summary")]
    MissingSummary,
}

impl RunError {
    /// Whether this rank only failed because a peer exited first.
    pub fn is_peer_gone(&self) -> bool {
        match self {
            RunError::Comm(err)
            | RunError::Group(GroupFormationError::Comm(err))
            | RunError::Aggregation(AggregationError::Comm(err)) => err.is_peer_gone(),
            _ => false,
        }
    }
}

/// Logs to stderr at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();
}

/// Builds the scene for `config` and points the default camera at it.
pub fn tracer_for(config: &RunConfig) -> Tracer {
    let scene = match &config.scene {
        SceneSource::File(path) => scene::load(path),
        SceneSource::Random => scene::random_scene(config.seed),
    };
    info!("scene holds {} objects", scene.len());
    let camera = Camera::for_image(CameraSettings::default(), config.width, config.height);
    Tracer::new(scene, camera)
}

pub fn format_summary(
    summary: &RunSummary,
    format: SummaryFormat,
) -> Result<String, serde_json::Error> {
    match format {
        SummaryFormat::Csv => Ok(summary.to_string()),
        SummaryFormat::Json => serde_json::to_string(summary),
    }
}

#[cfg(test)]
mod tests;
