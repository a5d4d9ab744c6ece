use std::path::PathBuf;

use clap::ValueEnum;
use patches::PartitionStrategy;
use protocol::RenderJob;
use thiserror::Error;

pub const DEFAULT_SCENE_PATH: &str = "scenes/default.txt";
pub const DEFAULT_OUTPUT_DIR: &str = "renders";
pub const DEFAULT_SEED: u64 = 2016;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSource {
    File(PathBuf),
    Random,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    /// One comma-separated line.
    #[default]
    Csv,
    /// One JSON object.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Validated parameters of one render run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Threads per execution unit.
    pub threads: usize,
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
    pub strategy: PartitionStrategy,
    pub sub_strategy: PartitionStrategy,
    /// Size of the outer pool.
    pub processes: usize,
    pub scene: SceneSource,
    pub output_dir: PathBuf,
    pub seed: u64,
    pub format: SummaryFormat,
}

impl RunConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        let counts = [
            ("threads", self.threads),
            ("frames", self.frames),
            ("width", self.width as usize),
            ("height", self.height as usize),
            ("samples", self.samples_per_pixel as usize),
            ("processes", self.processes),
        ];
        if let Some((name, _)) = counts.into_iter().find(|&(_, value)| value == 0) {
            return Err(ConfigError::Zero(name));
        }
        Ok(self)
    }

    pub fn job(&self, frame_index: usize) -> RenderJob {
        RenderJob {
            frame_index,
            width: self.width,
            height: self.height,
            samples_per_pixel: self.samples_per_pixel,
            strategy: self.strategy,
            sub_strategy: self.sub_strategy,
        }
    }
}
