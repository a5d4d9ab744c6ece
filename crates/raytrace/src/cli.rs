use std::path::PathBuf;

use clap::{Args, Parser};
use patches::PartitionStrategy;

use crate::config::{
    ConfigError, DEFAULT_OUTPUT_DIR, DEFAULT_SCENE_PATH, DEFAULT_SEED, RunConfig, SceneSource,
    SummaryFormat,
};

/// Options shared by both binaries.
#[derive(Debug, Args)]
pub struct RunOptions {
    /// Scene description file.
    #[arg(long, default_value = DEFAULT_SCENE_PATH)]
    scene: PathBuf,
    /// Render the procedural sphere field instead of a scene file.
    #[arg(long)]
    random_scene: bool,
    /// Directory receiving frame_<n>.bmp files.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Seed for sampling and for the procedural scene.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Summary format on stdout.
    #[arg(long, value_enum, default_value = "csv")]
    format: SummaryFormat,
}

impl RunOptions {
    fn scene_source(&self) -> SceneSource {
        if self.random_scene {
            SceneSource::Random
        } else {
            SceneSource::File(self.scene.clone())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Render frames on groups of processes, each splitting its patch across threads"
)]
pub struct HybridArguments {
    /// Threads per process.
    threads: usize,
    /// Frames to render; reduced to the process count if larger.
    frames: usize,
    width: u32,
    height: u32,
    /// Samples per pixel.
    samples: u32,
    /// Split of a frame across processes: rows, cols or anything else for blocks.
    strategy: PartitionStrategy,
    /// Split of a process patch across its threads.
    sub_strategy: PartitionStrategy,
    /// Processes in the outer pool.
    #[arg(long, default_value_t = 1)]
    processes: usize,
    #[command(flatten)]
    options: RunOptions,
}

impl HybridArguments {
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        RunConfig {
            threads: self.threads,
            frames: self.frames,
            width: self.width,
            height: self.height,
            samples_per_pixel: self.samples,
            strategy: self.strategy,
            sub_strategy: self.sub_strategy,
            processes: self.processes,
            scene: self.options.scene_source(),
            output_dir: self.options.output_dir,
            seed: self.options.seed,
            format: self.options.format,
        }
        .validate()
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Render frames on groups of threads sharing one process"
)]
pub struct ThreadedArguments {
    /// Threads in total, shared out between frames.
    threads: usize,
    /// Frames to render; reduced to the thread count if larger.
    frames: usize,
    width: u32,
    height: u32,
    /// Samples per pixel.
    samples: u32,
    /// Split of a frame across its threads: rows, cols or anything else for blocks.
    strategy: PartitionStrategy,
    #[command(flatten)]
    options: RunOptions,
}

impl ThreadedArguments {
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        RunConfig {
            threads: self.threads,
            frames: self.frames,
            width: self.width,
            height: self.height,
            samples_per_pixel: self.samples,
            strategy: self.strategy,
            sub_strategy: self.strategy,
            processes: 1,
            scene: self.options.scene_source(),
            output_dir: self.options.output_dir,
            seed: self.options.seed,
            format: self.options.format,
        }
        .validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_positionals_and_defaults() {
        let config = HybridArguments::try_parse_from([
            "raytrace", "4", "2", "320", "200", "8", "rows", "diagonal", "--processes", "6",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.threads, 4);
        assert_eq!(config.frames, 2);
        assert_eq!((config.width, config.height), (320, 200));
        assert_eq!(config.samples_per_pixel, 8);
        assert_eq!(config.strategy, PartitionStrategy::Rows);
        assert_eq!(config.sub_strategy, PartitionStrategy::Blocks);
        assert_eq!(config.processes, 6);
        assert_eq!(config.scene, SceneSource::File(PathBuf::from(DEFAULT_SCENE_PATH)));
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(config.format, SummaryFormat::Csv);
    }

    #[test]
    fn threaded_reuses_the_strategy_for_its_label() {
        let config = ThreadedArguments::try_parse_from([
            "raytrace-threaded",
            "3",
            "1",
            "16",
            "16",
            "2",
            "cols",
            "--random-scene",
            "--format",
            "json",
            "--seed",
            "9",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.sub_strategy, PartitionStrategy::Cols);
        assert_eq!(config.processes, 1);
        assert_eq!(config.scene, SceneSource::Random);
        assert_eq!(config.format, SummaryFormat::Json);
        assert_eq!(config.seed, 9);
    }

    #[test]
    fn zero_width_is_a_config_error() {
        let result = ThreadedArguments::try_parse_from([
            "raytrace-threaded", "1", "1", "0", "16", "2", "rows",
        ])
        .unwrap()
        .into_config();
        assert_eq!(result, Err(ConfigError::Zero("width")));
    }
}
