use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use patches::PartitionStrategy;
use rand::rngs::SmallRng;
use renderer::{Sample, SampleEvaluator};

use super::*;

/// Same color everywhere, so a composed frame is uniform exactly when its
/// patches tile it without gaps or overlaps.
struct Flat;

const FLAT_BGR: [u8; 3] = [255, 181, 127];

impl SampleEvaluator for Flat {
    fn evaluate(&self, _u: f32, _v: f32, _rng: &mut SmallRng) -> Sample {
        Sample::new(0.25, 0.5, 1.0)
    }
}

static RUN_ID: AtomicUsize = AtomicUsize::new(0);

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "raytrace-{name}-{}-{}",
        std::process::id(),
        RUN_ID.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn config(output_dir: &Path) -> RunConfig {
    RunConfig {
        threads: 3,
        frames: 2,
        width: 13,
        height: 9,
        samples_per_pixel: 2,
        strategy: PartitionStrategy::Blocks,
        sub_strategy: PartitionStrategy::Cols,
        processes: 5,
        scene: SceneSource::Random,
        output_dir: output_dir.to_path_buf(),
        seed: 1,
        format: SummaryFormat::Csv,
    }
}

fn assert_uniform_frame(path: &Path, width: u32, height: u32) {
    let image = image::open(path).unwrap().to_rgb8();
    assert_eq!((image.width(), image.height()), (width, height));
    let [blue, green, red] = FLAT_BGR;
    for (x, y, pixel) in image.enumerate_pixels() {
        assert_eq!(pixel.0, [red, green, blue], "{} pixel ({x}, {y})", path.display());
    }
}

#[test_log::test]
fn hybrid_run_writes_every_frame_and_summarizes() {
    let dir = scratch_dir("hybrid");
    let config = config(&dir);

    let summary = run_hybrid(&config, &Flat).unwrap();

    let metadata = summary.metadata();
    assert_eq!(metadata.frame_count, 2);
    assert_eq!(metadata.unit_count, 5);
    assert_eq!(metadata.units_per_group, 3);
    assert_eq!(metadata.sub_strategy, "cols");
    assert_eq!(summary.frame_times().len(), 2);
    assert_eq!(
        Some(summary.total()),
        summary.frame_times().iter().copied().max()
    );
    for frame in 1..=2 {
        assert_uniform_frame(&dir.join(format!("frame_{frame}.bmp")), 13, 9);
    }
    fs::remove_dir_all(dir).unwrap();
}

#[test_log::test]
fn hybrid_run_clamps_frames_to_processes() {
    let dir = scratch_dir("clamp");
    let config = RunConfig {
        processes: 2,
        frames: 5,
        threads: 1,
        strategy: PartitionStrategy::Rows,
        sub_strategy: PartitionStrategy::Rows,
        ..config(&dir)
    };

    let summary = run_hybrid(&config, &Flat).unwrap();

    assert_eq!(summary.metadata().frame_count, 2);
    assert!(dir.join("frame_2.bmp").is_file());
    assert!(!dir.join("frame_3.bmp").exists());
    fs::remove_dir_all(dir).unwrap();
}

#[test_log::test]
fn hybrid_run_reports_a_failed_frame_write_instead_of_hanging() {
    // Frame 1 is written by the coordinator, frame 2 by a remote leader.
    for blocked_frame in 1..=2 {
        let dir = scratch_dir("unwritable");
        let blocked = dir.join(format!("frame_{blocked_frame}.bmp"));
        fs::create_dir_all(&blocked).unwrap();
        let config = RunConfig {
            processes: 2,
            frames: 2,
            threads: 1,
            ..config(&dir)
        };

        let result = run_hybrid(&config, &Flat);

        match result {
            Err(RunError::Image(ImageWriteError::Encode { path, .. })) => assert_eq!(path, blocked),
            other => panic!("frame {blocked_frame}: unexpected outcome {other:?}"),
        }
        fs::remove_dir_all(dir).unwrap();
    }
}

#[test]
fn hybrid_run_with_more_units_than_rows() {
    let dir = scratch_dir("thin");
    let config = RunConfig {
        processes: 4,
        frames: 1,
        threads: 4,
        height: 2,
        strategy: PartitionStrategy::Rows,
        sub_strategy: PartitionStrategy::Rows,
        ..config(&dir)
    };

    run_hybrid(&config, &Flat).unwrap();

    assert_uniform_frame(&dir.join("frame_1.bmp"), 13, 2);
    fs::remove_dir_all(dir).unwrap();
}

#[test_log::test]
fn threaded_run_groups_threads_per_frame() {
    let dir = scratch_dir("threaded");
    let config = RunConfig {
        threads: 7,
        frames: 3,
        strategy: PartitionStrategy::Rows,
        sub_strategy: PartitionStrategy::Rows,
        ..config(&dir)
    };

    let summary = run_threaded(&config, &Flat).unwrap();

    let metadata = summary.metadata();
    assert_eq!(metadata.frame_count, 3);
    assert_eq!(metadata.unit_count, 7);
    assert_eq!(metadata.units_per_group, 3);
    assert_eq!(metadata.sub_strategy, "rows");
    // The total spans the whole run, so it covers every frame.
    assert!(summary.frame_times().iter().all(|&time| time <= summary.total()));
    for frame in 1..=3 {
        assert_uniform_frame(&dir.join(format!("frame_{frame}.bmp")), 13, 9);
    }
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn summary_formats() {
    let dir = scratch_dir("format");
    let config = RunConfig {
        processes: 1,
        frames: 1,
        threads: 1,
        ..config(&dir)
    };
    let summary = run_hybrid(&config, &Flat).unwrap();

    let csv = format_summary(&summary, SummaryFormat::Csv).unwrap();
    assert!(csv.starts_with("1,13,9,2,1,1,cols,"), "{csv}");
    assert_eq!(csv.split(',').count(), 9);

    let json: serde_json::Value =
        serde_json::from_str(&format_summary(&summary, SummaryFormat::Json).unwrap()).unwrap();
    assert_eq!(json["width"], 13);
    assert_eq!(json["frame_seconds"].as_array().map(Vec::len), Some(1));
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn real_scene_renders_through_the_tracer() {
    let dir = scratch_dir("tracer");
    let config = RunConfig {
        processes: 2,
        frames: 1,
        threads: 2,
        width: 8,
        height: 6,
        samples_per_pixel: 1,
        ..config(&dir)
    };
    let tracer = tracer_for(&config);
    assert!(!tracer.scene().is_empty());

    run_hybrid(&config, &tracer).unwrap();

    let image = image::open(dir.join("frame_1.bmp")).unwrap().to_rgb8();
    assert!(image.pixels().any(|pixel| pixel.0 != [0, 0, 0]));
    fs::remove_dir_all(dir).unwrap();
}
