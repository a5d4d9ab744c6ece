//! The shared-memory run: frame groups of threads inside one process.

use std::thread;
use std::time::Instant;

use aggregation::{FrameTimer, RunMetadata, RunSummary, SharedTimingTable};
use crossbeam_channel::{Receiver, Sender, unbounded};
use frame_scheduler::{ExecutionUnit, FrameGroup, FrameScheduler, FrameSchedulerConfig};
use log::{debug, info};
use patches::partition;
use protocol::{PatchPixels, PixelBuffer};
use renderer::{SampleEvaluator, SeedStream, WorkerExecutor};

use crate::RunError;
use crate::config::RunConfig;

/// Renders every frame on `config.threads` threads. Each frame's leader
/// thread composes the tiles of its group, writes the frame and records
/// its duration.
///
/// The summary total is the wall time from the first spawn until every
/// thread has joined.
pub fn run_threaded<E: SampleEvaluator + ?Sized>(
    config: &RunConfig,
    evaluator: &E,
) -> Result<RunSummary, RunError> {
    let scheduler = FrameScheduler::new(FrameSchedulerConfig {
        requested_frames: config.frames,
        report_clamp: true,
    });
    let plan = scheduler.plan(config.threads)?;
    let timings = SharedTimingTable::new(plan.frame_count())?;

    let started = Instant::now();
    thread::scope(|scope| -> Result<(), RunError> {
        let mut handles = Vec::with_capacity(plan.unit_count());
        for group in plan.groups() {
            let (tiles, inbox) = unbounded();
            for global_id in group.members.clone() {
                let unit = plan.unit(global_id)?;
                let worker = FrameWorker {
                    config,
                    group: group.clone(),
                    unit,
                    tiles: tiles.clone(),
                    inbox: unit.is_leader().then(|| inbox.clone()),
                    timings: &timings,
                };
                let handle = thread::Builder::new()
                    .name(format!("frame-{}-unit-{}", group.frame_index, unit.local_id))
                    .spawn_scoped(scope, move || worker.run(evaluator))
                    .map_err(|source| RunError::Spawn { unit: global_id, source })?;
                handles.push((global_id, handle));
            }
        }
        for (global_id, handle) in handles {
            handle
                .join()
                .map_err(|_| RunError::UnitPanicked { unit: global_id })??;
        }
        Ok(())
    })?;
    let wall_time = started.elapsed();

    let metadata = RunMetadata {
        frame_count: plan.frame_count(),
        width: config.width,
        height: config.height,
        samples_per_pixel: config.samples_per_pixel,
        unit_count: plan.unit_count(),
        units_per_group: plan.max_group_size(),
        sub_strategy: config.strategy.label().to_owned(),
    };
    let summary = timings.into_collector().summarize_over(metadata, wall_time)?;
    Ok(summary)
}

struct FrameWorker<'a> {
    config: &'a RunConfig,
    group: FrameGroup,
    unit: ExecutionUnit,
    tiles: Sender<PatchPixels>,
    /// Present on the group leader only.
    inbox: Option<Receiver<PatchPixels>>,
    timings: &'a SharedTimingTable,
}

impl FrameWorker<'_> {
    fn run<E: SampleEvaluator + ?Sized>(self, evaluator: &E) -> Result<(), RunError> {
        let timer = FrameTimer::start();
        let job = self.config.job(self.group.frame_index);
        let group_size = u32::try_from(self.group.len()).map_err(|_| RunError::GroupTooLarge {
            size: self.group.len(),
        })?;
        let local_id = self.unit.local_id as u32;
        let patch = partition(job.width, job.height, group_size, local_id, job.strategy)?;
        debug!(
            "thread {} renders {} of frame {}",
            self.unit.global_id, patch, job.frame_index
        );

        let mut rng = SeedStream::new(self.config.seed, job.frame_index, self.unit.local_id).rng(0);
        let tile = WorkerExecutor::new(&job, evaluator).render_patch(patch, &mut rng)?;

        let Some(inbox) = self.inbox else {
            return self.tiles.send(tile).map_err(|_| RunError::LeaderGone {
                frame_index: job.frame_index,
            });
        };
        drop(self.tiles);

        let mut frame = PixelBuffer::new(job.width, job.height);
        frame.blit(&tile)?;
        for _ in 1..self.group.len() {
            let tile = inbox.recv().map_err(|_| RunError::MissingTiles {
                frame_index: job.frame_index,
            })?;
            frame.blit(&tile)?;
        }

        let path = images::write_frame(&self.config.output_dir, job.frame_index, &frame)?;
        let timing = timer.stop(job.frame_index);
        self.timings.record(&timing)?;
        info!(
            "frame {} written to {} after {:.3}s",
            job.frame_index + 1,
            path.display(),
            timing.duration().as_secs_f64()
        );
        Ok(())
    }
}
