//! The two-level run: frame groups of ranks, each rank splitting its patch
//! across a thread team.

use aggregation::{
    COORDINATOR, FrameTimer, RunMetadata, RunSummary, TimingCollector, reduce_to_leader,
    send_report,
};
use engine::{Communicator, World};
use frame_scheduler::{FrameScheduler, FrameSchedulerConfig};
use log::{debug, error, info};
use patches::PatchTable;
use protocol::RenderMessage;
use renderer::{SampleEvaluator, SeedStream, ThreadTeam};

use crate::RunError;
use crate::config::RunConfig;

/// Renders every frame on `config.processes` ranks and returns the summary
/// assembled by the coordinator.
///
/// When ranks fail, the error returned is the first one that is not merely
/// a consequence of another rank exiting.
pub fn run_hybrid<E: SampleEvaluator + ?Sized>(
    config: &RunConfig,
    evaluator: &E,
) -> Result<RunSummary, RunError> {
    let world = World::new(config.processes)?;
    let outcomes = world.launch::<RenderMessage, _, _>(|comm| {
        render_rank(config, evaluator, &comm)
            .inspect_err(|err| error!("rank {} failed: {}", comm.rank(), err))
    })?;

    let mut summary = None;
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(Some(rank_summary)) => summary = Some(rank_summary),
            Ok(None) => {}
            Err(err) => failures.push(err),
        }
    }
    if !failures.is_empty() {
        let root = failures
            .iter()
            .position(|err| !err.is_peer_gone())
            .unwrap_or(0);
        return Err(failures.swap_remove(root));
    }
    summary.ok_or(RunError::MissingSummary)
}

fn render_rank<E: SampleEvaluator + ?Sized>(
    config: &RunConfig,
    evaluator: &E,
    world: &Communicator<'_, RenderMessage>,
) -> Result<Option<RunSummary>, RunError> {
    let scheduler = FrameScheduler::new(FrameSchedulerConfig {
        requested_frames: config.frames,
        report_clamp: world.rank() == COORDINATOR,
    });
    let plan = scheduler.plan(world.size())?;
    let group = scheduler.form_group(&plan, world)?;
    let unit = group.unit();
    let job = config.job(group.frame_index());

    let table = if group.is_leader() {
        let count = u32::try_from(group.size()).map_err(|_| RunError::GroupTooLarge {
            size: group.size(),
        })?;
        let table = PatchTable::partition(job.width, job.height, count, job.strategy)?;
        debug_assert!(table.verify_tiling().is_ok(), "{table:?}");
        Some(table)
    } else {
        None
    };
    let table: PatchTable = group.comm().broadcast(0, table)?;
    let timer = FrameTimer::start();

    let patch = table.get(unit.local_id).ok_or(RunError::MissingPatch {
        frame_index: job.frame_index,
        local_id: unit.local_id,
    })?;
    debug!(
        "rank {} renders {} of frame {}",
        unit.global_id, patch, job.frame_index
    );
    let seeds = SeedStream::new(config.seed, job.frame_index, unit.local_id);
    let local = ThreadTeam::new(config.threads)?.render(&job, patch, seeds, evaluator)?;

    let Some(frame) = reduce_to_leader(group.comm(), local)? else {
        return Ok(None);
    };
    let timing = timer.stop(job.frame_index);
    let path = images::write_frame(&config.output_dir, job.frame_index, &frame)?;
    info!(
        "frame {} written to {} after {:.3}s",
        job.frame_index + 1,
        path.display(),
        timing.duration().as_secs_f64()
    );

    if world.rank() != COORDINATOR {
        send_report(world, COORDINATOR, timing.report())?;
        return Ok(None);
    }
    let mut collector = TimingCollector::new(plan.frame_count())?;
    collector.record(timing.report())?;
    collector.collect_remote(world)?;
    let summary = collector.summarize(RunMetadata {
        frame_count: plan.frame_count(),
        width: config.width,
        height: config.height,
        samples_per_pixel: config.samples_per_pixel,
        unit_count: plan.unit_count(),
        units_per_group: config.threads,
        sub_strategy: config.sub_strategy.label().to_owned(),
    })?;
    Ok(Some(summary))
}
