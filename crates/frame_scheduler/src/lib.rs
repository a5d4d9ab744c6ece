use std::ops::Range;

use engine::{CommError, Communicator};
use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchedulerConfig {
    pub requested_frames: usize,
    /// Log the degraded-service notice when frames are clamped to the unit count.
    pub report_clamp: bool,
}

impl Default for FrameSchedulerConfig {
    fn default() -> Self {
        Self {
            requested_frames: 1,
            report_clamp: true,
        }
    }
}

/// Identity of one execution unit, fixed once the plan is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionUnit {
    pub global_id: usize,
    pub group_id: usize,
    pub local_id: usize,
}

impl ExecutionUnit {
    pub fn is_leader(&self) -> bool {
        self.local_id == 0
    }
}

/// Contiguous range of global unit ids rendering one frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameGroup {
    pub frame_index: usize,
    pub members: Range<usize>,
}

impl FrameGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn leader(&self) -> usize {
        self.members.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCountClamp {
    pub requested: usize,
    pub granted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameScheduleError {
    #[error("cannot schedule frames without execution units")]
    NoUnits,
    #[error("at least one frame must be requested")]
    NoFrames,
    #[error("unit {global_id} is outside a pool of {unit_count} units")]
    UnitOutOfRange { global_id: usize, unit_count: usize },
}

#[derive(Debug, Error)]
pub enum GroupFormationError {
    #[error(transparent)]
    Schedule(#[from] FrameScheduleError),
    #[error("group formation failed")]
    Comm(#[from] CommError),
    #[error("plan covers {unit_count} units but the communicator has {communicator_size}")]
    PlanMismatch {
        unit_count: usize,
        communicator_size: usize,
    },
    #[error("frame {frame_index} formed a group of {formed} members, planned {planned}")]
    GroupMismatch {
        frame_index: usize,
        planned: usize,
        formed: usize,
    },
}

/// Split of a unit pool into frame groups of near-equal size.
///
/// Every unit computes the same plan from the same inputs, so no unit has to
/// distribute it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    unit_count: usize,
    group_sizes: Vec<usize>,
    group_starts: Vec<usize>,
    clamp: Option<FrameCountClamp>,
}

impl FramePlan {
    pub fn new(unit_count: usize, requested_frames: usize) -> Result<Self, FrameScheduleError> {
        if unit_count == 0 {
            return Err(FrameScheduleError::NoUnits);
        }
        if requested_frames == 0 {
            return Err(FrameScheduleError::NoFrames);
        }

        // A frame cannot exist without a unit to render it.
        let frame_count = requested_frames.min(unit_count);
        let clamp = (frame_count < requested_frames).then_some(FrameCountClamp {
            requested: requested_frames,
            granted: frame_count,
        });

        let base = unit_count / frame_count;
        let extra = unit_count % frame_count;
        let group_sizes: Vec<usize> = (0..frame_count)
            .map(|frame| base + usize::from(frame < extra))
            .collect();
        let group_starts = group_sizes
            .iter()
            .scan(0, |next_start, &size| {
                let start = *next_start;
                *next_start += size;
                Some(start)
            })
            .collect();

        Ok(Self {
            unit_count,
            group_sizes,
            group_starts,
            clamp,
        })
    }

    pub fn unit_count(&self) -> usize {
        self.unit_count
    }

    pub fn frame_count(&self) -> usize {
        self.group_sizes.len()
    }

    pub fn group_sizes(&self) -> &[usize] {
        &self.group_sizes
    }

    pub fn max_group_size(&self) -> usize {
        self.group_sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn clamp(&self) -> Option<FrameCountClamp> {
        self.clamp
    }

    pub fn group(&self, frame_index: usize) -> Option<FrameGroup> {
        let start = *self.group_starts.get(frame_index)?;
        Some(FrameGroup {
            frame_index,
            members: start..start + self.group_sizes[frame_index],
        })
    }

    pub fn groups(&self) -> impl Iterator<Item = FrameGroup> + '_ {
        (0..self.frame_count()).filter_map(|frame_index| self.group(frame_index))
    }

    pub fn frame_of(&self, global_id: usize) -> Option<usize> {
        if global_id >= self.unit_count {
            return None;
        }
        // Last group whose start is not past the unit.
        Some(self.group_starts.partition_point(|&start| start <= global_id) - 1)
    }

    pub fn unit(&self, global_id: usize) -> Result<ExecutionUnit, FrameScheduleError> {
        let group_id = self
            .frame_of(global_id)
            .ok_or(FrameScheduleError::UnitOutOfRange {
                global_id,
                unit_count: self.unit_count,
            })?;
        Ok(ExecutionUnit {
            global_id,
            group_id,
            local_id: global_id - self.group_starts[group_id],
        })
    }
}

/// Membership and communicator of one frame group, as seen by one unit.
pub struct GroupDescriptor<'e, M> {
    unit: ExecutionUnit,
    group: FrameGroup,
    comm: Communicator<'e, M>,
}

impl<'e, M> GroupDescriptor<'e, M> {
    pub fn unit(&self) -> ExecutionUnit {
        self.unit
    }

    pub fn frame_index(&self) -> usize {
        self.group.frame_index
    }

    pub fn size(&self) -> usize {
        self.group.len()
    }

    pub fn is_leader(&self) -> bool {
        self.unit.is_leader()
    }

    pub fn comm(&self) -> &Communicator<'e, M> {
        &self.comm
    }
}

#[derive(Debug, Clone)]
pub struct FrameScheduler {
    config: FrameSchedulerConfig,
}

impl FrameScheduler {
    pub fn new(config: FrameSchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> FrameSchedulerConfig {
        self.config
    }

    /// The warning [`plan`](Self::plan) logs for `plan`, if this scheduler
    /// reports clamps and the frame count was reduced.
    pub fn clamp_notice(&self, plan: &FramePlan) -> Option<String> {
        let clamp = plan.clamp().filter(|_| self.config.report_clamp)?;
        Some(format!(
            "only {} execution units available, rendering {} frames instead of {}",
            plan.unit_count(),
            clamp.granted,
            clamp.requested
        ))
    }

    pub fn plan(&self, unit_count: usize) -> Result<FramePlan, FrameScheduleError> {
        let plan = FramePlan::new(unit_count, self.config.requested_frames)?;
        if let Some(notice) = self.clamp_notice(&plan) {
            warn!("{notice}");
        }
        debug!("frame group sizes {:?}", plan.group_sizes());
        Ok(plan)
    }

    /// Forms the calling unit's frame group.
    ///
    /// Collective over `world`: every unit of the plan must call it with the
    /// same plan, otherwise the units that did call it never return.
    pub fn form_group<'e, M>(
        &self,
        plan: &FramePlan,
        world: &Communicator<'e, M>,
    ) -> Result<GroupDescriptor<'e, M>, GroupFormationError> {
        if world.size() != plan.unit_count() {
            return Err(GroupFormationError::PlanMismatch {
                unit_count: plan.unit_count(),
                communicator_size: world.size(),
            });
        }
        let unit = plan.unit(world.rank())?;
        let group = plan
            .group(unit.group_id)
            .ok_or(FrameScheduleError::UnitOutOfRange {
                global_id: unit.global_id,
                unit_count: plan.unit_count(),
            })?;
        let color = u32::try_from(unit.group_id).map_err(|_| FrameScheduleError::UnitOutOfRange {
            global_id: unit.global_id,
            unit_count: plan.unit_count(),
        })?;
        let comm = world.split(color, unit.global_id)?;
        if comm.size() != group.len() || comm.rank() != unit.local_id {
            return Err(GroupFormationError::GroupMismatch {
                frame_index: group.frame_index,
                planned: group.len(),
                formed: comm.size(),
            });
        }
        debug!(
            "unit {} joined frame {} as local unit {} of {}",
            unit.global_id,
            group.frame_index,
            unit.local_id,
            group.len()
        );
        Ok(GroupDescriptor { unit, group, comm })
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(FrameSchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use engine::World;

    use super::*;

    fn scheduler(requested_frames: usize) -> FrameScheduler {
        FrameScheduler::new(FrameSchedulerConfig {
            requested_frames,
            report_clamp: true,
        })
    }

    #[test]
    fn splits_six_units_into_two_frames_of_three() {
        let plan = scheduler(2).plan(6).unwrap();

        assert_eq!(plan.frame_count(), 2);
        assert_eq!(plan.group_sizes(), &[3, 3]);
        assert_eq!(plan.group(0).unwrap().members, 0..3);
        assert_eq!(plan.group(1).unwrap().members, 3..6);
        assert_eq!(plan.clamp(), None);
    }

    #[test_log::test]
    fn clamps_frames_to_the_unit_count() {
        let scheduler = scheduler(5);
        let plan = scheduler.plan(2).unwrap();

        assert_eq!(plan.frame_count(), 2);
        assert_eq!(plan.group_sizes(), &[1, 1]);
        assert_eq!(
            plan.clamp(),
            Some(FrameCountClamp {
                requested: 5,
                granted: 2
            })
        );
        assert_eq!(
            scheduler.clamp_notice(&plan).as_deref(),
            Some("only 2 execution units available, rendering 2 frames instead of 5")
        );
    }

    #[test]
    fn clamp_is_reported_only_when_asked_and_needed() {
        let quiet = FrameScheduler::new(FrameSchedulerConfig {
            requested_frames: 5,
            report_clamp: false,
        });
        let clamped = quiet.plan(2).unwrap();
        assert!(clamped.clamp().is_some());
        assert_eq!(quiet.clamp_notice(&clamped), None);

        let loud = scheduler(2);
        assert_eq!(loud.clamp_notice(&loud.plan(6).unwrap()), None);
    }

    #[test]
    fn leading_groups_take_the_remainder() {
        let plan = FramePlan::new(7, 3).unwrap();

        assert_eq!(plan.group_sizes(), &[3, 2, 2]);
        let ranges: Vec<_> = plan.groups().map(|group| group.members).collect();
        assert_eq!(ranges, vec![0..3, 3..5, 5..7]);
        assert_eq!(plan.max_group_size(), 3);
    }

    #[test]
    fn group_sizes_are_fair_and_sum_to_the_pool() {
        for unit_count in 1..=40 {
            for requested_frames in 1..=12 {
                let plan = FramePlan::new(unit_count, requested_frames).unwrap();
                let sizes = plan.group_sizes();
                let largest = sizes.iter().max().unwrap();
                let smallest = sizes.iter().min().unwrap();
                assert!(largest - smallest <= 1, "P={unit_count} F={requested_frames}");
                assert!(*smallest >= 1);
                assert_eq!(sizes.iter().sum::<usize>(), unit_count);
            }
        }
    }

    #[test]
    fn every_unit_finds_exactly_one_group() {
        let plan = FramePlan::new(11, 4).unwrap();
        for global_id in 0..11 {
            let unit = plan.unit(global_id).unwrap();
            let group = plan.group(unit.group_id).unwrap();
            assert!(group.members.contains(&global_id));
            assert_eq!(group.leader() + unit.local_id, global_id);
        }
        assert_eq!(plan.frame_of(11), None);
        assert_eq!(
            plan.unit(11),
            Err(FrameScheduleError::UnitOutOfRange {
                global_id: 11,
                unit_count: 11
            })
        );
    }

    #[test]
    fn rejects_empty_pools_and_zero_frames() {
        assert_eq!(FramePlan::new(0, 1), Err(FrameScheduleError::NoUnits));
        assert_eq!(FramePlan::new(3, 0), Err(FrameScheduleError::NoFrames));
    }

    #[test]
    fn forms_one_communicator_per_frame() {
        let scheduler = scheduler(2);
        let formed = World::new(5)
            .unwrap()
            .launch(|world: Communicator<'_, ()>| {
                let plan = scheduler.plan(world.size()).unwrap();
                let group = scheduler.form_group(&plan, &world).unwrap();
                (
                    group.frame_index(),
                    group.unit().local_id,
                    group.comm().members().to_vec(),
                    group.is_leader(),
                )
            })
            .unwrap();

        assert_eq!(formed[0], (0, 0, vec![0, 1, 2], true));
        assert_eq!(formed[2], (0, 2, vec![0, 1, 2], false));
        assert_eq!(formed[3], (1, 0, vec![3, 4], true));
        assert_eq!(formed[4], (1, 1, vec![3, 4], false));
    }

    #[test]
    fn group_formation_rejects_a_plan_for_another_pool() {
        let scheduler = scheduler(1);
        let results = World::new(2)
            .unwrap()
            .launch(|world: Communicator<'_, ()>| {
                let plan = FramePlan::new(3, 1).unwrap();
                scheduler.form_group(&plan, &world).err()
            })
            .unwrap();

        assert!(matches!(
            results[0],
            Some(GroupFormationError::PlanMismatch {
                unit_count: 3,
                communicator_size: 2
            })
        ));
    }
}
