use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use engine::{CommError, Communicator, Payload, Source, Tag};
use log::{debug, info};
use protocol::{FrameTiming, TimingReport};

use crate::summary::{RunMetadata, RunSummary};
use crate::{AggregationError, TimingError};

/// Measures one frame from worker dispatch to completed reduction.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimer {
    started_at: Instant,
}

impl FrameTimer {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn stop(self, frame_index: usize) -> FrameTiming {
        FrameTiming {
            frame_index,
            started_at: self.started_at,
            finished_at: Instant::now(),
        }
    }
}

/// Per-frame durations of one run. Each frame index is written once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingCollector {
    durations: Vec<Option<Duration>>,
}

impl TimingCollector {
    pub fn new(frame_count: usize) -> Result<Self, TimingError> {
        if frame_count == 0 {
            return Err(TimingError::NoFrames);
        }
        Ok(Self {
            durations: vec![None; frame_count],
        })
    }

    pub fn frame_count(&self) -> usize {
        self.durations.len()
    }

    pub fn record(&mut self, report: TimingReport) -> Result<(), TimingError> {
        let frame_count = self.frame_count();
        let slot = self
            .durations
            .get_mut(report.frame_index)
            .ok_or(TimingError::FrameOutOfRange {
                frame_index: report.frame_index,
                frame_count,
            })?;
        if slot.is_some() {
            return Err(TimingError::Duplicate {
                frame_index: report.frame_index,
            });
        }
        *slot = Some(report.duration);
        Ok(())
    }

    pub fn missing(&self) -> impl Iterator<Item = usize> + '_ {
        self.durations
            .iter()
            .enumerate()
            .filter(|(_, duration)| duration.is_none())
            .map(|(frame_index, _)| frame_index)
    }

    pub fn is_complete(&self) -> bool {
        self.missing().next().is_none()
    }

    /// Receives one report per frame not yet recorded. Reports are matched by
    /// tag (the frame index) from any sender, so their arrival order is free.
    pub fn collect_remote<M>(&mut self, comm: &Communicator<'_, M>) -> Result<(), AggregationError>
    where
        TimingReport: Payload<M>,
    {
        let missing: Vec<usize> = self.missing().collect();
        for frame_index in missing {
            let tag = frame_index as Tag;
            let (from, report): (usize, TimingReport) = comm.recv(Source::Any, tag)?;
            if report.frame_index != frame_index {
                return Err(TimingError::TagMismatch {
                    frame_index: report.frame_index,
                    tag,
                }
                .into());
            }
            debug!(
                "coordinator got frame {} timing from rank {}: {:?}",
                frame_index, from, report.duration
            );
            self.record(report)?;
        }
        Ok(())
    }

    pub fn durations(&self) -> Result<Vec<Duration>, TimingError> {
        self.durations
            .iter()
            .enumerate()
            .map(|(frame_index, duration)| duration.ok_or(TimingError::Missing { frame_index }))
            .collect()
    }

    /// Total time is the slowest frame, since frames render concurrently.
    pub fn summarize(&self, metadata: RunMetadata) -> Result<RunSummary, TimingError> {
        let frame_times = self.durations()?;
        let total = frame_times.iter().copied().max().unwrap_or_default();
        info!(
            "{} frames done, slowest took {:.3}s",
            frame_times.len(),
            total.as_secs_f64()
        );
        Ok(RunSummary::new(metadata, total, frame_times))
    }

    /// Like [`summarize`](Self::summarize), but the total is the measured
    /// wall time of the whole run rather than the slowest frame.
    pub fn summarize_over(
        &self,
        metadata: RunMetadata,
        wall_time: Duration,
    ) -> Result<RunSummary, TimingError> {
        let frame_times = self.durations()?;
        info!(
            "{} frames done in {:.3}s",
            frame_times.len(),
            wall_time.as_secs_f64()
        );
        Ok(RunSummary::new(metadata, wall_time, frame_times))
    }
}

/// Sends a frame leader's timing to the coordinator, tagged by frame index.
pub fn send_report<M>(
    comm: &Communicator<'_, M>,
    coordinator: usize,
    report: TimingReport,
) -> Result<(), CommError>
where
    TimingReport: Payload<M>,
{
    comm.send(coordinator, report.frame_index as Tag, report)
}

/// A [`TimingCollector`] shared by the threads of one process.
#[derive(Debug)]
pub struct SharedTimingTable {
    collector: Mutex<TimingCollector>,
}

impl SharedTimingTable {
    pub fn new(frame_count: usize) -> Result<Self, TimingError> {
        Ok(Self {
            collector: Mutex::new(TimingCollector::new(frame_count)?),
        })
    }

    pub fn record(&self, timing: &FrameTiming) -> Result<(), TimingError> {
        self.collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(timing.report())
    }

    pub fn into_collector(self) -> TimingCollector {
        self.collector
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
