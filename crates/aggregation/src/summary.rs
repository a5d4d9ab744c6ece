use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Run parameters echoed in the summary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
    pub unit_count: usize,
    pub units_per_group: usize,
    /// Canonical strategy label (`rows`, `cols` or `blocks`). An argument
    /// that fell back to blocks is reported as `blocks`, not as typed.
    pub sub_strategy: String,
}

/// The one record a run emits: its parameters, the total wall time and every
/// frame's duration in frame order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    metadata: RunMetadata,
    #[serde(rename = "total_seconds", serialize_with = "seconds")]
    total: Duration,
    #[serde(rename = "frame_seconds", serialize_with = "seconds_list")]
    frame_times: Vec<Duration>,
}

impl RunSummary {
    pub fn new(metadata: RunMetadata, total: Duration, frame_times: Vec<Duration>) -> Self {
        Self {
            metadata,
            total,
            frame_times,
        }
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn frame_times(&self) -> &[Duration] {
        &self.frame_times
    }
}

fn seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

fn seconds_list<S: Serializer>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(durations.iter().map(Duration::as_secs_f64))
}

/// `frames,width,height,samples,units,units_per_group,sub_strategy,total,times...`
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = &self.metadata;
        write!(
            f,
            "{},{},{},{},{},{},{},{}",
            metadata.frame_count,
            metadata.width,
            metadata.height,
            metadata.samples_per_pixel,
            metadata.unit_count,
            metadata.units_per_group,
            metadata.sub_strategy,
            self.total.as_secs_f64()
        )?;
        for frame_time in &self.frame_times {
            write!(f, ",{}", frame_time.as_secs_f64())?;
        }
        Ok(())
    }
}
