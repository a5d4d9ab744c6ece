use std::thread;

use log::debug;
use patches::{Patch, PatchTable};
use protocol::{PatchPixels, PixelBuffer, RenderJob};

use crate::{RenderError, SampleEvaluator, SeedStream, WorkerExecutor};

/// Shared-memory threads of one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadTeam {
    threads: usize,
}

impl ThreadTeam {
    pub fn new(threads: usize) -> Result<Self, RenderError> {
        if threads == 0 {
            return Err(RenderError::NoThreads);
        }
        Ok(Self { threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Splits `unit_patch` across the team with the job's sub-strategy and
    /// returns a zeroed full-frame buffer holding exactly that patch.
    ///
    /// Joining every thread is the team's barrier: the buffer is composed
    /// only after all tiles exist.
    pub fn render<E: SampleEvaluator + ?Sized>(
        &self,
        job: &RenderJob,
        unit_patch: Patch,
        seeds: SeedStream,
        evaluator: &E,
    ) -> Result<PixelBuffer, RenderError> {
        let thread_count = u32::try_from(self.threads).map_err(|_| RenderError::NoThreads)?;
        let table = PatchTable::subdivide(unit_patch, thread_count, job.sub_strategy)?;
        let executor = WorkerExecutor::new(job, evaluator);

        let tiles = thread::scope(|scope| -> Result<Vec<PatchPixels>, RenderError> {
            let mut handles = Vec::with_capacity(table.len());
            for (thread_id, &patch) in table.as_slice().iter().enumerate() {
                let executor = &executor;
                debug!(
                    "frame {} thread {} renders {}",
                    job.frame_index, thread_id, patch
                );
                let handle = thread::Builder::new()
                    .name(format!("render-{thread_id}"))
                    .spawn_scoped(scope, move || {
                        executor.render_patch(patch, &mut seeds.rng(thread_id))
                    })
                    .map_err(|source| RenderError::Spawn {
                        thread: thread_id,
                        source,
                    })?;
                handles.push(handle);
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(thread_id, handle)| {
                    handle
                        .join()
                        .map_err(|_| RenderError::ThreadPanicked { thread: thread_id })?
                })
                .collect()
        })?;

        let mut buffer = PixelBuffer::new(job.width, job.height);
        for tile in &tiles {
            buffer.blit(tile)?;
        }
        Ok(buffer)
    }
}
