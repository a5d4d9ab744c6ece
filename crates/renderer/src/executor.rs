use patches::Patch;
use protocol::{Bgr, PatchPixels, PixelBuffer, RenderJob};
use rand::Rng;
use rand::rngs::SmallRng;

use crate::{RenderError, Sample, SampleEvaluator};

/// Renders patches of one job with one evaluator.
pub struct WorkerExecutor<'a, E: ?Sized> {
    job: &'a RenderJob,
    evaluator: &'a E,
}

impl<'a, E: SampleEvaluator + ?Sized> WorkerExecutor<'a, E> {
    pub fn new(job: &'a RenderJob, evaluator: &'a E) -> Self {
        Self { job, evaluator }
    }

    pub fn job(&self) -> &RenderJob {
        self.job
    }

    /// Averages `samples_per_pixel` jittered samples of pixel `(x, y)` and
    /// converts the result to an 8-bit, gamma-corrected pixel.
    pub fn shade_pixel(&self, x: u32, y: u32, rng: &mut SmallRng) -> Bgr {
        let width = self.job.width as f32;
        let height = self.job.height as f32;
        let samples = self.job.samples_per_pixel;

        let mut sum = Sample::BLACK;
        for _ in 0..samples {
            let u = (x as f32 + rng.random::<f32>()) / width;
            let v = (y as f32 + rng.random::<f32>()) / height;
            sum = sum + self.evaluator.evaluate(u, v, rng);
        }
        to_bgr(gamma_correct(sum.scaled(1.0 / samples as f32)))
    }

    pub fn render_patch(&self, patch: Patch, rng: &mut SmallRng) -> Result<PatchPixels, RenderError> {
        if self.job.samples_per_pixel == 0 {
            return Err(RenderError::NoSamples);
        }
        if !self.job.region().contains_patch(&patch) {
            return Err(RenderError::PatchOutsideFrame {
                patch,
                width: self.job.width,
                height: self.job.height,
            });
        }
        let mut tile = PatchPixels::new(patch);
        for (x, y) in patch.pixels() {
            tile.set(x, y, self.shade_pixel(x, y, rng))?;
        }
        Ok(tile)
    }

    /// Renders `patch` straight into a full-frame buffer.
    pub fn render_into(
        &self,
        patch: Patch,
        buffer: &mut PixelBuffer,
        rng: &mut SmallRng,
    ) -> Result<(), RenderError> {
        let tile = self.render_patch(patch, rng)?;
        buffer.blit(&tile)?;
        Ok(())
    }
}

pub fn gamma_correct(sample: Sample) -> Sample {
    Sample::new(sample.red.sqrt(), sample.green.sqrt(), sample.blue.sqrt())
}

/// `floor(255.99 * channel)`, saturating to the byte range.
pub fn quantize(channel: f32) -> u8 {
    (255.99 * channel) as u8
}

pub fn to_bgr(sample: Sample) -> Bgr {
    [
        quantize(sample.blue),
        quantize(sample.green),
        quantize(sample.red),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use patches::PartitionStrategy;
    use rand::SeedableRng;

    use super::*;

    struct Constant(Sample);

    impl SampleEvaluator for Constant {
        fn evaluate(&self, _u: f32, _v: f32, _rng: &mut SmallRng) -> Sample {
            self.0
        }
    }

    /// Records every coordinate it is asked for.
    #[derive(Default)]
    struct Recorder(Mutex<Vec<(f32, f32)>>);

    impl SampleEvaluator for Recorder {
        fn evaluate(&self, u: f32, v: f32, _rng: &mut SmallRng) -> Sample {
            self.0.lock().unwrap().push((u, v));
            Sample::BLACK
        }
    }

    fn job(width: u32, height: u32, samples_per_pixel: u32) -> RenderJob {
        RenderJob {
            frame_index: 0,
            width,
            height,
            samples_per_pixel,
            strategy: PartitionStrategy::Rows,
            sub_strategy: PartitionStrategy::Rows,
        }
    }

    #[test]
    fn quantize_floors_and_saturates() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 127);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(4.0), 255);
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn pixels_are_written_blue_green_red_after_gamma() {
        let job = job(1, 1, 3);
        let evaluator = Constant(Sample::new(1.0, 0.25, 0.0));
        let executor = WorkerExecutor::new(&job, &evaluator);
        let mut rng = SmallRng::seed_from_u64(1);

        assert_eq!(executor.shade_pixel(0, 0, &mut rng), [0, 127, 255]);
    }

    #[test]
    fn render_into_touches_only_the_patch() {
        let job = job(9, 7, 2);
        let evaluator = Constant(Sample::new(1.0, 1.0, 1.0));
        let executor = WorkerExecutor::new(&job, &evaluator);
        let patch = Patch::new(2, 3, 6, 5);
        let mut buffer = PixelBuffer::new(9, 7);

        executor
            .render_into(patch, &mut buffer, &mut SmallRng::seed_from_u64(5))
            .unwrap();

        for y in 0..7 {
            for x in 0..9 {
                let expected = if patch.contains(x, y) { [255; 3] } else { [0; 3] };
                assert_eq!(buffer.pixel(x, y), Some(expected), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn jittered_samples_stay_inside_their_pixel() {
        let job = job(8, 4, 16);
        let evaluator = Recorder::default();
        let executor = WorkerExecutor::new(&job, &evaluator);
        let mut rng = SmallRng::seed_from_u64(9);

        for (x, y) in job.region().pixels() {
            executor.shade_pixel(x, y, &mut rng);
            let drawn = std::mem::take(&mut *evaluator.0.lock().unwrap());
            assert_eq!(drawn.len(), 16);
            for (u, v) in drawn {
                let (column, row) = (u * 8.0, v * 4.0);
                assert!(column >= x as f32 && column <= x as f32 + 1.0, "u={u} pixel ({x}, {y})");
                assert!(row >= y as f32 && row <= y as f32 + 1.0, "v={v} pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn rejects_patches_outside_the_frame_and_zero_samples() {
        let evaluator = Constant(Sample::BLACK);
        let mut rng = SmallRng::seed_from_u64(0);

        let job_ok = job(4, 4, 1);
        let executor = WorkerExecutor::new(&job_ok, &evaluator);
        assert!(matches!(
            executor.render_patch(Patch::new(0, 0, 5, 4), &mut rng),
            Err(RenderError::PatchOutsideFrame { .. })
        ));

        let job_empty = job(4, 4, 0);
        let executor = WorkerExecutor::new(&job_empty, &evaluator);
        assert!(matches!(
            executor.render_patch(Patch::full(4, 4), &mut rng),
            Err(RenderError::NoSamples)
        ));
    }
}
