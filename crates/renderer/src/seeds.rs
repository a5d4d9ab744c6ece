use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Random streams of one execution unit, one per local thread.
///
/// Streams depend only on the run seed and the `(frame, unit, thread)`
/// position, so a run is reproducible for a fixed decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedStream {
    run_seed: u64,
    frame_index: usize,
    unit_id: usize,
}

impl SeedStream {
    pub fn new(run_seed: u64, frame_index: usize, unit_id: usize) -> Self {
        Self {
            run_seed,
            frame_index,
            unit_id,
        }
    }

    pub fn seed_for(&self, thread_id: usize) -> u64 {
        let mut state = splitmix64(self.run_seed);
        for part in [self.frame_index, self.unit_id, thread_id] {
            state = splitmix64(state ^ part as u64);
        }
        state
    }

    pub fn rng(&self, thread_id: usize) -> SmallRng {
        SmallRng::seed_from_u64(self.seed_for(thread_id))
    }
}

fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_are_stable_and_distinct() {
        let stream = SeedStream::new(42, 1, 3);
        assert_eq!(stream.seed_for(0), SeedStream::new(42, 1, 3).seed_for(0));
        assert_ne!(stream.seed_for(0), stream.seed_for(1));
        assert_ne!(stream.seed_for(0), SeedStream::new(42, 1, 4).seed_for(0));
        assert_ne!(stream.seed_for(0), SeedStream::new(42, 2, 3).seed_for(0));
        assert_ne!(stream.seed_for(0), SeedStream::new(43, 1, 3).seed_for(0));
    }
}
