use engine::{Communicator, Payload};
use log::debug;
use protocol::PixelBuffer;

use crate::AggregationError;

/// Sums buffers elementwise with byte wraparound.
///
/// Addition of `u8` modulo 256 is associative and commutative, so the result
/// does not depend on the order of `buffers`.
pub fn fold_buffers<I>(buffers: I) -> Result<PixelBuffer, AggregationError>
where
    I: IntoIterator<Item = PixelBuffer>,
{
    let mut buffers = buffers.into_iter();
    let mut merged = buffers.next().ok_or(AggregationError::NoBuffers)?;
    for buffer in buffers {
        merged.wrapping_accumulate(&buffer)?;
    }
    Ok(merged)
}

/// Moves every member's buffer to local rank 0 and merges them there.
///
/// Collective over `comm`. No member returns before all members have
/// contributed; the leader gets the merged buffer and everyone else `None`.
pub fn reduce_to_leader<M>(
    comm: &Communicator<'_, M>,
    local: PixelBuffer,
) -> Result<Option<PixelBuffer>, AggregationError>
where
    PixelBuffer: Payload<M>,
{
    let gathered = comm.gather(0, local)?;
    let merged = gathered.map(fold_buffers).transpose()?;
    comm.barrier()?;
    if merged.is_some() {
        debug!(
            "rank {} merged {} buffers",
            comm.global_rank(),
            comm.size()
        );
    }
    Ok(merged)
}
