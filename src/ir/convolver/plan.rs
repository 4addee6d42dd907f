use log::debug;

use crate::error::{Error, Result};

/// One run of equally sized partitions inside a [`PartitionPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Samples per partition (a power of two).
    pub partition_size: usize,
    /// Number of consecutive partitions in this segment.
    pub partition_count: usize,
    /// Real FFT length, `2 * partition_size`.
    pub transform_size: usize,
    /// Complex bins per spectral block, `partition_size + 1`.
    pub coefficient_size: usize,
    /// Time-domain samples the input ring must retain.
    pub input_ring_size: usize,
    /// First IR tap covered by this segment.
    pub time_offset: usize,
}

impl SegmentDescriptor {
    fn new(time_offset: usize, partition_size: usize, partition_count: usize, quantum: usize) -> Self {
        debug_assert!(time_offset + quantum >= partition_size);

        Self {
            partition_size,
            partition_count,
            transform_size: 2 * partition_size,
            coefficient_size: partition_size + 1,
            input_ring_size: time_offset + quantum,
            time_offset,
        }
    }

    /// Taps covered by this segment.
    pub const fn span(&self) -> usize {
        self.partition_size * self.partition_count
    }

    /// One past the last tap covered by this segment.
    pub const fn end(&self) -> usize {
        self.time_offset + self.span()
    }

    /// Samples between the newest input and the end of the window this
    /// segment transforms.
    pub const fn input_delay(&self) -> usize {
        self.input_ring_size - self.partition_size
    }
}

/// Non-uniform partitioning of an impulse response.
///
/// Blocks start at the quantum size and double per segment until they reach
/// the maximum partition size, which then repeats for the rest of the
/// response. Small blocks at the head keep latency at zero, large blocks at
/// the tail keep the per-sample cost down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    taps: usize,
    quantum: usize,
    max_partition: usize,
    segments: Vec<SegmentDescriptor>,
}

impl PartitionPlan {
    /// `min_partition` and `max_partition` are rounded down to powers of two;
    /// the rounded minimum is the streaming quantum.
    pub fn new(taps: usize, min_partition: usize, max_partition: usize) -> Result<Self> {
        if taps == 0 {
            return Err(Error::EmptyImpulseResponse);
        }

        let (quantum, max_partition) = partition_bounds(min_partition, max_partition)?;

        let mut segments = Vec::new();
        let mut part_size = quantum;
        let mut remaining = taps;
        let mut offset = 0;

        while remaining > 0 {
            let step = if part_size == max_partition {
                usize::MAX
            } else if segments.is_empty() {
                2
            } else {
                1
            };
            let count = step.min(remaining.div_ceil(part_size));

            segments.push(SegmentDescriptor::new(offset, part_size, count, quantum));

            let covered = count * part_size;
            offset += covered;
            remaining = remaining.saturating_sub(covered);
            part_size = (part_size * 2).min(max_partition);
        }

        debug!(
            "Planned {} taps into {} segments (quantum {}, max partition {}, span {})",
            taps,
            segments.len(),
            quantum,
            max_partition,
            offset
        );

        Ok(Self {
            taps,
            quantum,
            max_partition,
            segments,
        })
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    /// Taps in the response that was planned.
    pub const fn taps(&self) -> usize {
        self.taps
    }

    pub const fn quantum(&self) -> usize {
        self.quantum
    }

    pub const fn max_partition(&self) -> usize {
        self.max_partition
    }

    /// Total samples covered by all segments, including zero padding in the
    /// final partition.
    pub fn span(&self) -> usize {
        self.segments.last().map_or(0, SegmentDescriptor::end)
    }
}

/// Rounds both bounds down to powers of two and checks their order.
pub fn partition_bounds(min_partition: usize, max_partition: usize) -> Result<(usize, usize)> {
    let min = floor_power_of_two(min_partition);
    let max = floor_power_of_two(max_partition);

    if min == 0 || max < min {
        return Err(Error::InvalidPartitionSizes {
            min: min_partition,
            max: max_partition,
        });
    }

    Ok((min, max))
}

pub const fn floor_power_of_two(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}
