//! Worker-pool sizing and time blocking.

use std::ops::Range;

/// Inputs for sizing the worker pool of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingInput {
    pub tlen: usize,
    pub time_chunksize: usize,
    /// Length of the vertical axis, 0 for 2-D fields.
    pub vertlen: usize,
}

/// Pluggable worker-count policy.
pub trait WorkerSizing: Send + Sync {
    fn workers(&self, input: &SizingInput) -> usize;
}

/// Twelve workers, doubled for 20+ levels and again for 60+, kept even.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSizing;

impl WorkerSizing for DefaultSizing {
    fn workers(&self, input: &SizingInput) -> usize {
        let mut workers = 12usize;
        if input.vertlen >= 20 {
            workers *= 2;
        }
        if input.vertlen >= 60 {
            workers *= 2;
        }
        2 * ((workers as f64 / 2.0).round() as usize)
    }
}

/// Fixed worker count.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizing(pub usize);

impl WorkerSizing for FixedSizing {
    fn workers(&self, _input: &SizingInput) -> usize {
        self.0.max(1)
    }
}

/// Time levels read per chunk: ten years of months for surface fields,
/// six for fields with a vertical axis.
pub fn time_chunksize(rank: usize) -> usize {
    if rank < 4 {
        10 * 12
    } else {
        6
    }
}

/// Vertical extent of a field: its second dimension when rank exceeds 3.
pub fn vertlen(shape: &[usize]) -> usize {
    if shape.len() > 3 {
        shape[1]
    } else {
        0
    }
}

/// Time-axis blocks evaluated one after another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBlocks {
    pub tlen: usize,
    pub time_step: usize,
}

impl TimeBlocks {
    /// Block length balanced so that blocks are near `2 * workers * chunk`.
    pub fn new(tlen: usize, workers: usize, time_chunksize: usize) -> Self {
        let nominal = (2 * workers * time_chunksize).min(tlen).max(1);
        let nblocks = (tlen / nominal).max(1);
        let time_step = tlen.div_ceil(nblocks).max(1);
        Self { tlen, time_step }
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.tlen)
            .step_by(self.time_step)
            .map(move |start| start..(start + self.time_step).min(self.tlen))
    }

    pub fn len(&self) -> usize {
        self.tlen.div_ceil(self.time_step)
    }

    pub fn is_empty(&self) -> bool {
        self.tlen == 0
    }
}
