//! Window-aligned sharding of a sequence collection.
//!
//! A shard owns the windows starting at `[start, end)` of one sequence and
//! reads the symbols `[start, end + q - 1)`, so neighbouring shards overlap by
//! `q - 1` symbols and every window is owned by exactly one shard.

// Shards handed out per worker, for load balancing across uneven sequences.
pub const SHARDS_PER_THREAD: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Shard {
    pub sequence: usize,
    pub start: usize,
    pub end: usize,
}

impl Shard {
    pub fn windows(&self) -> usize {
        self.end - self.start
    }

    /// Symbols covering this shard's windows.
    pub fn symbols<'a>(&self, seq: &'a [u8], q: usize) -> &'a [u8] {
        &seq[self.start..self.end + q - 1]
    }
}

pub fn windows_in(len: usize, q: usize) -> usize {
    (len + 1).saturating_sub(q)
}

pub fn total_windows(lens: &[usize], q: usize) -> u64 {
    lens.iter().map(|&l| windows_in(l, q) as u64).sum()
}

/// Windows per shard for `threads` workers, never below `min_windows`.
pub fn shard_target(total: u64, threads: usize, min_windows: usize) -> usize {
    let parts = (threads.max(1) * SHARDS_PER_THREAD) as u64;
    let even = total.div_ceil(parts);
    usize::try_from(even).unwrap_or(usize::MAX).max(min_windows).max(1)
}

/// Cuts every sequence into shards of at most `target` windows. Sequences
/// shorter than `q` get no shard.
pub fn plan_shards(lens: &[usize], q: usize, target: usize) -> Vec<Shard> {
    let target = target.max(1);
    let mut shards = Vec::new();
    for (sequence, &len) in lens.iter().enumerate() {
        let n = windows_in(len, q);
        let mut start = 0usize;
        while start < n {
            let end = start.saturating_add(target).min(n);
            shards.push(Shard {
                sequence,
                start,
                end,
            });
            start = end;
        }
    }
    shards
}
