use crate::core::codec::{QgramCode, QgramCodec};
use crate::core::error::QgramError;
use crate::core::lock::ScopedMutex;
use crate::core::queue::WorkQueue;
use crate::core::shard::{self, Shard};
use crate::core::slots::ThreadSlotRegistry;
use crate::core::stats::{StatsReporter, fmt_dur};
use crate::core::table::CountTable;
use crate::core::topk::TopKSelector;
use anyhow::{Context, Result, anyhow};
use crossbeam_channel as channel;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_MIN_SHARD_WINDOWS: usize = 1 << 16;
pub const DEFAULT_TOP_K: usize = 50;

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub q: usize,
    pub alpha_size: usize,
    /// Worker threads; 0 counts on the calling thread without registry,
    /// queue or lock.
    pub threads: usize,
    pub top_k: usize,
    pub min_shard_windows: usize,
}

impl RunConfig {
    pub fn new(q: usize, alpha_size: usize) -> Self {
        Self {
            q,
            alpha_size,
            threads: 0,
            top_k: DEFAULT_TOP_K,
            min_shard_windows: DEFAULT_MIN_SHARD_WINDOWS,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_min_shard_windows(mut self, n: usize) -> Self {
        self.min_shard_windows = n;
        self
    }

    /// Checks the configuration and builds the codec for it.
    pub fn codec(&self) -> Result<QgramCodec, QgramError> {
        if self.min_shard_windows == 0 {
            return Err(QgramError::InvalidConfig(
                "min_shard_windows must be >= 1".to_string(),
            ));
        }
        QgramCodec::new(self.alpha_size, self.q)
    }
}

/// Counts of one code handed to the significance function.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QgramCounts {
    pub code: QgramCode,
    pub count: u64,
    /// Windows counted in the primary corpus.
    pub total: u64,
    /// Count in the background corpus, when one was given.
    pub background: Option<u64>,
    pub background_total: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankedQgram<K> {
    pub code: QgramCode,
    pub qgram: Vec<u8>,
    pub count: u64,
    pub background: Option<u64>,
    pub key: K,
}

#[derive(Clone, Debug)]
pub struct CountSummary {
    pub table: CountTable,
    pub windows: u64,
}

#[derive(Clone, Debug)]
pub struct RunOutput<K> {
    pub ranked: Vec<RankedQgram<K>>,
    pub total_windows: u64,
    pub distinct_qgrams: usize,
    pub background_windows: Option<u64>,
}

#[derive(Clone, Debug, Default)]
struct WorkerStats {
    shards: u64,
    windows: u64,
    busy: Duration,
}

struct WorkerReport {
    outcome: Result<CountTable, QgramError>,
    stats: WorkerStats,
}

/// Merges worker reports into the global table. The lock is absent in
/// serial mode.
struct Aggregator<'a> {
    codec: &'a QgramCodec,
    // windows expected over all reports; picks the global table kind
    expected: u64,
    global: Option<CountTable>,
    windows: u64,
    error: Option<QgramError>,
    lock: Option<&'a Mutex<()>>,
}

impl<'a> Aggregator<'a> {
    fn new(codec: &'a QgramCodec, expected: u64, lock: Option<&'a Mutex<()>>) -> Self {
        Self {
            codec,
            expected,
            global: None,
            windows: 0,
            error: None,
            lock,
        }
    }

    fn absorb(&mut self, report: WorkerReport) {
        let _lock = ScopedMutex::acquire(self.lock);
        match report.outcome {
            Ok(table) => {
                if self.error.is_none() {
                    self.merge(table);
                    self.windows += report.stats.windows;
                }
            }
            Err(e) => {
                self.error = Some(match self.error.take() {
                    Some(prev) => earliest_error(prev, e),
                    None => e,
                });
            }
        }
    }

    // The first partial table is adopted as the global one unless the
    // global table should be dense and the partial is not.
    fn merge(&mut self, table: CountTable) {
        match self.global.as_mut() {
            Some(global) => global.merge(table),
            None if table.is_dense() || !CountTable::prefers_dense(self.codec, self.expected) => {
                self.global = Some(table);
            }
            None => {
                let mut global = CountTable::sized_for(self.codec, self.expected);
                global.merge(table);
                self.global = Some(global);
            }
        }
    }

    fn finish(self) -> Result<CountSummary, QgramError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(CountSummary {
                table: self
                    .global
                    .unwrap_or_else(|| CountTable::sized_for(self.codec, 0)),
                windows: self.windows,
            }),
        }
    }
}

// Several shards may hit the same bad input; report the first position so
// the message does not depend on scheduling.
fn earliest_error(a: QgramError, b: QgramError) -> QgramError {
    let prefer_b = match (&a, &b) {
        (
            QgramError::InvalidSequence {
                sequence: sa,
                position: pa,
                ..
            },
            QgramError::InvalidSequence {
                sequence: sb,
                position: pb,
                ..
            },
        ) => (sb, pb) < (sa, pa),
        (QgramError::InvalidSequence { .. }, _) => true,
        _ => false,
    };
    if prefer_b { b } else { a }
}

fn count_shard(
    codec: &QgramCodec,
    seq: &[u8],
    shard: &Shard,
    table: &mut CountTable,
) -> Result<u64, QgramError> {
    let window = shard.symbols(seq, codec.q());
    let iter = codec.enumerate(window).map_err(|e| match e {
        QgramError::InvalidSymbol { symbol, position } => QgramError::InvalidSequence {
            sequence: shard.sequence,
            position: shard.start + position,
            symbol,
        },
        other => other,
    })?;
    let n = iter.len() as u64;
    for w in iter {
        table.add(w.code, 1);
    }
    Ok(n)
}

/// Counts every q-gram of `sequences` into one table.
pub fn count<S>(cfg: &RunConfig, sequences: &[S]) -> Result<CountSummary>
where
    S: AsRef<[u8]> + Sync,
{
    let codec = cfg.codec().context("invalid run configuration")?;
    let stats = StatsReporter::from_env(cfg.threads > 0);
    let lock = (cfg.threads > 0).then(|| Mutex::new(()));
    count_with(&codec, cfg, sequences, lock.as_ref(), &stats)
}

fn count_with<S>(
    codec: &QgramCodec,
    cfg: &RunConfig,
    sequences: &[S],
    lock: Option<&Mutex<()>>,
    stats: &StatsReporter,
) -> Result<CountSummary>
where
    S: AsRef<[u8]> + Sync,
{
    let t_count = Instant::now();
    let lens: Vec<usize> = sequences.iter().map(|s| s.as_ref().len()).collect();
    let total = shard::total_windows(&lens, codec.q());

    let summary = match lock {
        Some(lock) if cfg.threads > 0 => {
            let target = shard::shard_target(total, cfg.threads, cfg.min_shard_windows);
            let shards = shard::plan_shards(&lens, codec.q(), target);
            stats.line(&format!(
                "engine.shards={} engine.shard_windows={} engine.largest_shard={} engine.windows={}",
                shards.len(),
                target,
                shards.iter().map(Shard::windows).max().unwrap_or(0),
                total
            ));
            count_parallel(codec, cfg.threads, sequences, shards, total, lock, stats)?
        }
        _ => count_serial(codec, sequences, &lens, total)?,
    };
    if stats.enabled() {
        stats.block(&[
            format!(
                "table.kind={} table.distinct={} table.counted={}",
                if summary.table.is_dense() { "dense" } else { "sparse" },
                summary.table.distinct(),
                summary.table.total()
            ),
            format!("stage=engine.count time={}", fmt_dur(t_count.elapsed())),
        ]);
    }
    Ok(summary)
}

fn count_serial<S>(
    codec: &QgramCodec,
    sequences: &[S],
    lens: &[usize],
    total: u64,
) -> Result<CountSummary>
where
    S: AsRef<[u8]>,
{
    let mut table = CountTable::sized_for(codec, total);
    let mut ws = WorkerStats::default();
    let mut outcome = Ok(());
    let t0 = Instant::now();
    for s in shard::plan_shards(lens, codec.q(), usize::MAX) {
        match count_shard(codec, sequences[s.sequence].as_ref(), &s, &mut table) {
            Ok(n) => {
                ws.windows += n;
                ws.shards += 1;
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    ws.busy = t0.elapsed();

    let mut agg = Aggregator::new(codec, total, None);
    agg.absorb(WorkerReport {
        outcome: outcome.map(|()| table),
        stats: ws,
    });
    Ok(agg.finish()?)
}

fn count_parallel<S>(
    codec: &QgramCodec,
    threads: usize,
    sequences: &[S],
    shards: Vec<Shard>,
    total: u64,
    merge_lock: &Mutex<()>,
    stats: &StatsReporter,
) -> Result<CountSummary>
where
    S: AsRef<[u8]> + Sync,
{
    let registry = ThreadSlotRegistry::new(threads);
    let queue: WorkQueue<WorkerReport> = WorkQueue::new();
    let failed = AtomicBool::new(false);

    let (shard_tx, shard_rx) = channel::unbounded::<Shard>();
    for s in shards {
        shard_tx
            .send(s)
            .map_err(|_| anyhow!("shard channel closed before workers started"))?;
    }
    drop(shard_tx);

    let mut agg = Aggregator::new(codec, total, Some(merge_lock));
    // each worker counts about its share of the windows
    let share = total.div_ceil(threads as u64);
    let mut wait_time = Duration::ZERO;
    let mut merge_time = Duration::ZERO;

    thread::scope(|scope| {
        for _ in 0..threads {
            let rx = shard_rx.clone();
            let registry = &registry;
            let queue = &queue;
            let failed = &failed;
            scope.spawn(move || {
                let report = run_worker(codec, sequences, &rx, share, registry, failed, stats);
                queue.enqueue(report);
            });
        }
        drop(shard_rx);

        for _ in 0..threads {
            let t_wait = Instant::now();
            let report = queue.dequeue();
            wait_time += t_wait.elapsed();
            let t_merge = Instant::now();
            agg.absorb(report);
            merge_time += t_merge.elapsed();
        }
    });

    stats.line(&format!(
        "reducer.wait={} reducer.merge={}",
        fmt_dur(wait_time),
        fmt_dur(merge_time)
    ));

    Ok(agg.finish()?)
}

fn run_worker<S>(
    codec: &QgramCodec,
    sequences: &[S],
    rx: &channel::Receiver<Shard>,
    share: u64,
    registry: &ThreadSlotRegistry,
    failed: &AtomicBool,
    stats: &StatsReporter,
) -> WorkerReport
where
    S: AsRef<[u8]>,
{
    let mut ws = WorkerStats::default();
    let slot = match registry.get() {
        Ok(slot) => slot,
        Err(e) => {
            failed.store(true, AtomicOrdering::Relaxed);
            return WorkerReport {
                outcome: Err(e),
                stats: ws,
            };
        }
    };
    let t0 = Instant::now();
    let mut table = CountTable::sized_for(codec, share);
    let mut outcome = Ok(());
    // A received shard is always counted, so shards handed out before a
    // failure still report their own errors.
    while !failed.load(AtomicOrdering::Relaxed) {
        let Ok(s) = rx.recv() else {
            break;
        };
        match count_shard(codec, sequences[s.sequence].as_ref(), &s, &mut table) {
            Ok(n) => {
                ws.windows += n;
                ws.shards += 1;
            }
            Err(e) => {
                failed.store(true, AtomicOrdering::Relaxed);
                outcome = Err(e);
                break;
            }
        }
    }
    ws.busy = t0.elapsed();
    stats.line(&format!(
        "worker.slot={} shards={} windows={} busy={} table={}",
        slot,
        ws.shards,
        ws.windows,
        fmt_dur(ws.busy),
        if table.is_dense() { "dense" } else { "sparse" }
    ));
    WorkerReport {
        outcome: outcome.map(|()| table),
        stats: ws,
    }
}

type Scored<K> = (QgramCounts, K);

fn by_key<K: PartialOrd>(a: &Scored<K>, b: &Scored<K>) -> Ordering {
    a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal)
}

fn rank<K, F>(
    codec: &QgramCodec,
    primary: &CountSummary,
    background: Option<&CountSummary>,
    top_k: usize,
    key_fn: F,
) -> Result<Vec<RankedQgram<K>>, QgramError>
where
    K: PartialOrd,
    F: Fn(&QgramCounts) -> Option<K>,
{
    let mut top = TopKSelector::new(top_k, by_key::<K>);
    let background_total = background.map(|b| b.windows);
    let mut offer = |code: QgramCode, count: u64, background: Option<u64>| {
        let counts = QgramCounts {
            code,
            count,
            total: primary.windows,
            background,
            background_total,
        };
        if let Some(key) = key_fn(&counts) {
            top.add((counts, key));
        }
    };
    for (code, count) in primary.table.sorted_entries() {
        offer(code, count, background.map(|b| b.table.get(code)));
    }
    if let Some(bg) = background {
        for (code, c) in bg.table.sorted_entries() {
            if primary.table.get(code) == 0 {
                offer(code, 0, Some(c));
            }
        }
    }
    top.into_vec()
        .into_iter()
        .map(|(counts, key)| {
            Ok(RankedQgram {
                code: counts.code,
                qgram: codec.decode(counts.code)?,
                count: counts.count,
                background: counts.background,
                key,
            })
        })
        .collect()
}

/// Counts `sequences` (and `background`, if given), scores every code seen
/// in either corpus with `key_fn`, and returns the `top_k` highest keys in
/// descending order. Codes for which `key_fn` returns `None` are skipped.
pub fn run<S, K, F>(
    cfg: &RunConfig,
    sequences: &[S],
    background: Option<&[S]>,
    key_fn: F,
) -> Result<RunOutput<K>>
where
    S: AsRef<[u8]> + Sync,
    K: PartialOrd,
    F: Fn(&QgramCounts) -> Option<K>,
{
    let t_total = Instant::now();
    let codec = cfg.codec().context("invalid run configuration")?;
    let stats = StatsReporter::from_env(cfg.threads > 0);
    // guards the global tables and the ranking buffer in threaded mode
    let shared_lock = (cfg.threads > 0).then(|| Mutex::new(()));

    let primary = count_with(&codec, cfg, sequences, shared_lock.as_ref(), &stats)
        .context("failed to count input sequences")?;
    let background = match background {
        Some(bg) => Some(
            count_with(&codec, cfg, bg, shared_lock.as_ref(), &stats)
                .context("failed to count background sequences")?,
        ),
        None => None,
    };

    let t_rank = Instant::now();
    let ranked = {
        let _lock = ScopedMutex::acquire(shared_lock.as_ref());
        rank(&codec, &primary, background.as_ref(), cfg.top_k, key_fn)?
    };
    stats.stage("engine.rank", t_rank);
    stats.stage("engine.total", t_total);

    Ok(RunOutput {
        ranked,
        total_windows: primary.windows,
        distinct_qgrams: primary.table.distinct(),
        background_windows: background.map(|b| b.windows),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_error_prefers_first_position() {
        let a = QgramError::InvalidSequence {
            sequence: 1,
            position: 40,
            symbol: 9,
        };
        let b = QgramError::InvalidSequence {
            sequence: 1,
            position: 3,
            symbol: 7,
        };
        assert_eq!(earliest_error(a.clone(), b.clone()), b);
        assert_eq!(earliest_error(b.clone(), a), b);
        let slots = QgramError::SlotsExhausted { capacity: 2 };
        assert_eq!(earliest_error(b, slots.clone()), slots);
    }

    #[test]
    fn test_aggregator_serial_merges_without_lock() {
        let codec = QgramCodec::new(4, 1).unwrap();
        let mut agg = Aggregator::new(&codec, 0, None);
        for code in [0u64, 3] {
            let mut t = CountTable::sized_for(&codec, 0);
            t.add(code, 2);
            agg.absorb(WorkerReport {
                outcome: Ok(t),
                stats: WorkerStats {
                    windows: 2,
                    ..Default::default()
                },
            });
        }
        let summary = agg.finish().unwrap();
        assert_eq!(summary.table.sorted_entries(), vec![(0, 2), (3, 2)]);
        assert_eq!(summary.windows, 4);
    }

    #[test]
    fn test_aggregator_error_wins() {
        let codec = QgramCodec::new(4, 1).unwrap();
        let lock = Mutex::new(());
        let mut agg = Aggregator::new(&codec, 0, Some(&lock));
        agg.absorb(WorkerReport {
            outcome: Err(QgramError::SlotsExhausted { capacity: 1 }),
            stats: WorkerStats::default(),
        });
        agg.absorb(WorkerReport {
            outcome: Ok(CountTable::sized_for(&codec, 0)),
            stats: WorkerStats::default(),
        });
        assert!(agg.finish().is_err());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_aggregator_adopts_or_densifies_first_table() {
        let codec = QgramCodec::new(4, 11).unwrap();
        let report = |code: u64| {
            let mut t = CountTable::sparse();
            t.add(code, 1);
            WorkerReport {
                outcome: Ok(t),
                stats: WorkerStats {
                    windows: 1,
                    ..Default::default()
                },
            }
        };

        let mut small = Aggregator::new(&codec, 2, None);
        small.absorb(report(5));
        small.absorb(report(5));
        let summary = small.finish().unwrap();
        assert!(!summary.table.is_dense());
        assert_eq!(summary.table.sorted_entries(), vec![(5, 2)]);

        let mut large = Aggregator::new(&codec, 1 << 22, None);
        large.absorb(report(7));
        let summary = large.finish().unwrap();
        assert!(summary.table.is_dense());
        assert_eq!(summary.table.get(7), 1);
    }

    #[test]
    fn test_worker_table_follows_its_share() {
        // 4^11 codes; a worker expecting ten windows must not allocate them all
        let codec = QgramCodec::new(4, 11).unwrap();
        let seqs = vec![vec![1u8; 20]];
        let (tx, rx) = channel::unbounded();
        tx.send(Shard {
            sequence: 0,
            start: 0,
            end: 10,
        })
        .unwrap();
        drop(tx);
        let registry = ThreadSlotRegistry::new(1);
        let failed = AtomicBool::new(false);
        let stats = StatsReporter::new(false, true);
        let report = run_worker(&codec, &seqs, &rx, 10, &registry, &failed, &stats);
        let table = report.outcome.unwrap();
        assert!(!table.is_dense());
        assert_eq!(table.sorted_entries().len(), 1);
        assert_eq!(report.stats.windows, 10);
    }

    #[test]
    fn test_parallel_summary_stays_sparse_for_small_input() {
        let cfg = RunConfig::new(11, 4)
            .with_threads(8)
            .with_min_shard_windows(1);
        let summary = count(&cfg, &[vec![1u8; 20]]).unwrap();
        assert!(!summary.table.is_dense());
        assert_eq!(summary.table.sorted_entries(), vec![(0x155555, 10)]);
    }

    #[test]
    fn test_rank_includes_background_only_codes() {
        let codec = QgramCodec::new(4, 1).unwrap();
        let mut fg = CountTable::sized_for(&codec, 0);
        fg.add(0, 5);
        let mut bg = CountTable::sized_for(&codec, 0);
        bg.add(0, 1);
        bg.add(2, 9);
        let fg = CountSummary {
            table: fg,
            windows: 5,
        };
        let bg = CountSummary {
            table: bg,
            windows: 10,
        };
        let ranked = rank(&codec, &fg, Some(&bg), 10, |c| {
            assert_eq!((c.total, c.background_total), (5, Some(10)));
            Some(c.background.unwrap_or(0) as i64 - c.count as i64)
        })
        .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].code, 2);
        assert_eq!(ranked[0].count, 0);
        assert_eq!(ranked[0].key, 9);
        assert_eq!(ranked[1].qgram, vec![0]);
        assert_eq!(ranked[1].key, -4);
    }
}
