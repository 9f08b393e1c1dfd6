use crate::core::lock::ScopedMutex;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub const STATS_ENV: &str = "QGRAM_STATS";

pub fn stats_enabled() -> bool {
    matches!(std::env::var(STATS_ENV).as_deref(), Ok("1"))
}

/// Env-gated `QGRAM_STATS key=value` lines on stderr.
///
/// Workers and the aggregator share one reporter; each worker writes its own
/// `worker.slot=` line. `line` and `block` hold the output lock when the
/// reporter was built for threaded use, so lines never interleave.
pub struct StatsReporter {
    enabled: bool,
    out_lock: Option<Mutex<()>>,
}

impl StatsReporter {
    pub fn new(enabled: bool, threaded: bool) -> Self {
        Self {
            enabled,
            out_lock: threaded.then(|| Mutex::new(())),
        }
    }

    pub fn from_env(threaded: bool) -> Self {
        Self::new(stats_enabled(), threaded)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn line(&self, msg: &str) {
        if self.enabled {
            let _lock = ScopedMutex::acquire(self.out_lock.as_ref());
            eprintln!("QGRAM_STATS {}", msg);
        }
    }

    pub fn block(&self, lines: &[String]) {
        if self.enabled {
            let _lock = ScopedMutex::acquire(self.out_lock.as_ref());
            for l in lines {
                eprintln!("QGRAM_STATS {}", l);
            }
        }
    }

    pub fn stage(&self, name: &str, t: Instant) {
        if self.enabled {
            self.line(&format!("stage={} time={}", name, fmt_dur(t.elapsed())));
        }
    }
}

pub fn fmt_dur(d: Duration) -> String {
    if d.as_secs_f64() < 1.0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_dur() {
        assert_eq!(fmt_dur(Duration::from_millis(250)), "250ms");
        assert_eq!(fmt_dur(Duration::from_millis(1500)), "1.500s");
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let r = StatsReporter::new(false, true);
        assert!(!r.enabled());
        r.line("never printed");
        r.block(&["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_threaded_reporter_is_shared_by_workers() {
        let r = StatsReporter::new(true, true);
        assert!(r.out_lock.is_some());
        std::thread::scope(|scope| {
            for slot in 0..4 {
                let r = &r;
                scope.spawn(move || {
                    r.block(&[format!("worker.slot={} test=1", slot), "test=2".to_string()]);
                });
            }
        });
        assert!(r.out_lock.as_ref().is_some_and(|m| m.try_lock().is_some()));
        assert!(StatsReporter::new(true, false).out_lock.is_none());
    }
}
