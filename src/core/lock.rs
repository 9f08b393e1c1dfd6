use parking_lot::{Mutex, MutexGuard};

/// Guard over a mutex that may not exist.
///
/// With `Some(mutex)` the mutex is held until the guard drops; with `None`
/// acquisition is a no-op. Lets the same aggregation code run in serial mode
/// (no lock allocated) and in threaded mode.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedMutex<'a> {
    guard: Option<MutexGuard<'a, ()>>,
}

impl<'a> ScopedMutex<'a> {
    pub fn acquire(mutex: Option<&'a Mutex<()>>) -> Self {
        Self {
            guard: mutex.map(|m| m.lock()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_mutex_is_noop() {
        let g = ScopedMutex::acquire(None);
        assert!(!g.is_locked());
    }

    #[test]
    fn test_present_mutex_held_until_drop() {
        let m = Mutex::new(());
        {
            let g = ScopedMutex::acquire(Some(&m));
            assert!(g.is_locked());
            assert!(m.try_lock().is_none());
        }
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn test_released_on_early_return() {
        fn guarded(m: &Mutex<()>, fail: bool) -> Result<(), ()> {
            let _g = ScopedMutex::acquire(Some(m));
            if fail {
                return Err(());
            }
            Ok(())
        }
        let m = Mutex::new(());
        assert!(guarded(&m, true).is_err());
        assert!(m.try_lock().is_some());
        assert!(guarded(&m, false).is_ok());
        assert!(m.try_lock().is_some());
    }
}
