//! Process-wide run lock with crash timeout.
//!
//! Only one orchestrator run may be active at a time. The lock records its
//! acquisition time; a holder that never releases (crashed task, aborted
//! runtime) is stolen once the hold exceeds the steal timeout, so a wedged
//! run cannot block reminders forever.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

const UNLOCKED: i64 = 0;

pub struct RunLock {
    /// Acquisition time in unix milliseconds, 0 when free.
    acquired_at_ms: AtomicI64,
}

impl RunLock {
    pub fn new() -> Self {
        Self {
            acquired_at_ms: AtomicI64::new(UNLOCKED),
        }
    }

    /// Try to take the lock. Fails if another run holds it and the hold is
    /// younger than `steal_after`.
    pub fn try_acquire(&self, now: DateTime<Utc>, steal_after: Duration) -> Option<RunLockGuard<'_>> {
        let now_ms = now.timestamp_millis().max(1);
        let current = self.acquired_at_ms.load(Ordering::Acquire);

        if current != UNLOCKED && now_ms - current < steal_after.num_milliseconds() {
            return None;
        }

        if current != UNLOCKED {
            tracing::warn!(
                held_for_ms = now_ms - current,
                "Stealing run lock from a run presumed crashed"
            );
        }

        match self.acquired_at_ms.compare_exchange(
            current,
            now_ms,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Some(RunLockGuard { lock: self }),
            Err(_) => None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.acquired_at_ms.load(Ordering::Acquire) != UNLOCKED
    }
}

impl Default for RunLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the lock on drop, including on panic.
pub struct RunLockGuard<'a> {
    lock: &'a RunLock,
}

impl Drop for RunLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.acquired_at_ms.store(UNLOCKED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 7, 0, 0).unwrap()
    }

    fn steal_after() -> Duration {
        Duration::minutes(8)
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let lock = RunLock::new();

        let guard = lock.try_acquire(now(), steal_after());
        assert!(guard.is_some());
        assert!(lock.try_acquire(now(), steal_after()).is_none());
    }

    #[test]
    fn test_released_on_drop() {
        let lock = RunLock::new();

        {
            let _guard = lock.try_acquire(now(), steal_after()).unwrap();
            assert!(lock.is_held());
        }

        assert!(!lock.is_held());
        assert!(lock.try_acquire(now(), steal_after()).is_some());
    }

    #[test]
    fn test_stale_lock_is_stolen() {
        let lock = RunLock::new();

        let guard = lock.try_acquire(now(), steal_after()).unwrap();
        std::mem::forget(guard); // simulate a crashed holder

        // Too young to steal
        assert!(lock
            .try_acquire(now() + Duration::minutes(5), steal_after())
            .is_none());

        // Old enough
        assert!(lock
            .try_acquire(now() + Duration::minutes(9), steal_after())
            .is_some());
    }
}
