//! Account guard: failed-login counting and time-boxed lockout.
//!
//! State machine per user: UNLOCKED → (N consecutive failures) →
//! LOCKED(until) → UNLOCKED on successful login or lockout expiry. The row
//! updates driven by these decisions run inside the login transaction.

use chrono::{DateTime, Duration, Utc};

/// Lockout policy: how many consecutive failures trip the lock, and for
/// how long.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(30),
        }
    }
}

impl LockoutPolicy {
    /// Returns the unlock time if the account is currently locked.
    ///
    /// Called before any password check: a locked account must not leak
    /// whether the supplied password was right.
    pub fn locked_until(
        &self,
        locked_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        locked_until.filter(|until| *until > now)
    }

    /// Apply one failed password check: returns the new counter value and,
    /// once the counter reaches the configured maximum, the lockout deadline.
    pub fn register_failure(
        &self,
        failed_attempts: i32,
        now: DateTime<Utc>,
    ) -> (i32, Option<DateTime<Utc>>) {
        let attempts = failed_attempts + 1;
        if attempts >= self.max_failed_attempts {
            (attempts, Some(now + self.lockout_duration))
        } else {
            (attempts, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlocked_account_reports_no_lock() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.locked_until(None, now), None);
    }

    #[test]
    fn expired_lock_reports_unlocked() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let past = now - Duration::minutes(1);
        assert_eq!(policy.locked_until(Some(past), now), None);
    }

    #[test]
    fn active_lock_reports_unlock_time() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let until = now + Duration::minutes(10);
        assert_eq!(policy.locked_until(Some(until), now), Some(until));
    }

    #[test]
    fn lock_trips_at_exactly_max_attempts() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        // Failures 1 through 4 only increment.
        for prior in 0..policy.max_failed_attempts - 1 {
            let (attempts, lock) = policy.register_failure(prior, now);
            assert_eq!(attempts, prior + 1);
            assert!(lock.is_none(), "locked too early at attempt {attempts}");
        }

        // The fifth consecutive failure locks.
        let (attempts, lock) = policy.register_failure(policy.max_failed_attempts - 1, now);
        assert_eq!(attempts, policy.max_failed_attempts);
        assert_eq!(lock, Some(now + policy.lockout_duration));
    }
}
