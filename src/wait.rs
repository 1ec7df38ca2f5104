//! Blocking Wait Helper
//!
//! Condition-variable retry loop shared by every blocking operation:
//! check the condition, give up on non-blocking, cancellation or an expired
//! deadline, otherwise sleep and check again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{SockError, SockResult};

/// When a blocking call gives up
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Deadline {
    NonBlocking,
    Never,
    At(Instant),
}

impl Deadline {
    pub fn from_timeout(nonblocking: bool, timeout: Option<Duration>) -> Self {
        if nonblocking {
            return Deadline::NonBlocking;
        }
        match timeout {
            Some(t) if t.is_zero() => Deadline::NonBlocking,
            Some(t) => Deadline::after(t),
            None => Deadline::Never,
        }
    }

    /// `t` from now; a wait too long to represent never expires
    pub fn after(t: Duration) -> Self {
        match Instant::now().checked_add(t) {
            Some(at) => Deadline::At(at),
            None => Deadline::Never,
        }
    }

    #[inline]
    pub fn is_nonblocking(&self) -> bool {
        matches!(self, Deadline::NonBlocking)
    }

    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::At(t) => Some(*t),
            _ => None,
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        match self {
            Deadline::NonBlocking => true,
            Deadline::Never => false,
            Deadline::At(t) => now >= *t,
        }
    }
}

/// Something that can release its lock and sleep until woken or `until`
pub trait Sleeper {
    fn sleep(&mut self, until: Option<Instant>);
}

/// Wait until `cond` holds
///
/// `cond` runs with the lock held; returning an error ends the wait with
/// that error. Wakeups may be spurious, the condition is always rechecked.
pub fn wait_for_cond<C, F>(ctx: &mut C, deadline: &Deadline, cancel: &AtomicBool, mut cond: F) -> SockResult<()>
where
    C: Sleeper,
    F: FnMut(&mut C) -> SockResult<bool>,
{
    loop {
        if cond(ctx)? {
            return Ok(());
        }
        if deadline.is_nonblocking() {
            return Err(SockError::WouldBlock);
        }
        if cancel.swap(false, Ordering::AcqRel) {
            return Err(SockError::Interrupted);
        }
        if deadline.expired(Instant::now()) {
            return Err(SockError::TimedOut);
        }
        ctx.sleep(deadline.instant());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        sleeps: u32,
        ready_after: u32,
    }

    impl Sleeper for Counter {
        fn sleep(&mut self, _until: Option<Instant>) {
            self.sleeps += 1;
        }
    }

    fn ready(c: &mut Counter) -> SockResult<bool> {
        Ok(c.sleeps >= c.ready_after)
    }

    #[test]
    fn rechecks_after_each_wakeup() {
        let mut c = Counter { sleeps: 0, ready_after: 3 };
        wait_for_cond(&mut c, &Deadline::Never, &AtomicBool::new(false), ready).unwrap();
        assert_eq!(c.sleeps, 3);
    }

    #[test]
    fn nonblocking_and_cancel_are_distinct() {
        let mut c = Counter { sleeps: 0, ready_after: 1 };
        let cancel = AtomicBool::new(false);
        assert_eq!(
            wait_for_cond(&mut c, &Deadline::NonBlocking, &cancel, ready),
            Err(SockError::WouldBlock)
        );
        cancel.store(true, Ordering::Release);
        assert_eq!(wait_for_cond(&mut c, &Deadline::Never, &cancel, ready), Err(SockError::Interrupted));
        assert!(!cancel.load(Ordering::Acquire));
    }

    #[test]
    fn expired_deadline_times_out() {
        let mut c = Counter { sleeps: 0, ready_after: 1 };
        let past = Deadline::At(Instant::now() - Duration::from_millis(1));
        assert_eq!(
            wait_for_cond(&mut c, &past, &AtomicBool::new(false), ready),
            Err(SockError::TimedOut)
        );
        assert_eq!(c.sleeps, 0);
    }

    #[test]
    fn unrepresentable_timeout_never_expires() {
        assert_eq!(Deadline::from_timeout(false, Some(Duration::MAX)), Deadline::Never);
        assert_eq!(Deadline::from_timeout(false, Some(Duration::ZERO)), Deadline::NonBlocking);
        assert!(!Deadline::after(Duration::MAX).expired(Instant::now()));
    }

    #[test]
    fn condition_errors_win() {
        let mut c = Counter { sleeps: 0, ready_after: 1 };
        let res = wait_for_cond(&mut c, &Deadline::Never, &AtomicBool::new(false), |_| Err(SockError::BrokenPipe));
        assert_eq!(res, Err(SockError::BrokenPipe));
    }
}
