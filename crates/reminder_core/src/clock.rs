use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
pub(crate) use held::HeldClock;

#[cfg(test)]
mod held {
    use super::*;
    use parking_lot::{Condvar, Mutex};

    #[derive(Debug, Default)]
    struct HeldState {
        held: bool,
        entered: usize,
    }

    /// [`FixedClock`] whose readers park while it is held, so a test can act
    /// in the middle of a call that reads the time.
    #[derive(Debug)]
    pub(crate) struct HeldClock {
        inner: FixedClock,
        state: Mutex<HeldState>,
        changed: Condvar,
    }

    impl HeldClock {
        pub(crate) fn new(now: DateTime<Utc>) -> Self {
            Self {
                inner: FixedClock::new(now),
                state: Mutex::new(HeldState::default()),
                changed: Condvar::new(),
            }
        }

        pub(crate) fn hold(&self) {
            let mut state = self.state.lock();
            state.held = true;
            state.entered = 0;
        }

        pub(crate) fn release(&self) {
            self.state.lock().held = false;
            self.changed.notify_all();
        }

        /// Blocks until `readers` calls are parked in `now()`.
        pub(crate) fn wait_for_readers(&self, readers: usize) {
            let mut state = self.state.lock();
            while state.entered < readers {
                self.changed.wait(&mut state);
            }
        }
    }

    impl Clock for HeldClock {
        fn now(&self) -> DateTime<Utc> {
            let mut state = self.state.lock();
            if state.held {
                state.entered += 1;
                self.changed.notify_all();
                while state.held {
                    self.changed.wait(&mut state);
                }
            }
            drop(state);
            self.inner.now()
        }
    }
}
