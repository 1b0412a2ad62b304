use std::fmt::Debug;
use std::sync::Mutex;

use crate::UtcDateTime;

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> UtcDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_hours(&self, hours: u32) {
        let mut now = self.now.lock().expect("clock lock should not be poisoned");
        *now = now.plus_hours(hours);
    }

    pub fn set(&self, value: UtcDateTime) {
        *self.now.lock().expect("clock lock should not be poisoned") = value;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().expect("clock lock should not be poisoned")
    }
}
