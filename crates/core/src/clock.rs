use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { instant: Arc::new(Mutex::new(start)) }
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut instant = match self.instant.lock() {
            Ok(instant) => instant,
            Err(poisoned) => poisoned.into_inner(),
        };
        *instant += by;
        *instant
    }

    pub fn set(&self, to: DateTime<Utc>) {
        match self.instant.lock() {
            Ok(mut instant) => *instant = to,
            Err(poisoned) => *poisoned.into_inner() = to,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.lock() {
            Ok(instant) => *instant,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
