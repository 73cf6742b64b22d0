use chrono::{DateTime, Utc};

/// Trait for providing the current UTC time.
pub trait Now: Clone + Send + Sync + 'static {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Implementation that returns the actual current system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNow;

impl Now for SystemNow {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use std::sync::{Arc, Mutex};

    use chrono::TimeDelta;

    use super::*;

    /// Mock time provider for testing.
    ///
    /// Clones share the same clock, so advancing one clone advances
    /// every component holding it.
    #[derive(Debug, Clone)]
    pub struct MockNow {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl MockNow {
        /// Creates a new mock with the specified time.
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Creates a new mock with a default test time (2020-01-01 00:00:00 UTC).
        pub fn default_time() -> Self {
            Self::new(DateTime::from_timestamp(1577836800, 0).unwrap())
        }

        /// Moves the clock forward by `delta`.
        pub fn advance(&self, delta: TimeDelta) {
            let mut time = self.time.lock().unwrap();
            *time += delta;
        }
    }

    impl Now for MockNow {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }
}
