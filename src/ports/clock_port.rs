//! Clock port trait.

use chrono::{DateTime, Utc};
use std::time::Duration;

pub trait ClockPort {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}
