//! US equity session windows in UTC.
//!
//! Pre-market 12:00-13:30, regular 13:30-20:00, post-market 20:00-22:30.
//! Each window includes its start and excludes its end. Weekends are closed.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPhase {
    PreMarket,
    Regular,
    PostMarket,
    Closed,
}

impl fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketPhase::PreMarket => "pre-market",
            MarketPhase::Regular => "regular",
            MarketPhase::PostMarket => "post-market",
            MarketPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketHours {
    pub pre_open: NaiveTime,
    pub regular_open: NaiveTime,
    pub regular_close: NaiveTime,
    pub post_close: NaiveTime,
}

impl Default for MarketHours {
    fn default() -> Self {
        MarketHours {
            pre_open: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN),
            regular_open: NaiveTime::from_hms_opt(13, 30, 0).unwrap_or(NaiveTime::MIN),
            regular_close: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            post_close: NaiveTime::from_hms_opt(22, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl MarketHours {
    pub fn phase(&self, at: DateTime<Utc>) -> MarketPhase {
        if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketPhase::Closed;
        }
        let time = at.time();
        if time >= self.pre_open && time < self.regular_open {
            MarketPhase::PreMarket
        } else if time >= self.regular_open && time < self.regular_close {
            MarketPhase::Regular
        } else if time >= self.regular_close && time < self.post_close {
            MarketPhase::PostMarket
        } else {
            MarketPhase::Closed
        }
    }

    pub fn pre_market_open(&self, at: DateTime<Utc>) -> bool {
        self.phase(at) == MarketPhase::PreMarket
    }

    pub fn regular_market_open(&self, at: DateTime<Utc>) -> bool {
        self.phase(at) == MarketPhase::Regular
    }

    pub fn post_market_open(&self, at: DateTime<Utc>) -> bool {
        self.phase(at) == MarketPhase::PostMarket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2024-05-15 is a Wednesday.
    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn phases_across_the_day() {
        let hours = MarketHours::default();
        assert_eq!(hours.phase(at(11, 59)), MarketPhase::Closed);
        assert_eq!(hours.phase(at(12, 0)), MarketPhase::PreMarket);
        assert_eq!(hours.phase(at(13, 29)), MarketPhase::PreMarket);
        assert_eq!(hours.phase(at(13, 30)), MarketPhase::Regular);
        assert_eq!(hours.phase(at(19, 59)), MarketPhase::Regular);
        assert_eq!(hours.phase(at(20, 0)), MarketPhase::PostMarket);
        assert_eq!(hours.phase(at(22, 30)), MarketPhase::Closed);
    }

    #[test]
    fn predicates_match_phase() {
        let hours = MarketHours::default();
        assert!(hours.pre_market_open(at(12, 30)));
        assert!(hours.regular_market_open(at(15, 0)));
        assert!(hours.post_market_open(at(21, 0)));
        assert!(!hours.regular_market_open(at(21, 0)));
    }

    #[test]
    fn weekend_is_closed() {
        let hours = MarketHours::default();
        let saturday = Utc.with_ymd_and_hms(2024, 5, 18, 15, 0, 0).unwrap();
        assert_eq!(hours.phase(saturday), MarketPhase::Closed);
    }

    #[test]
    fn phase_display() {
        assert_eq!(MarketPhase::PostMarket.to_string(), "post-market");
    }
}
