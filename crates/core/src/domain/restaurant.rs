use chrono::{Duration, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RestaurantId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub booking_duration_minutes: u32,
    pub max_party_size: u32,
    pub subscription_tier: String,
    pub commission_override_pct: Option<Decimal>,
    pub delivery_enabled: bool,
}

impl Restaurant {
    pub fn booking_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.booking_duration_minutes))
    }

    pub fn hours(&self) -> OperatingHours {
        OperatingHours { opening: self.opening_time, closing: self.closing_time }
    }
}

/// Same-day operating window. Closing times past midnight are not modelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub opening: NaiveTime,
    pub closing: NaiveTime,
}

impl OperatingHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.opening && time <= self.closing
    }

    /// Latest start time for a seating of `duration`, or `None` when the
    /// window is shorter than the seating itself.
    pub fn latest_start(&self, duration: Duration) -> Option<NaiveTime> {
        let (latest, wrapped_secs) = self.closing.overflowing_sub_signed(duration);
        if wrapped_secs != 0 || latest < self.opening {
            return None;
        }
        Some(latest)
    }

    pub fn admits_booking(&self, start: NaiveTime, duration: Duration) -> bool {
        match self.latest_start(duration) {
            Some(latest) => start >= self.opening && start <= latest,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveTime};

    use super::OperatingHours;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn booking_window_closes_one_duration_before_closing() {
        let hours = OperatingHours { opening: hm(11, 0), closing: hm(22, 0) };
        let duration = Duration::minutes(90);

        assert_eq!(hours.latest_start(duration), Some(hm(20, 30)));
        assert!(hours.admits_booking(hm(11, 0), duration));
        assert!(hours.admits_booking(hm(20, 30), duration));
        assert!(!hours.admits_booking(hm(20, 31), duration));
        assert!(!hours.admits_booking(hm(10, 59), duration));
    }

    #[test]
    fn window_shorter_than_seating_admits_nothing() {
        let hours = OperatingHours { opening: hm(0, 30), closing: hm(1, 0) };
        assert_eq!(hours.latest_start(Duration::minutes(90)), None);
        assert!(!hours.admits_booking(hm(0, 30), Duration::minutes(90)));
    }
}
