//! Provider services, weekly availability and bookings

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

/// Slot start times are offered on this grid
pub const SLOT_STEP_MINUTES: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Rescheduled,
}

db_enum!(BookingStatus {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Rescheduled => "RESCHEDULED",
});

impl BookingStatus {
    /// Statuses that occupy the provider's calendar
    pub const BLOCKING: [BookingStatus; 3] = [Self::Pending, Self::Confirmed, Self::Rescheduled];

    pub fn is_blocking(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (Confirmed, Rescheduled)
                | (Rescheduled, Confirmed)
                | (Rescheduled, Cancelled)
        )
    }

    /// Clients can only cancel, providers drive everything else
    pub fn client_may_set(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Service {
    pub id: i64,
    pub provider_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Weekly availability window of a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Availability {
    pub id: i64,
    pub provider_id: i64,
    /// 0 = Sunday
    pub day_of_week: i32,
    /// "HH:MM"
    pub start_time: String,
    pub end_time: String,
    pub created_at: i64,
}

impl Availability {
    /// Window as minutes since midnight
    pub fn window(&self) -> Result<(i32, i32), AppError> {
        Ok((parse_hhmm(&self.start_time)?, parse_hhmm(&self.end_time)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Booking {
    pub id: i64,
    pub service_id: i64,
    pub client_id: i64,
    pub provider_id: i64,
    pub start_at: i64,
    pub end_at: i64,
    pub status: String,
    pub total_price: f64,
    pub notes: Option<String>,
    pub payment_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Booking {
    pub fn status(&self) -> Option<BookingStatus> {
        BookingStatus::from_db(&self.status)
    }

    /// Either party may move a CONFIRMED booking. A RESCHEDULED one waits
    /// for the provider to confirm the new slot first.
    pub fn ensure_can_reschedule(&self, user_id: i64) -> Result<(), AppError> {
        if self.client_id != user_id && self.provider_id != user_id {
            return Err(AppError::not_owner());
        }
        match self.status() {
            Some(status) if status.can_transition_to(BookingStatus::Rescheduled) => Ok(()),
            _ => Err(AppError::invalid_transition(
                self.status.as_str(),
                BookingStatus::Rescheduled.as_db(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCreate {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityCreate {
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceSearchQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub max_price: Option<f64>,
    pub provider_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingCreate {
    pub service_id: i64,
    pub start_at: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingStatusUpdate {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub start_at: i64,
}

/// Parse "HH:MM" into minutes since midnight
pub fn parse_hhmm(value: &str) -> Result<i32, AppError> {
    let invalid = || {
        AppError::with_message(ErrorCode::InvalidFormat, format!("Invalid time '{}', expected HH:MM", value))
    };
    let (h, m) = value.split_once(':').ok_or_else(invalid)?;
    let h: i32 = h.parse().map_err(|_| invalid())?;
    let m: i32 = m.parse().map_err(|_| invalid())?;
    if !(0..=24).contains(&h) || !(0..60).contains(&m) || (h == 24 && m != 0) {
        return Err(invalid());
    }
    Ok(h * 60 + m)
}

/// Validate a new availability window
pub fn validate_window(day_of_week: i32, start: &str, end: &str) -> Result<(i32, i32), AppError> {
    if !(0..=6).contains(&day_of_week) {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "day_of_week must be between 0 (Sunday) and 6",
        ));
    }
    let (start, end) = (parse_hhmm(start)?, parse_hhmm(end)?);
    if start >= end {
        return Err(AppError::new(ErrorCode::InvalidTimeWindow));
    }
    Ok((start, end))
}

/// Day of week with Sunday = 0
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// UTC midnight of `date` in milliseconds
pub fn day_start_millis(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// Half-open overlap: back-to-back bookings do not conflict
pub fn bookings_overlap(start: i64, end: i64, other_start: i64, other_end: i64) -> bool {
    start < other_end && end > other_start
}

/// Bookable slots of `duration_minutes` on `date`.
///
/// Starts step by 15 minutes across each availability window; slots in
/// the past or overlapping a busy period are skipped.
pub fn generate_slots(
    date: NaiveDate,
    windows: &[(i32, i32)],
    duration_minutes: i32,
    busy: &[(i64, i64)],
    now: i64,
) -> Vec<TimeSlot> {
    if duration_minutes <= 0 {
        return Vec::new();
    }
    let day_start = day_start_millis(date);
    let mut slots = Vec::new();

    for &(window_start, window_end) in windows {
        let mut minute = window_start;
        while minute + duration_minutes <= window_end {
            let start = day_start + i64::from(minute) * 60_000;
            let end = start + i64::from(duration_minutes) * 60_000;
            let free = !busy
                .iter()
                .any(|&(b_start, b_end)| bookings_overlap(start, end, b_start, b_end));
            if start >= now && free {
                slots.push(TimeSlot { start, end });
            }
            minute += SLOT_STEP_MINUTES;
        }
    }

    slots.sort_by_key(|s| s.start);
    slots.dedup();
    slots
}

/// Whether [start, end) fits entirely inside one of the windows of its day
pub fn fits_availability(start: i64, end: i64, date: NaiveDate, windows: &[(i32, i32)]) -> bool {
    let day_start = day_start_millis(date);
    windows.iter().any(|&(ws, we)| {
        let w_start = day_start + i64::from(ws) * 60_000;
        let w_end = day_start + i64::from(we) * 60_000;
        start >= w_start && end <= w_end
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        // a Monday
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:30").unwrap(), 570);
        assert_eq!(parse_hhmm("00:00").unwrap(), 0);
        assert_eq!(parse_hhmm("24:00").unwrap(), 1440);
        assert!(parse_hhmm("24:30").is_err());
        assert!(parse_hhmm("9h30").is_err());
        assert!(parse_hhmm("12:60").is_err());
    }

    #[test]
    fn test_validate_window() {
        assert_eq!(validate_window(1, "09:00", "12:00").unwrap(), (540, 720));
        assert_eq!(
            validate_window(1, "12:00", "09:00").unwrap_err().code,
            ErrorCode::InvalidTimeWindow
        );
        assert_eq!(
            validate_window(7, "09:00", "12:00").unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );
    }

    #[test]
    fn test_day_of_week_sunday_zero() {
        assert_eq!(day_of_week(date()), 1);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()), 0);
    }

    #[test]
    fn test_generate_slots_grid() {
        // 09:00-10:00, 30 min service -> 09:00, 09:15, 09:30
        let slots = generate_slots(date(), &[(540, 600)], 30, &[], 0);
        let day = day_start_millis(date());
        let starts: Vec<i64> = slots.iter().map(|s| (s.start - day) / 60_000).collect();
        assert_eq!(starts, vec![540, 555, 570]);
        assert_eq!(slots[0].end - slots[0].start, 30 * 60_000);
    }

    #[test]
    fn test_generate_slots_skips_busy_and_past() {
        let day = day_start_millis(date());
        let at = |minute: i64| day + minute * 60_000;
        // booked 09:30-10:00
        let busy = [(at(570), at(600))];
        let slots = generate_slots(date(), &[(540, 660)], 30, &busy, 0);
        let starts: Vec<i64> = slots.iter().map(|s| (s.start - day) / 60_000).collect();
        assert_eq!(starts, vec![540, 600, 615, 630]);

        // now = 10:05 removes everything before
        let slots = generate_slots(date(), &[(540, 660)], 30, &busy, at(605));
        let starts: Vec<i64> = slots.iter().map(|s| (s.start - day) / 60_000).collect();
        assert_eq!(starts, vec![615, 630]);
    }

    #[test]
    fn test_fits_availability() {
        let day = day_start_millis(date());
        let at = |minute: i64| day + minute * 60_000;
        let windows = [(540, 720)];
        assert!(fits_availability(at(540), at(600), date(), &windows));
        assert!(fits_availability(at(660), at(720), date(), &windows));
        assert!(!fits_availability(at(700), at(730), date(), &windows));
    }

    #[test]
    fn test_booking_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Rescheduled));
        assert!(Rescheduled.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Cancelled.client_may_set());
        assert!(!Confirmed.client_may_set());
    }

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: 1,
            service_id: 2,
            client_id: 3,
            provider_id: 4,
            start_at: 1_000,
            end_at: 2_000,
            status: status.as_db().to_string(),
            total_price: 40.0,
            notes: None,
            payment_id: Some(9),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_only_confirmed_bookings_move() {
        assert!(booking(BookingStatus::Confirmed).ensure_can_reschedule(3).is_ok());
        assert!(booking(BookingStatus::Confirmed).ensure_can_reschedule(4).is_ok());
        for status in BookingStatus::ALL
            .iter()
            .filter(|s| **s != BookingStatus::Confirmed)
        {
            let err = booking(*status).ensure_can_reschedule(3).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidStatusTransition, "{status}");
        }
        let err = booking(BookingStatus::Confirmed)
            .ensure_can_reschedule(42)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotResourceOwner);
    }

    #[test]
    fn test_bookings_overlap_half_open() {
        assert!(bookings_overlap(0, 10, 5, 15));
        assert!(!bookings_overlap(0, 10, 10, 20));
    }
}
