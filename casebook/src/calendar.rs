//! Working-day calendar
//!
//! Weekend and public-holiday lookup used to warn before scheduling a
//! session on a non-working day, plus the "before today" predicate shared
//! by postponement eligibility and the overdue-session reminders.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::Serialize;
use std::fmt;

use crate::services::settings::CalendarSettings;

/// Why a candidate date deserves a second look
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateWarning {
    Weekend { weekday: String },
    Holiday { name: String },
}

impl fmt::Display for DateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateWarning::Weekend { weekday } => write!(f, "{} is a weekend day", weekday),
            DateWarning::Holiday { name } => write!(f, "public holiday ({})", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HolidayDate {
    /// Recurs every year
    Annual { month: u32, day: u32 },
    Once(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Holiday {
    date: HolidayDate,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayCalendar {
    weekend: Vec<Weekday>,
    holidays: Vec<Holiday>,
}

impl HolidayCalendar {
    pub fn new(weekend: Vec<Weekday>) -> Self {
        Self {
            weekend,
            holidays: Vec::new(),
        }
    }

    /// Build a calendar from settings. Entries that do not parse are
    /// skipped with a warning.
    pub fn from_settings(settings: &CalendarSettings) -> Self {
        let weekend = settings
            .weekend_days
            .iter()
            .filter_map(|day| match day.parse::<Weekday>() {
                Ok(weekday) => Some(weekday),
                Err(_) => {
                    tracing::warn!("Ignoring unknown weekend day: {}", day);
                    None
                }
            })
            .collect();

        let mut calendar = Self::new(weekend);
        for holiday in &settings.holidays {
            if !calendar.add_holiday(&holiday.date, &holiday.name) {
                tracing::warn!("Ignoring holiday with invalid date: {}", holiday.date);
            }
        }
        calendar
    }

    /// Add a holiday given as `MM-DD` (every year) or `YYYY-MM-DD` (once).
    /// Returns false when the date does not parse.
    pub fn add_holiday(&mut self, date: &str, name: &str) -> bool {
        let parsed = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(day) => Some(HolidayDate::Once(day)),
            Err(_) => parse_month_day(date),
        };

        match parsed {
            Some(date) => {
                self.holidays.push(Holiday {
                    date,
                    name: name.to_string(),
                });
                true
            }
            None => false,
        }
    }

    pub fn is_weekend(&self, day: NaiveDate) -> bool {
        self.weekend.contains(&day.weekday())
    }

    pub fn holiday_name(&self, day: NaiveDate) -> Option<&str> {
        self.holidays
            .iter()
            .find(|holiday| match holiday.date {
                HolidayDate::Annual { month, day: dom } => day.month() == month && day.day() == dom,
                HolidayDate::Once(once) => once == day,
            })
            .map(|holiday| holiday.name.as_str())
    }

    /// Holidays take precedence over weekends in the warning text
    pub fn warning_for(&self, day: NaiveDate) -> Option<DateWarning> {
        if let Some(name) = self.holiday_name(day) {
            return Some(DateWarning::Holiday {
                name: name.to_string(),
            });
        }
        if self.is_weekend(day) {
            return Some(DateWarning::Weekend {
                weekday: day.weekday().to_string(),
            });
        }
        None
    }
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self::from_settings(&CalendarSettings::default())
    }
}

fn parse_month_day(raw: &str) -> Option<HolidayDate> {
    let (month, day) = raw.split_once('-')?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    // 2024 is a leap year, so 02-29 is accepted
    NaiveDate::from_ymd_opt(2024, month, day)?;
    Some(HolidayDate::Annual { month, day })
}

/// Date-only comparison: is `date` on a day before `today`?
pub fn is_before_today(date: &DateTime<Utc>, today: NaiveDate) -> bool {
    date.date_naive() < today
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
