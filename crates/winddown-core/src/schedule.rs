use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

use crate::error::SettingsError;

/// A wall-clock time with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    /// Create a time of day
    ///
    /// # Errors
    ///
    /// Returns an error if `hour > 23` or `minute > 59`
    pub fn new(hour: u32, minute: u32) -> Result<Self, SettingsError> {
        if hour > 23 || minute > 59 {
            return Err(SettingsError::InvalidTime { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    #[must_use]
    pub const fn hour(self) -> u32 {
        self.hour
    }

    #[must_use]
    pub const fn minute(self) -> u32 {
        self.minute
    }

    /// Minutes elapsed since midnight
    #[must_use]
    pub const fn minutes_of_day(self) -> u32 {
        self.hour * 60 + self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| SettingsError::TimeFormat(s.to_string()))?;
        let hour = hour
            .parse()
            .map_err(|_| SettingsError::TimeFormat(s.to_string()))?;
        let minute = minute
            .parse()
            .map_err(|_| SettingsError::TimeFormat(s.to_string()))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Day of the week, numbered 1 = Sunday through 7 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Sunday = 1,
    Monday = 2,
    Tuesday = 3,
    Wednesday = 4,
    Thursday = 5,
    Friday = 6,
    Saturday = 7,
}

impl Weekday {
    pub const ALL: [Self; 7] = [
        Self::Sunday,
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
    ];

    /// Monday through Friday
    #[must_use]
    pub fn weekdays() -> BTreeSet<Self> {
        [
            Self::Monday,
            Self::Tuesday,
            Self::Wednesday,
            Self::Thursday,
            Self::Friday,
        ]
        .into_iter()
        .collect()
    }

    #[must_use]
    pub fn weekend() -> BTreeSet<Self> {
        [Self::Saturday, Self::Sunday].into_iter().collect()
    }

    /// Look up a weekday by its 1-based number (1 = Sunday)
    #[must_use]
    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|day| day.number() == number)
    }

    #[must_use]
    pub const fn number(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Sunday => "Sun",
            Self::Monday => "Mon",
            Self::Tuesday => "Tue",
            Self::Wednesday => "Wed",
            Self::Thursday => "Thu",
            Self::Friday => "Fri",
            Self::Saturday => "Sat",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Sun => Self::Sunday,
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Weekday {
    type Err = SettingsError;

    /// Accepts short or long English names (any case) and the numbers 1-7
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        if let Ok(number) = needle.parse::<u32>() {
            return Self::from_number(number).ok_or_else(|| SettingsError::InvalidWeekday(s.into()));
        }
        Self::ALL
            .into_iter()
            .find(|day| {
                let short = day.short_name().to_ascii_lowercase();
                needle == short || format!("{day:?}").to_ascii_lowercase() == needle
            })
            .ok_or_else(|| SettingsError::InvalidWeekday(s.into()))
    }
}

/// A recurring weekly time window.
///
/// `start > end` describes an overnight window that wraps past midnight.
/// `start == end` is never active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub enabled: bool,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub active_days: BTreeSet<Weekday>,
}

impl Default for WeeklySchedule {
    /// 18:00 to 09:00, Monday through Friday
    fn default() -> Self {
        Self {
            enabled: true,
            start: TimeOfDay { hour: 18, minute: 0 },
            end: TimeOfDay { hour: 9, minute: 0 },
            active_days: Weekday::weekdays(),
        }
    }
}

impl WeeklySchedule {
    /// Whether the window can ever be active
    fn is_schedulable(&self) -> bool {
        self.enabled && !self.active_days.is_empty() && self.start != self.end
    }

    #[must_use]
    pub fn is_overnight(&self) -> bool {
        self.start > self.end
    }

    /// Check whether `now` falls inside the window.
    ///
    /// Only the weekday of `now` itself is consulted, so the early-morning
    /// tail of an overnight window belongs to the day it falls on.
    #[must_use]
    pub fn is_active<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        if !self.is_schedulable() {
            return false;
        }
        if !self.active_days.contains(&Weekday::from(now.weekday())) {
            return false;
        }

        let current = now.hour() * 60 + now.minute();
        let start = self.start.minutes_of_day();
        let end = self.end.minutes_of_day();

        if start < end {
            current >= start && current < end
        } else {
            current >= start || current < end
        }
    }

    /// The next instant at which `is_active` is expected to flip.
    ///
    /// Returns the next `end` while active and the next `start` otherwise,
    /// restricted to active days and searched at most seven days ahead.
    #[must_use]
    pub fn next_transition<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        if !self.is_schedulable() {
            return None;
        }
        let target = if self.is_active(now) {
            self.end
        } else {
            self.start
        };
        self.next_occurrence(target, now)
    }

    fn next_occurrence<Tz: TimeZone>(
        &self,
        time: TimeOfDay,
        after: &DateTime<Tz>,
    ) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let today = after.date_naive();
        let first_offset = match at_time(&tz, today, time) {
            Some(candidate) if candidate > *after => 0,
            _ => 1,
        };

        (first_offset..first_offset + 7)
            .filter_map(|offset| {
                let date = today.checked_add_days(Days::new(offset))?;
                at_time(&tz, date, time)
            })
            .find(|candidate| {
                self.active_days
                    .contains(&Weekday::from(candidate.weekday()))
            })
    }

    /// Short human description, e.g. `18:00-09:00 Mon Tue Wed Thu Fri (overnight)`
    #[must_use]
    pub fn describe(&self) -> String {
        if !self.enabled {
            return "disabled".to_string();
        }
        let days: Vec<&str> = self.active_days.iter().map(|d| d.short_name()).collect();
        let overnight = if self.is_overnight() { " (overnight)" } else { "" };
        format!("{}-{} {}{overnight}", self.start, self.end, days.join(" "))
    }
}

/// Resolve a local wall-clock time on `date`, skipping times that do not
/// exist in `tz` (DST gaps).
fn at_time<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: TimeOfDay) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(time.hour(), time.minute(), 0)?;
    tz.from_local_datetime(&naive).earliest()
}
