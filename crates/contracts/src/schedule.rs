//! Recurring generation calendar.
//!
//! All computation is in UTC. A schedule fires once per period at its
//! `time_of_day`; missed periods are not back-filled, the next run is always
//! computed from the moment the last one actually happened.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{DomainError, DomainResult, ScheduleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

tradeflow_core::status_names!(Frequency {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

/// Parse a `HH:MM` time of day.
pub fn parse_time_of_day(s: &str) -> DomainResult<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| DomainError::validation(format!("time of day must be HH:MM, got {s:?}")))
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// When a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    /// 0 = Sunday .. 6 = Saturday. Required for weekly schedules.
    pub day_of_week: Option<u8>,
    /// 1..=31, clamped to the month's length. Required for monthly schedules.
    pub day_of_month: Option<u8>,
    pub time_of_day: NaiveTime,
}

impl Recurrence {
    pub fn daily(time_of_day: NaiveTime) -> Self {
        Self {
            frequency: Frequency::Daily,
            day_of_week: None,
            day_of_month: None,
            time_of_day,
        }
    }

    pub fn weekly(day_of_week: u8, time_of_day: NaiveTime) -> Self {
        Self {
            frequency: Frequency::Weekly,
            day_of_week: Some(day_of_week),
            day_of_month: None,
            time_of_day,
        }
    }

    pub fn monthly(day_of_month: u8, time_of_day: NaiveTime) -> Self {
        Self {
            frequency: Frequency::Monthly,
            day_of_week: None,
            day_of_month: Some(day_of_month),
            time_of_day,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self.frequency {
            Frequency::Daily => Ok(()),
            Frequency::Weekly => match self.day_of_week {
                Some(d) if d <= 6 => Ok(()),
                Some(d) => Err(DomainError::validation(format!(
                    "day of week must be 0..=6, got {d}"
                ))),
                None => Err(DomainError::validation("weekly schedule requires a day of week")),
            },
            Frequency::Monthly => match self.day_of_month {
                Some(d) if (1..=31).contains(&d) => Ok(()),
                Some(d) => Err(DomainError::validation(format!(
                    "day of month must be 1..=31, got {d}"
                ))),
                None => Err(DomainError::validation("monthly schedule requires a day of month")),
            },
        }
    }

    /// First firing date on or after `date`.
    fn firing_date_from(&self, date: NaiveDate) -> NaiveDate {
        match self.frequency {
            Frequency::Daily => date,
            Frequency::Weekly => {
                let target = u32::from(self.day_of_week.unwrap_or(0)) % 7;
                let today = date.weekday().num_days_from_sunday();
                let ahead = (target + 7 - today) % 7;
                date + Days::new(u64::from(ahead))
            }
            Frequency::Monthly => {
                let wanted = u32::from(self.day_of_month.unwrap_or(1).max(1));
                let (y, m) = (date.year(), date.month());
                let this_month = wanted.min(days_in_month(y, m));
                if this_month >= date.day() {
                    NaiveDate::from_ymd_opt(y, m, this_month).unwrap_or(date)
                } else {
                    let (ny, nm) = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
                    let day = wanted.min(days_in_month(ny, nm));
                    NaiveDate::from_ymd_opt(ny, nm, day).unwrap_or(date)
                }
            }
        }
    }

    fn at_time(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.time_of_day).and_utc()
    }

    /// Next run after a generation that happened at `last`: the first firing
    /// date strictly after `last`'s date, at `time_of_day`.
    pub fn next_after(&self, last: DateTime<Utc>) -> DateTime<Utc> {
        let from = last.date_naive() + Days::new(1);
        self.at_time(self.firing_date_from(from))
    }

    /// First run at or after `start`.
    pub fn first_on_or_after(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = self.at_time(self.firing_date_from(start.date_naive()));
        if candidate >= start {
            candidate
        } else {
            self.next_after(candidate)
        }
    }
}

/// A contract's generation schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSchedule {
    pub id: ScheduleId,
    pub recurrence: Recurrence,
    pub last_generated: Option<DateTime<Utc>>,
    pub next_generation: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ContractSchedule {
    pub fn new(id: ScheduleId, recurrence: Recurrence, start: DateTime<Utc>) -> DomainResult<Self> {
        recurrence.validate()?;
        Ok(Self {
            id,
            recurrence,
            last_generated: None,
            next_generation: Some(recurrence.first_on_or_after(start)),
            is_active: true,
        })
    }

    /// Due when the planned run has arrived, or when nothing was generated
    /// yet and the contract has started.
    pub fn is_due(&self, now: DateTime<Utc>, start_date: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_generated {
            None => now >= start_date,
            Some(_) => self.next_generation.is_some_and(|next| next <= now),
        }
    }

    /// Record a successful generation at `now` and plan the next one.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_generated = Some(now);
        self.next_generation = Some(self.recurrence.next_after(now));
    }
}
