//! Contribution schedule: which calendar days trigger a buy.
//!
//! Weekday numbering is 0 = Monday through 6 = Sunday.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How often a contribution is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(ConfigError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Configuration errors. All of them are raised before any bar is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("day of week/month must be specified for {0} frequency")]
    MissingDay(Frequency),

    #[error("day {day} is out of range for {frequency} frequency (expected {min}..={max})")]
    DayOutOfRange {
        frequency: Frequency,
        day: u32,
        min: u32,
        max: u32,
    },

    #[error("contribution amount must be positive")]
    ZeroAmount,

    #[error("unknown frequency '{0}' (expected daily, weekly or monthly)")]
    UnknownFrequency(String),
}

/// Calendar policy deciding whether a date is a contribution day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionSchedule {
    Daily,
    Weekly(Weekday),
    /// Day of month, 1..=31. Months without that day never trigger.
    Monthly(u32),
}

impl ContributionSchedule {
    /// Build a schedule from a frequency and its optional day key.
    ///
    /// The day key is ignored for `Daily`.
    pub fn new(frequency: Frequency, day: Option<u32>) -> Result<Self, ConfigError> {
        match frequency {
            Frequency::Daily => Ok(ContributionSchedule::Daily),
            Frequency::Weekly => {
                let day = day.ok_or(ConfigError::MissingDay(frequency))?;
                let weekday = weekday_from_index(day).ok_or(ConfigError::DayOutOfRange {
                    frequency,
                    day,
                    min: 0,
                    max: 6,
                })?;
                Ok(ContributionSchedule::Weekly(weekday))
            }
            Frequency::Monthly => {
                let day = day.ok_or(ConfigError::MissingDay(frequency))?;
                if !(1..=31).contains(&day) {
                    return Err(ConfigError::DayOutOfRange {
                        frequency,
                        day,
                        min: 1,
                        max: 31,
                    });
                }
                Ok(ContributionSchedule::Monthly(day))
            }
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            ContributionSchedule::Daily => Frequency::Daily,
            ContributionSchedule::Weekly(_) => Frequency::Weekly,
            ContributionSchedule::Monthly(_) => Frequency::Monthly,
        }
    }

    /// The day key in its configuration form (weekday index or day of month).
    pub fn day_key(&self) -> Option<u32> {
        match self {
            ContributionSchedule::Daily => None,
            ContributionSchedule::Weekly(weekday) => Some(weekday.num_days_from_monday()),
            ContributionSchedule::Monthly(day) => Some(*day),
        }
    }

    pub fn is_contribution_day(&self, date: NaiveDate) -> bool {
        match self {
            ContributionSchedule::Daily => true,
            ContributionSchedule::Weekly(weekday) => date.weekday() == *weekday,
            ContributionSchedule::Monthly(day) => date.day() == *day,
        }
    }
}

impl fmt::Display for ContributionSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributionSchedule::Daily => write!(f, "daily"),
            ContributionSchedule::Weekly(weekday) => write!(f, "weekly on {weekday}"),
            ContributionSchedule::Monthly(day) => write!(f, "monthly on day {day}"),
        }
    }
}

fn weekday_from_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

/// Validated contribution settings for one run.
///
/// Serializes as `{ frequency, amount, day }` and re-validates on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ContributionSpec", try_from = "ContributionSpec")]
pub struct ContributionConfig {
    schedule: ContributionSchedule,
    amount: u64,
}

impl ContributionConfig {
    /// Validate and build. Weekly and monthly frequencies require `day`.
    pub fn new(frequency: Frequency, amount: u64, day: Option<u32>) -> Result<Self, ConfigError> {
        let schedule = ContributionSchedule::new(frequency, day)?;
        Self::with_schedule(schedule, amount)
    }

    pub fn with_schedule(schedule: ContributionSchedule, amount: u64) -> Result<Self, ConfigError> {
        if amount == 0 {
            return Err(ConfigError::ZeroAmount);
        }
        Ok(Self { schedule, amount })
    }

    pub fn schedule(&self) -> ContributionSchedule {
        self.schedule
    }

    pub fn frequency(&self) -> Frequency {
        self.schedule.frequency()
    }

    /// Contribution amount in raw currency units.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn day(&self) -> Option<u32> {
        self.schedule.day_key()
    }
}

/// Check one date against a configuration.
pub fn is_contribution_day(date: NaiveDate, config: &ContributionConfig) -> bool {
    config.schedule.is_contribution_day(date)
}

/// Wire form of [`ContributionConfig`], as written in run files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionSpec {
    pub frequency: Frequency,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl From<ContributionConfig> for ContributionSpec {
    fn from(config: ContributionConfig) -> Self {
        Self {
            frequency: config.frequency(),
            amount: config.amount,
            day: config.day(),
        }
    }
}

impl TryFrom<ContributionSpec> for ContributionConfig {
    type Error = ConfigError;

    fn try_from(spec: ContributionSpec) -> Result<Self, Self::Error> {
        ContributionConfig::new(spec.frequency, spec.amount, spec.day)
    }
}
