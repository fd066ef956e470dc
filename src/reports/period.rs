//! Report period keys: `2024-W05`, `2024-03` and `2024-Q1`.
//!
//! Every key covers a half-open `[start, end)` range in UTC. Weeks follow the
//! ISO calendar, so week 1 is the week holding the year's first Thursday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Week,
    Month,
    Quarter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKey {
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
}

/// A slice of a period used for the report series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

impl PeriodKey {
    pub fn week(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self::Week { year, week })
    }

    pub fn month(year: i32, month: u32) -> Option<Self> {
        first_of_month(year, month).map(|_| Self::Month { year, month })
    }

    pub fn quarter(year: i32, quarter: u32) -> Option<Self> {
        ((1..=4).contains(&quarter) && first_of_month(year, 1).is_some())
            .then_some(Self::Quarter { year, quarter })
    }

    /// The key of `kind` whose range holds `date`.
    pub fn containing(kind: PeriodKind, date: NaiveDate) -> Self {
        match kind {
            PeriodKind::Week => {
                let iso = date.iso_week();
                Self::Week {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
            PeriodKind::Month => Self::Month {
                year: date.year(),
                month: date.month(),
            },
            PeriodKind::Quarter => Self::Quarter {
                year: date.year(),
                quarter: (date.month() - 1) / 3 + 1,
            },
        }
    }

    pub fn current(kind: PeriodKind) -> Self {
        Self::containing(kind, Utc::now().date_naive())
    }

    pub fn kind(&self) -> PeriodKind {
        match self {
            Self::Week { .. } => PeriodKind::Week,
            Self::Month { .. } => PeriodKind::Month,
            Self::Quarter { .. } => PeriodKind::Quarter,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            Self::Week { year, .. } | Self::Month { year, .. } | Self::Quarter { year, .. } => {
                *year
            }
        }
    }

    /// Week, month or quarter number within the year.
    pub fn index(&self) -> u32 {
        match self {
            Self::Week { week, .. } => *week,
            Self::Month { month, .. } => *month,
            Self::Quarter { quarter, .. } => *quarter,
        }
    }

    fn start_date(&self) -> NaiveDate {
        let date = match *self {
            Self::Week { year, week } => NaiveDate::from_isoywd_opt(year, week, Weekday::Mon),
            Self::Month { year, month } => first_of_month(year, month),
            Self::Quarter { year, quarter } => first_of_month(year, (quarter - 1) * 3 + 1),
        };
        // Constructors only build keys whose start date exists.
        date.unwrap_or_default()
    }

    fn end_date(&self) -> NaiveDate {
        match *self {
            Self::Week { .. } => self.start_date() + Duration::days(7),
            Self::Month { year, month } => {
                let (y, m) = next_month(year, month);
                first_of_month(y, m).unwrap_or_default()
            }
            Self::Quarter { year, quarter } => {
                let (y, m) = next_month(year, quarter * 3);
                first_of_month(y, m).unwrap_or_default()
            }
        }
    }

    pub fn range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (midnight(self.start_date()), midnight(self.end_date()))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let (start, end) = self.range();
        instant >= start && instant < end
    }

    pub fn previous(&self) -> Self {
        let day_before = self.start_date() - Duration::days(1);
        Self::containing(self.kind(), day_before)
    }

    /// Days for a week, ISO weeks (clipped to the month) for a month, months for a quarter.
    pub fn buckets(&self) -> Vec<Bucket> {
        let (start, end) = (self.start_date(), self.end_date());
        let mut buckets = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let (label, next) = match self.kind() {
                PeriodKind::Week => (cursor.format("%Y-%m-%d").to_string(), cursor + Duration::days(1)),
                PeriodKind::Month => {
                    let week = Self::containing(PeriodKind::Week, cursor);
                    (week.to_string(), week.end_date().min(end))
                }
                PeriodKind::Quarter => {
                    let month = Self::containing(PeriodKind::Month, cursor);
                    (month.to_string(), month.end_date())
                }
            };
            buckets.push(Bucket {
                label,
                start: midnight(cursor),
                end: midnight(next),
            });
            cursor = next;
        }
        buckets
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Week { year, week } => write!(f, "{year:04}-W{week:02}"),
            Self::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            Self::Quarter { year, quarter } => write!(f, "{year:04}-Q{quarter}"),
        }
    }
}

impl FromStr for PeriodKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid period '{s}', expected YYYY-Www, YYYY-MM or YYYY-Qn");
        let (year, rest) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let number = |digits: &str| -> Result<u32, String> {
            if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            digits.parse().map_err(|_| invalid())
        };

        let key = if let Some(week) = rest.strip_prefix(['W', 'w']) {
            Self::week(year, number(week)?)
        } else if let Some(quarter) = rest.strip_prefix(['Q', 'q']) {
            Self::quarter(year, number(quarter)?)
        } else {
            Self::month(year, number(rest)?)
        };
        key.ok_or_else(|| format!("Period '{s}' does not exist"))
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeriodKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> PeriodKey {
        s.parse().unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        midnight(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(key("2024-W05"), PeriodKey::Week { year: 2024, week: 5 });
        assert_eq!(key("2024-w5").to_string(), "2024-W05");
        assert_eq!(key("2024-03"), PeriodKey::Month { year: 2024, month: 3 });
        assert_eq!(key("2024-Q1"), PeriodKey::Quarter { year: 2024, quarter: 1 });
        for bad in ["2024", "2024-13", "2024-Q5", "2024-W00", "24-01", "2024-W1x", "2024-001"] {
            assert!(bad.parse::<PeriodKey>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_iso_week_one_of_2021() {
        let (start, end) = key("2021-W01").range();
        assert_eq!(start, day(2021, 1, 4));
        assert_eq!(end, day(2021, 1, 11));
    }

    #[test]
    fn test_week_53() {
        assert!("2020-W53".parse::<PeriodKey>().is_ok());
        assert!("2021-W53".parse::<PeriodKey>().is_err());
        let (start, _) = key("2020-W53").range();
        assert_eq!(start, day(2020, 12, 28));
    }

    #[test]
    fn test_quarter_four_ends_next_year() {
        let (start, end) = key("2023-Q4").range();
        assert_eq!(start, day(2023, 10, 1));
        assert_eq!(end, day(2024, 1, 1));
    }

    #[test]
    fn test_month_range_handles_leap_february() {
        let (start, end) = key("2024-02").range();
        assert_eq!(start, day(2024, 2, 1));
        assert_eq!(end, day(2024, 3, 1));
        assert!(key("2024-02").contains(day(2024, 2, 29)));
        assert!(!key("2024-02").contains(day(2024, 3, 1)));
    }

    #[test]
    fn test_previous_crosses_year() {
        assert_eq!(key("2021-W01").previous(), key("2020-W53"));
        assert_eq!(key("2024-01").previous(), key("2023-12"));
        assert_eq!(key("2024-Q1").previous(), key("2023-Q4"));
    }

    #[test]
    fn test_containing() {
        // Jan 1 2021 is a Friday that belongs to the last ISO week of 2020.
        let jan_first = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert_eq!(PeriodKey::containing(PeriodKind::Week, jan_first), key("2020-W53"));
        assert_eq!(PeriodKey::containing(PeriodKind::Month, jan_first), key("2021-01"));
        let august = NaiveDate::from_ymd_opt(2024, 8, 15).unwrap();
        assert_eq!(PeriodKey::containing(PeriodKind::Quarter, august), key("2024-Q3"));
    }

    #[test]
    fn test_buckets() {
        let week = key("2024-W10").buckets();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].label, "2024-03-04");

        let quarter = key("2024-Q2").buckets();
        let labels: Vec<&str> = quarter.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["2024-04", "2024-05", "2024-06"]);

        // March 2024 starts on a Friday: W09 (clipped) through W13 (clipped).
        let month = key("2024-03").buckets();
        assert_eq!(month.first().map(|b| b.label.as_str()), Some("2024-W09"));
        assert_eq!(month.last().map(|b| b.label.as_str()), Some("2024-W13"));
        assert_eq!(month[0].start, day(2024, 3, 1));
        assert_eq!(month.last().unwrap().end, day(2024, 4, 1));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&key("2024-Q3")).unwrap();
        assert_eq!(json, "\"2024-Q3\"");
        let parsed: PeriodKey = serde_json::from_str("\"2024-W01\"").unwrap();
        assert_eq!(parsed, key("2024-W01"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(serde_json::to_string(&PeriodKind::Week).unwrap(), "\"week\"");
        assert_eq!(key("2024-03").kind(), PeriodKind::Month);
        let kind: PeriodKind = serde_json::from_str("\"quarter\"").unwrap();
        assert_eq!(kind, PeriodKind::Quarter);
    }
}
