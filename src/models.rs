use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Deserialize;

use crate::error::{Result, TrustError};

/// One row of input as it arrives, before any normalisation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub source: Option<String>,
    pub target: Option<String>,
    pub rating: Option<String>,
    pub timestamp: Option<String>,
}

impl RawRecord {
    pub fn new(source: &str, target: &str, rating: &str, timestamp: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            rating: Some(rating.to_string()),
            timestamp: Some(timestamp.to_string()),
        }
    }
}

/// A single timestamped rating from `source` to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    /// Raw rating on the `[-10, 10]` scale.
    pub rating: f64,
    pub timestamp: DateTime<Utc>,
}

impl EdgeRecord {
    /// Rating scaled into `[-1, 1]`.
    pub fn weight(&self) -> f64 {
        self.rating / 10.0
    }
}

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(TrustError::InvalidPeriod(format!(
                "month {month} is outside 1..=12"
            )));
        }
        let period = Self { year, month };
        period.start()?;
        Ok(period)
    }

    pub fn of(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    /// First instant of the month.
    pub fn start(&self) -> Result<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| TrustError::InvalidPeriod(format!("{self} cannot be represented")))
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TrustError::InvalidPeriod(format!("'{s}' is not a YYYY-MM month"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Period::new(year, month)
    }
}

/// One end of a snapshot window: either a whole month or an exact instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodBound {
    Month(Period),
    Instant(DateTime<Utc>),
}

impl PeriodBound {
    pub fn start(&self) -> Result<DateTime<Utc>> {
        match self {
            PeriodBound::Month(period) => period.start(),
            PeriodBound::Instant(instant) => Ok(*instant),
        }
    }

    /// The month bucket this bound falls in.
    pub fn bucket(&self) -> Period {
        match self {
            PeriodBound::Month(period) => *period,
            PeriodBound::Instant(instant) => Period::of(*instant),
        }
    }
}

impl fmt::Display for PeriodBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodBound::Month(period) => period.fmt(f),
            PeriodBound::Instant(instant) => write!(f, "{}", instant.to_rfc3339()),
        }
    }
}

impl FromStr for PeriodBound {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(period) = s.parse::<Period>() {
            return Ok(PeriodBound::Month(period));
        }
        if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
            return Ok(PeriodBound::Instant(instant.with_timezone(&Utc)));
        }
        if let Ok(secs) = s.parse::<i64>() {
            if secs >= 0 {
                if let Some(instant) = DateTime::from_timestamp(secs, 0) {
                    return Ok(PeriodBound::Instant(instant));
                }
            }
        }
        Err(TrustError::InvalidPeriod(format!(
            "'{s}' is neither a YYYY-MM month, an RFC 3339 time nor a unix timestamp"
        )))
    }
}

/// Node annotations carried by a snapshot graph.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustNode {
    pub id: String,
    pub fairness: f64,
    pub goodness: f64,
}

impl TrustNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fairness: 0.0,
            goodness: 0.0,
        }
    }
}

/// Edge annotations carried by a snapshot graph.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustEdge {
    pub rating: f64,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
    /// `None` until the first scoring round has run.
    pub fairness: Option<f64>,
}

impl From<&EdgeRecord> for TrustEdge {
    fn from(record: &EdgeRecord) -> Self {
        Self {
            rating: record.rating,
            weight: record.weight(),
            timestamp: record.timestamp,
            fairness: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parses_and_displays() {
        let period: Period = "2011-03".parse().unwrap();
        assert_eq!(period, Period { year: 2011, month: 3 });
        assert_eq!(period.to_string(), "2011-03");
    }

    #[test]
    fn period_rejects_bad_labels() {
        for label in ["2011-13", "2011-00", "2011/03", "11-03", "march"] {
            assert!(
                matches!(label.parse::<Period>(), Err(TrustError::InvalidPeriod(_))),
                "{label} should be rejected"
            );
        }
    }

    #[test]
    fn december_rolls_into_next_year() {
        let next = Period::new(2013, 12).unwrap().next();
        assert_eq!(next, Period { year: 2014, month: 1 });
    }

    #[test]
    fn bound_accepts_month_rfc3339_and_epoch() {
        assert_eq!(
            "2012-05".parse::<PeriodBound>().unwrap(),
            PeriodBound::Month(Period { year: 2012, month: 5 })
        );
        let instant = Utc.with_ymd_and_hms(2012, 5, 17, 8, 30, 0).unwrap();
        assert_eq!(
            "2012-05-17T08:30:00Z".parse::<PeriodBound>().unwrap(),
            PeriodBound::Instant(instant)
        );
        assert_eq!(
            instant.timestamp().to_string().parse::<PeriodBound>().unwrap(),
            PeriodBound::Instant(instant)
        );
        assert!("yesterday".parse::<PeriodBound>().is_err());
    }

    #[test]
    fn instant_bound_buckets_into_its_month() {
        let instant = Utc.with_ymd_and_hms(2010, 11, 30, 23, 59, 59).unwrap();
        assert_eq!(
            PeriodBound::Instant(instant).bucket(),
            Period { year: 2010, month: 11 }
        );
    }
}
