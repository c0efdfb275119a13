//! Health record types

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Date format accepted for range bounds
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A stored health record
///
/// `recorded_at` is the wall-clock time of the measurement; date range
/// queries compare its date component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub user_id: i64,
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub waist_cm: Option<f64>,
    pub recorded_at: NaiveDateTime,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Record {
    pub fn date(&self) -> NaiveDate {
        self.recorded_at.date()
    }
}

/// Record submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub waist_cm: Option<f64>,
    /// Defaults to the local wall-clock time when absent
    pub recorded_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub notes: String,
}

impl NewRecord {
    pub fn has_blood_pressure(&self) -> bool {
        self.systolic.is_some() || self.diastolic.is_some()
    }

    pub fn has_body_measurements(&self) -> bool {
        self.height_cm.is_some() || self.weight_kg.is_some()
    }

    /// Measurement time, falling back to the local wall clock
    pub fn recorded_at_or_now(&self) -> NaiveDateTime {
        self.recorded_at.unwrap_or_else(|| Local::now().naive_local())
    }

    /// Materialize into a stored record
    pub fn into_record(
        self,
        id: i64,
        user_id: i64,
        recorded_at: NaiveDateTime,
        created_at: DateTime<Utc>,
    ) -> Record {
        Record {
            id,
            user_id,
            systolic: self.systolic,
            diastolic: self.diastolic,
            heart_rate: self.heart_rate,
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            waist_cm: self.waist_cm,
            recorded_at,
            notes: self.notes,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("start date {start} is after end date {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

/// Inclusive date bounds; `None` is unbounded on that side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// No bounds at all
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, DateRangeError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(DateRangeError::Inverted { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Parse string bounds. Empty strings count as absent.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, DateRangeError> {
        Self::new(parse_bound(start)?, parse_bound(end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

fn parse_bound(raw: Option<&str>) -> Result<Option<NaiveDate>, DateRangeError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Some)
            .map_err(|_| DateRangeError::InvalidDate(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_parse_bounds() {
        let range = DateRange::parse(Some("2024-01-01"), Some("")).unwrap();
        assert_eq!(range.start, Some(date("2024-01-01")));
        assert_eq!(range.end, None);

        assert_eq!(DateRange::parse(None, None).unwrap(), DateRange::all());
        assert!(matches!(
            DateRange::parse(Some("01/02/2024"), None),
            Err(DateRangeError::InvalidDate(_))
        ));
        assert!(matches!(
            DateRange::parse(Some("2024-02-01"), Some("2024-01-01")),
            Err(DateRangeError::Inverted { .. })
        ));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        assert!(range.contains(date("2024-01-01")));
        assert!(range.contains(date("2024-01-31")));
        assert!(!range.contains(date("2023-12-31")));
        assert!(!range.contains(date("2024-02-01")));
        assert!(DateRange::all().contains(date("1999-09-09")));
    }

    #[test]
    fn test_measurement_groups() {
        let bp = NewRecord {
            systolic: Some(120),
            ..Default::default()
        };
        assert!(bp.has_blood_pressure());
        assert!(!bp.has_body_measurements());

        let body = NewRecord {
            weight_kg: Some(70.5),
            ..Default::default()
        };
        assert!(body.has_body_measurements());
        assert!(!NewRecord::default().has_blood_pressure());
    }
}
