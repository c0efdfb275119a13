//! Health record commands

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Args;
use colored::Colorize;
use vitals_store::{DateRange, NewRecord, Record, Storage};

use super::users::resolve;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Args, Debug, Default)]
pub struct Measurements {
    /// Systolic pressure (mmHg)
    #[arg(long)]
    pub systolic: Option<i32>,
    /// Diastolic pressure (mmHg)
    #[arg(long)]
    pub diastolic: Option<i32>,
    /// Heart rate (bpm)
    #[arg(long)]
    pub heart_rate: Option<i32>,
    /// Height (cm)
    #[arg(long)]
    pub height: Option<f64>,
    /// Weight (kg)
    #[arg(long)]
    pub weight: Option<f64>,
    /// Waist circumference (cm)
    #[arg(long)]
    pub waist: Option<f64>,
    /// Measurement time, "YYYY-MM-DD HH:MM" (defaults to now)
    #[arg(long)]
    pub at: Option<String>,
    /// Free-form notes
    #[arg(long, default_value = "")]
    pub notes: String,
}

impl Measurements {
    fn into_new_record(self) -> Result<NewRecord> {
        let recorded_at = self
            .at
            .as_deref()
            .map(|s| NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT))
            .transpose()
            .context("Invalid --at, expected \"YYYY-MM-DD HH:MM\"")?;

        Ok(NewRecord {
            systolic: self.systolic,
            diastolic: self.diastolic,
            heart_rate: self.heart_rate,
            height_cm: self.height,
            weight_kg: self.weight,
            waist_cm: self.waist,
            recorded_at,
            notes: self.notes,
        })
    }
}

pub async fn list(
    storage: &Storage,
    username: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let range = DateRange::parse(from, to)?;
    let user = resolve(storage, username).await?;
    let records = storage.list_records(user.id, &range).await?;

    println!("{}", format!("Records for {}", user.username).blue().bold());
    println!();

    if records.is_empty() {
        println!("   (No records)");
        return Ok(());
    }
    for record in &records {
        println!("   {}", describe(record));
    }
    Ok(())
}

pub async fn add(storage: &Storage, username: &str, measurements: Measurements) -> Result<()> {
    let record = measurements.into_new_record()?;
    let user = resolve(storage, username).await?;
    let stored = storage.create_record(user.id, &record).await?;

    println!("{}", format!("Added record {}", stored.id).green());
    println!("   {}", describe(&stored));
    Ok(())
}

pub async fn delete(storage: &Storage, username: &str, id: i64) -> Result<()> {
    let user = resolve(storage, username).await?;
    storage.delete_record(id, user.id).await?;

    println!("{}", format!("Deleted record {}", id).green());
    Ok(())
}

fn describe(record: &Record) -> String {
    let mut parts = Vec::new();
    if let (Some(sys), Some(dia)) = (record.systolic, record.diastolic) {
        parts.push(format!("BP {}/{}", sys, dia));
    } else if let Some(sys) = record.systolic {
        parts.push(format!("SYS {}", sys));
    } else if let Some(dia) = record.diastolic {
        parts.push(format!("DIA {}", dia));
    }
    if let Some(hr) = record.heart_rate {
        parts.push(format!("HR {}", hr));
    }
    if let Some(h) = record.height_cm {
        parts.push(format!("{:.1} cm", h));
    }
    if let Some(w) = record.weight_kg {
        parts.push(format!("{:.1} kg", w));
    }
    if let Some(waist) = record.waist_cm {
        parts.push(format!("waist {:.1} cm", waist));
    }

    let mut line = format!(
        "{:>4}  {}  {}",
        record.id,
        record.recorded_at.format(TIMESTAMP_FORMAT),
        parts.join(", ")
    );
    if !record.notes.is_empty() {
        line.push_str(&format!("  ({})", record.notes));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurements_parse_timestamp() {
        let m = Measurements {
            systolic: Some(120),
            diastolic: Some(80),
            at: Some("2024-01-05 07:30".to_string()),
            ..Default::default()
        };
        let record = m.into_new_record().unwrap();
        assert_eq!(
            record.recorded_at.unwrap().format(TIMESTAMP_FORMAT).to_string(),
            "2024-01-05 07:30"
        );

        let bad = Measurements {
            at: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(bad.into_new_record().is_err());
    }

    #[test]
    fn test_describe_formats_measurements() {
        let record = NewRecord {
            systolic: Some(118),
            diastolic: Some(76),
            heart_rate: Some(64),
            weight_kg: Some(70.25),
            notes: "morning".to_string(),
            ..Default::default()
        }
        .into_record(
            3,
            1,
            NaiveDateTime::parse_from_str("2024-01-05 07:30", TIMESTAMP_FORMAT).unwrap(),
            chrono::Utc::now(),
        );

        let line = describe(&record);
        assert!(line.contains("BP 118/76"));
        assert!(line.contains("HR 64"));
        assert!(line.contains("70.2 kg") || line.contains("70.3 kg"));
        assert!(line.ends_with("(morning)"));
    }
}
