//! Input validation at the storage boundary
//!
//! The facade runs these before dispatching to a driver, so both drivers see
//! the same accepted inputs.

use crate::{Result, StoreError};
use vitals_types::{NewRecord, NewUser};

/// Maximum username length (matches the relational `VARCHAR(50)` column)
pub const MAX_USERNAME_LEN: usize = 50;

/// Maximum setting key length (matches the relational primary key column)
pub const MAX_SETTING_KEY_LEN: usize = 50;

/// Maximum notes length in characters
pub const MAX_NOTES_LEN: usize = 1000;

pub fn username(username: &str) -> Result<()> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation("username cannot be empty"));
    }
    if trimmed.chars().count() > MAX_USERNAME_LEN {
        return Err(StoreError::validation(format!(
            "username exceeds {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(StoreError::validation(
            "username cannot contain whitespace or control characters",
        ));
    }
    Ok(())
}

pub fn password_hash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(StoreError::validation("credential hash cannot be empty"));
    }
    Ok(())
}

pub fn new_user(user: &NewUser) -> Result<()> {
    username(&user.username)?;
    password_hash(&user.password_hash)
}

pub fn setting_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::validation("setting key cannot be empty"));
    }
    if key.len() > MAX_SETTING_KEY_LEN {
        return Err(StoreError::validation(format!(
            "setting key exceeds {} characters",
            MAX_SETTING_KEY_LEN
        )));
    }
    // ':' is reserved for driver-internal keys such as sequence counters
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(StoreError::validation(
            "setting key must contain only ASCII letters, digits, '_', '-' or '.'",
        ));
    }
    Ok(())
}

pub fn new_record(record: &NewRecord) -> Result<()> {
    if !record.has_blood_pressure() && !record.has_body_measurements() {
        return Err(StoreError::validation(
            "record needs blood pressure or height/weight",
        ));
    }

    let integers = [
        ("systolic", record.systolic),
        ("diastolic", record.diastolic),
        ("heart_rate", record.heart_rate),
    ];
    for (name, value) in integers {
        if matches!(value, Some(v) if v <= 0) {
            return Err(StoreError::validation(format!("{} must be positive", name)));
        }
    }

    let floats = [
        ("height_cm", record.height_cm),
        ("weight_kg", record.weight_kg),
        ("waist_cm", record.waist_cm),
    ];
    for (name, value) in floats {
        if matches!(value, Some(v) if !v.is_finite() || v <= 0.0) {
            return Err(StoreError::validation(format!(
                "{} must be a positive number",
                name
            )));
        }
    }

    if record.notes.chars().count() > MAX_NOTES_LEN {
        return Err(StoreError::validation(format!(
            "notes exceed {} characters",
            MAX_NOTES_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_types::Role;

    #[test]
    fn test_username_rules() {
        assert!(username("alice").is_ok());
        assert!(username("").is_err());
        assert!(username("   ").is_err());
        assert!(username("al ice").is_err());
        assert!(username(&"x".repeat(51)).is_err());
        assert!(new_user(&NewUser::new("bob", "", Role::User)).is_err());
    }

    #[test]
    fn test_setting_key_rules() {
        assert!(setting_key("idle_timeout").is_ok());
        assert!(setting_key("ui.theme-v2").is_ok());
        assert!(setting_key("").is_err());
        assert!(setting_key("seq:users").is_err());
        assert!(setting_key(&"k".repeat(51)).is_err());
    }

    #[test]
    fn test_record_rules() {
        assert!(new_record(&NewRecord::default()).is_err());

        let ok = NewRecord {
            systolic: Some(128),
            diastolic: Some(82),
            heart_rate: Some(64),
            ..Default::default()
        };
        assert!(new_record(&ok).is_ok());

        let negative = NewRecord {
            weight_kg: Some(-3.0),
            ..Default::default()
        };
        assert!(matches!(
            new_record(&negative),
            Err(StoreError::ValidationFailed(_))
        ));

        let nan = NewRecord {
            height_cm: Some(f64::NAN),
            ..Default::default()
        };
        assert!(new_record(&nan).is_err());

        let chatty = NewRecord {
            systolic: Some(120),
            notes: "n".repeat(MAX_NOTES_LEN + 1),
            ..Default::default()
        };
        assert!(new_record(&chatty).is_err());
    }
}
