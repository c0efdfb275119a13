//! Command implementations

pub mod backend;
pub mod backup;
pub mod records;
pub mod settings;
pub mod users;

use anyhow::Result;

/// Use `given` or prompt for a password
pub(crate) fn password_or_prompt(given: Option<String>, confirm: bool) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }

    let mut prompt = dialoguer::Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(prompt.interact()?)
}

/// Ask for a yes/no confirmation unless `yes` was passed
pub(crate) fn confirm(yes: bool, prompt: String) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
