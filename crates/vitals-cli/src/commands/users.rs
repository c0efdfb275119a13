//! User account commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use vitals_store::{AuthService, Role, Storage, User};

use super::{confirm, password_or_prompt};

pub(crate) async fn resolve(storage: &Storage, username: &str) -> Result<User> {
    let credentials = storage
        .get_user_by_username(username)
        .await
        .with_context(|| format!("User '{}' not found", username))?;
    Ok(credentials.user)
}

pub async fn list(storage: &Storage) -> Result<()> {
    let users = storage.list_users().await?;

    println!("{}", "Users".blue().bold());
    println!();

    if users.is_empty() {
        println!("   (No users)");
        return Ok(());
    }

    for user in &users {
        let role = if user.is_admin() {
            user.role.to_string().yellow()
        } else {
            user.role.to_string().normal()
        };
        println!(
            "   {:>4}  {:<24} {:<6} {}",
            user.id,
            user.username.cyan(),
            role,
            user.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    Ok(())
}

pub async fn add(
    storage: Arc<Storage>,
    username: &str,
    admin: bool,
    password: Option<String>,
) -> Result<()> {
    let password = password_or_prompt(password, true)?;
    let role = if admin { Role::Admin } else { Role::User };

    let user = AuthService::new(storage)
        .register(username, &password, role)
        .await?;

    println!(
        "{}",
        format!("Created {} '{}' (id {})", user.role, user.username, user.id).green()
    );
    Ok(())
}

pub async fn delete(storage: &Storage, username: &str, yes: bool) -> Result<()> {
    let user = resolve(storage, username).await?;

    if !confirm(
        yes,
        format!("Delete '{}' and all of their records?", user.username),
    )? {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    }

    storage.delete_user(user.id).await?;
    println!("{}", format!("Deleted '{}'", user.username).green());
    Ok(())
}

pub async fn passwd(storage: Arc<Storage>, username: &str, password: Option<String>) -> Result<()> {
    let user = resolve(&storage, username).await?;
    let password = password_or_prompt(password, true)?;

    AuthService::new(storage)
        .change_password(user.id, &password)
        .await?;

    println!("{}", format!("Password changed for '{}'", user.username).green());
    Ok(())
}

pub async fn set_role(storage: &Storage, username: &str, role: &str) -> Result<()> {
    let role: Role = role.parse()?;
    let user = resolve(storage, username).await?;

    storage.update_user_role(user.id, role).await?;
    println!("{}", format!("'{}' is now {}", user.username, role).green());
    Ok(())
}

pub async fn login(storage: Arc<Storage>, username: &str, password: Option<String>) -> Result<()> {
    let password = password_or_prompt(password, false)?;
    let user = AuthService::new(storage).login(username, &password).await?;

    println!(
        "{}",
        format!("Authenticated as '{}' ({})", user.username, user.role).green()
    );
    Ok(())
}
