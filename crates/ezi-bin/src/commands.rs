//! Session commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use ezi_auth::{AuthError, SessionManager};
use std::io::{self, Write};

/// Exit code for a command that ran but whose operation did not succeed.
const EXIT_FAILURE: i32 = 1;

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

/// Login with email and password.
pub async fn login(
    manager: &SessionManager,
    email: Option<String>,
    format: &OutputFormat,
) -> Result<i32> {
    if manager.is_authenticated() {
        let email = manager
            .snapshot()
            .user
            .map(|u| u.email)
            .unwrap_or_else(|| "unknown".to_string());
        output::print_success(&format!("Already logged in as {}", email), format);
        return Ok(0);
    }

    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(EXIT_FAILURE);
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(EXIT_FAILURE);
    }

    match manager.login(&email, &password).await {
        Ok(()) => {
            output::print_success(&format!("Logged in as {}", email), format);
            Ok(0)
        }
        Err(e) => {
            output::print_error(&format!("Login failed: {}", e), format);
            Ok(EXIT_FAILURE)
        }
    }
}

/// Create an account and start a session.
pub async fn signup(
    manager: &SessionManager,
    name: Option<String>,
    email: Option<String>,
    format: &OutputFormat,
) -> Result<i32> {
    if manager.is_authenticated() {
        output::print_error("Already logged in; log out first", format);
        return Ok(EXIT_FAILURE);
    }

    let name = match name {
        Some(name) => name,
        None => prompt("Name")?,
    };
    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let password = rpassword::prompt_password("Password: ")?;
    let confirm_password = rpassword::prompt_password("Confirm password: ")?;

    match manager
        .signup(&name, &email, &password, &confirm_password)
        .await
    {
        Ok(()) => {
            output::print_success(&format!("Account created, logged in as {}", email), format);
            Ok(0)
        }
        Err(e) => {
            output::print_error(&format!("Signup failed: {}", e), format);
            Ok(EXIT_FAILURE)
        }
    }
}

/// Logout and clear the persisted session.
pub async fn logout(manager: &SessionManager, format: &OutputFormat) -> Result<i32> {
    if !manager.is_authenticated() {
        output::print_success("Not logged in", format);
        return Ok(0);
    }

    manager.logout().await?;
    output::print_success("Logged out", format);
    Ok(0)
}

/// Show the current session.
pub fn status(manager: &SessionManager, format: &OutputFormat) -> Result<i32> {
    let snapshot = manager.snapshot();

    match format {
        OutputFormat::Text => {
            if snapshot.is_authenticated {
                println!("Auth:     logged in");
                if let Some(user) = &snapshot.user {
                    output::print_row("User ID", &user.id);
                    output::print_row("Email", &user.email);
                    output::print_row(
                        "Name",
                        &format!("{} {}", user.first_name, user.last_name),
                    );
                }
                if let Some(last_login) = &snapshot.last_login {
                    output::print_row("Last login", &last_login.to_rfc3339());
                }
            } else {
                println!("Auth:     not logged in");
                if let Some(error) = &snapshot.error {
                    output::print_row("Last error", error);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(if snapshot.is_authenticated { 0 } else { EXIT_FAILURE })
}

/// Check the session against the backend, refreshing the tokens if needed.
pub async fn validate(manager: &SessionManager, format: &OutputFormat) -> Result<i32> {
    match manager.ensure_valid_session().await {
        Ok(()) => {
            output::print_success("Session is valid", format);
            Ok(0)
        }
        Err(AuthError::NoSession) => {
            output::print_error("Not logged in", format);
            Ok(EXIT_FAILURE)
        }
        Err(AuthError::SessionExpired) => {
            output::print_error("Session expired, please log in again", format);
            Ok(EXIT_FAILURE)
        }
        Err(e) => {
            output::print_error(&format!("Validation failed: {}", e), format);
            Ok(EXIT_FAILURE)
        }
    }
}
