//! Input checks that run before the store is touched.

use crate::config::RegistrationConfig;
use crate::errors::Error;

/// Registration input after validation and sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRegistration {
    pub username: String,
    pub password: String,
    /// `None` when the caller omitted the email or sent a blank one
    pub email: Option<String>,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidInput { message: message.into() }
}

/// Trim and cap at `max_chars` characters.
pub fn sanitize(value: &str, max_chars: usize) -> String {
    value.trim().chars().take(max_chars).collect()
}

pub fn is_valid_username(username: &str, min: usize, max: usize) -> bool {
    let len = username.chars().count();
    (min..=max).contains(&len) && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `local@domain.tld` with no whitespace and a single `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn validate(username: &str, password: &str, email: Option<&str>, config: &RegistrationConfig) -> Result<ValidatedRegistration, Error> {
    if !config.enabled {
        return Err(invalid("Registration is currently disabled"));
    }

    if username.is_empty() || password.is_empty() {
        return Err(invalid("Username and password are required"));
    }

    let policy = &config.username;
    if !is_valid_username(username, policy.min_length, policy.max_length) {
        return Err(invalid(format!(
            "Username must be {}-{} characters of letters, digits and underscores",
            policy.min_length, policy.max_length
        )));
    }

    let password_len = password.chars().count();
    if password_len < config.password.min_length {
        return Err(invalid(format!(
            "Password must be at least {} characters",
            config.password.min_length
        )));
    }
    if password_len > config.password.max_length {
        return Err(invalid(format!(
            "Password must be at most {} characters",
            config.password.max_length
        )));
    }

    let email = email.map(str::trim).filter(|e| !e.is_empty());
    if let Some(email) = email {
        if email.chars().count() > config.email_max_length || !is_valid_email(email) {
            return Err(invalid("Email address is not valid"));
        }
    }

    Ok(ValidatedRegistration {
        username: sanitize(username, policy.max_length),
        password: password.to_string(),
        email: email.map(|e| sanitize(e, config.email_max_length)),
    })
}
