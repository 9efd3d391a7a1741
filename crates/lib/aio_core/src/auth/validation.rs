//! Shape validation for login and registration payloads.
//!
//! Each check contributes one field message; all messages are joined into a
//! single string so the client can show them together.

use super::AuthError;

/// Minimum display-name length (characters).
pub const MIN_NAME_LEN: usize = 3;

/// Minimum password length (characters).
pub const MIN_PASSWORD_LEN: usize = 8;

/// Separator between field messages.
const MESSAGE_SEPARATOR: &str = "; ";

/// Trim and lower-case an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal structural email check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Validate a login payload.
pub fn validate_login(email: &str, password: &str) -> Result<(), AuthError> {
    let mut errors = Vec::new();
    if email.trim().is_empty() {
        errors.push("Email wajib diisi.");
    } else if !is_valid_email(email.trim()) {
        errors.push("Format email tidak valid.");
    }
    if password.is_empty() {
        errors.push("Kata sandi wajib diisi.");
    }
    finish(errors)
}

/// Validate a registration payload.
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
    repeat_password: &str,
) -> Result<(), AuthError> {
    let mut errors = Vec::new();
    if name.trim().chars().count() < MIN_NAME_LEN {
        errors.push("Nama minimal 3 karakter.");
    }
    if !is_valid_email(email.trim()) {
        errors.push("Format email tidak valid.");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push("Kata sandi minimal 8 karakter.");
    }
    if password != repeat_password {
        errors.push("Konfirmasi kata sandi tidak cocok.");
    }
    finish(errors)
}

fn finish(errors: Vec<&str>) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::ValidationError(errors.join(MESSAGE_SEPARATOR)))
    }
}
