use lazy_static::lazy_static;
use regex::Regex;

use crate::{auth::password::MIN_PASSWORD_LEN, error::AppError};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.\-]{3,50}$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_email(email: &str) -> Result<(), AppError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AppError::bad_request("Invalid email"))
    }
}

pub fn check_username(username: &str) -> Result<(), AppError> {
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(AppError::bad_request(
            "Username must be 3-50 characters of letters, digits, '.', '_' or '-'",
        ))
    }
}

pub fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request("Password too short"));
    }
    Ok(())
}
