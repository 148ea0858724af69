//! Checks applied to user supplied text before anything touches the database.

use thiserror::Error;
use validator::ValidateEmail;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} cannot exceed {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("email address is not valid")]
    InvalidEmail,
}

/// Rejects blank text and text longer than `max` characters.
///
/// The value is stored as given; trimming only decides whether it is blank.
pub fn required_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn username(value: &str) -> Result<(), ValidationError> {
    required_text("username", value, USERNAME_MAX)?;
    if value.chars().count() < USERNAME_MIN {
        return Err(ValidationError::TooShort {
            field: "username",
            min: USERNAME_MIN,
        });
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), ValidationError> {
    required_text("email", value, EMAIL_MAX)?;

    if !value.validate_email() {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}
