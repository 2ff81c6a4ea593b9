use crate::modules::jobs::{PRIORITY_MAX, PRIORITY_MIN};
use crate::shared::errors::AppError;

pub struct Validator;

impl Validator {
    pub fn validate_priority(priority: i32) -> Result<(), AppError> {
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
            return Err(AppError::ValidationError(format!(
                "Priority must be between {} and {}, got {}",
                PRIORITY_MIN, PRIORITY_MAX,
                priority
            )));
        }
        Ok(())
    }

    pub fn validate_max_retries(max_retries: i32) -> Result<(), AppError> {
        if max_retries < 0 {
            return Err(AppError::ValidationError(
                "max_retries cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_manga_id(manga_id: &str) -> Result<(), AppError> {
        if manga_id.trim().is_empty() {
            return Err(AppError::ValidationError(
                "manga_id is required".to_string(),
            ));
        }
        if manga_id.len() > 255 {
            return Err(AppError::ValidationError(
                "manga_id too long (max 255 characters)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_limit(limit: i64) -> Result<(), AppError> {
        if limit < 1 {
            return Err(AppError::ValidationError(
                "limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_retention_days(days: i64) -> Result<(), AppError> {
        if days < 0 {
            return Err(AppError::ValidationError(
                "older_than_days cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}
