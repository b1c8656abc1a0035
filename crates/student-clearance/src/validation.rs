//! Input checks applied at the edges before anything reaches the workflow logic.

const MAX_INPUT_LEN: usize = 1000;
const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} is too long")]
    TooLong { field: &'static str },
    #[error("invalid email format")]
    InvalidEmail,
    #[error("{field} must be a non-negative amount")]
    InvalidAmount { field: &'static str },
}

/// Trim, lower-case and shape-check an email address.
///
/// The result is the canonical key used for account lookups and attempt tracking.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let candidate = raw.trim().to_ascii_lowercase();
    if candidate.is_empty() {
        return Err(ValidationError::Empty { field: "email" });
    }
    if candidate.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::TooLong { field: "email" });
    }

    let (local, domain) = candidate
        .split_once('@')
        .ok_or(ValidationError::InvalidEmail)?;

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));

    let domain_ok = match domain.rsplit_once('.') {
        Some((host, tld)) => {
            !host.is_empty()
                && host
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
                && tld.len() >= 2
                && tld.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    };

    if local_ok && domain_ok {
        Ok(candidate)
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_password(raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::Empty { field: "password" });
    }
    if raw.len() > MAX_INPUT_LEN {
        return Err(ValidationError::TooLong { field: "password" });
    }
    Ok(())
}

/// Required free-text form field; returns the trimmed value.
pub fn require_text(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.len() > MAX_INPUT_LEN {
        return Err(ValidationError::TooLong { field });
    }
    Ok(trimmed.to_string())
}

pub fn validate_amount(field: &'static str, amount: f64) -> Result<f64, ValidationError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(ValidationError::InvalidAmount { field })
    }
}
