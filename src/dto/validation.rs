//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::services::settlement::{WINNING_NUMBER_MAX, WINNING_NUMBER_MIN};

/// Validates that a picked number falls within the drawable range [1,9].
///
/// # Examples
///
/// ```ignore
/// validate_chosen_number(&5)  // Ok
/// validate_chosen_number(&0)  // Err - below range
/// validate_chosen_number(&10) // Err - above range
/// ```
pub fn validate_chosen_number(number: &u8) -> Result<(), ValidationError> {
    if !(WINNING_NUMBER_MIN..=WINNING_NUMBER_MAX).contains(number) {
        let mut err = ValidationError::new("chosen_number_range");
        err.message = Some(
            format!(
                "Chosen number must be between {WINNING_NUMBER_MIN} and {WINNING_NUMBER_MAX} (got {number})"
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_chosen_number_valid() {
        assert!(validate_chosen_number(&1).is_ok());
        assert!(validate_chosen_number(&5).is_ok());
        assert!(validate_chosen_number(&9).is_ok());
    }

    #[test]
    fn test_validate_chosen_number_out_of_range() {
        assert!(validate_chosen_number(&0).is_err());
        assert!(validate_chosen_number(&10).is_err());
        assert!(validate_chosen_number(&255).is_err());
    }
}
