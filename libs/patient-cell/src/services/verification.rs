use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Patient, PatientError, VerificationFailure, VerificationOutcome};
use crate::services::patient::{normalize_phone, PatientService};

/// "Full Name, 10-digit phone, YYYY-MM-DD" anywhere in a message.
static VERIFICATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^,]+),\s*(\d{10}),\s*(\d{4}-\d{2}-\d{2})").expect("valid verification regex")
});

pub const VERIFICATION_FORMAT_HINT: &str =
    "Please provide your information in the correct format: [Full Name], [10-digit phone], [YYYY-MM-DD]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationUtterance {
    pub full_name: String,
    pub phone_digits: String,
    pub date_of_birth: NaiveDate,
}

pub fn looks_like_verification(text: &str) -> bool {
    VERIFICATION_PATTERN.is_match(text)
}

/// Extracts identity fields; an impossible calendar date is a validation error.
pub fn parse_verification_utterance(text: &str) -> Result<VerificationUtterance, PatientError> {
    let captures = VERIFICATION_PATTERN
        .captures(text)
        .ok_or_else(|| PatientError::ValidationError(VERIFICATION_FORMAT_HINT.to_string()))?;

    let date_of_birth = NaiveDate::parse_from_str(&captures[3], "%Y-%m-%d")
        .map_err(|_| PatientError::ValidationError(VERIFICATION_FORMAT_HINT.to_string()))?;

    Ok(VerificationUtterance {
        full_name: captures[1].trim().to_string(),
        phone_digits: captures[2].to_string(),
        date_of_birth,
    })
}

/// Case-insensitive, surrounding whitespace ignored.
fn names_match(provided: &str, stored: &str) -> bool {
    provided.trim().to_lowercase() == stored.trim().to_lowercase()
}

/// Proves identity against stored primary patients. Read-only; safe to retry.
pub struct IdentityVerifier {
    patients: PatientService,
}

impl IdentityVerifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            patients: PatientService::new(config),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            patients: PatientService::with_client(supabase),
        }
    }

    pub async fn verify(
        &self,
        full_name: &str,
        phone: &str,
        date_of_birth: NaiveDate,
        auth_token: &str,
    ) -> Result<VerificationOutcome, PatientError> {
        let phone_number = normalize_phone(phone)?;
        debug!("Verifying identity for date of birth {}", date_of_birth);

        let patient: Patient = match self
            .patients
            .find_primary_by_identity(&phone_number, date_of_birth, auth_token)
            .await?
        {
            Some(patient) => patient,
            None => {
                info!("Identity verification failed: no matching primary patient");
                return Ok(VerificationOutcome::Unverified(VerificationFailure::NotFound));
            }
        };

        if !names_match(full_name, &patient.full_name) {
            info!("Identity verification failed: name mismatch for patient {}", patient.id);
            return Ok(VerificationOutcome::Unverified(VerificationFailure::NameMismatch));
        }

        info!("Patient {} verified", patient.id);
        Ok(VerificationOutcome::Verified(patient))
    }

    pub async fn verify_utterance(
        &self,
        text: &str,
        auth_token: &str,
    ) -> Result<VerificationOutcome, PatientError> {
        let utterance = parse_verification_utterance(text)?;
        self.verify(
            &utterance.full_name,
            &utterance.phone_digits,
            utterance.date_of_birth,
            auth_token,
        ).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_utterance() {
        let parsed = parse_verification_utterance("John Smith, 1234567890, 1990-01-01").unwrap();

        assert_eq!(parsed.full_name, "John Smith");
        assert_eq!(parsed.phone_digits, "1234567890");
        assert_eq!(parsed.date_of_birth, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
    }

    #[test]
    fn test_parse_tolerates_missing_spaces() {
        let parsed = parse_verification_utterance("  jane doe ,5551234567,1985-12-31").unwrap();
        assert_eq!(parsed.full_name, "jane doe");
    }

    #[test]
    fn test_rejects_malformed_utterances() {
        assert!(!looks_like_verification("John Smith, 12345, 1990-01-01"));
        assert!(!looks_like_verification("I need an appointment"));
        assert!(parse_verification_utterance("John Smith, 123-456-7890, 1990-01-01").is_err());

        // Matches the shape but is not a real date.
        assert!(looks_like_verification("John Smith, 1234567890, 1990-13-45"));
        assert!(matches!(
            parse_verification_utterance("John Smith, 1234567890, 1990-13-45"),
            Err(PatientError::ValidationError(_))
        ));
    }

    #[test]
    fn test_name_comparison() {
        assert!(names_match("  JOHN smith ", "John Smith"));
        assert!(!names_match("Jon Smith", "John Smith"));
    }
}
