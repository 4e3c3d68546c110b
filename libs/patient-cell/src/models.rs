use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    /// Stored in display form, e.g. "(123) 456-7890".
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub insurance_name: Option<String>,
    pub is_primary: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Spouse,
    Child,
    Parent,
    Sibling,
    Other,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relationship::Spouse => write!(f, "spouse"),
            Relationship::Child => write!(f, "child"),
            Relationship::Parent => write!(f, "parent"),
            Relationship::Sibling => write!(f, "sibling"),
            Relationship::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyRelationship {
    pub id: Uuid,
    pub primary_patient_id: Uuid,
    pub family_member_id: Uuid,
    pub relationship: Relationship,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A non-primary patient together with how they relate to the account holder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyMember {
    #[serde(flatten)]
    pub patient: Patient,
    pub relationship: Relationship,
}

/// Row shape of `family_relationships?select=id,relationship,family_member:family_member_id(*)`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FamilyRelationshipRow {
    pub relationship: Relationship,
    pub family_member: Patient,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPatientRequest {
    pub full_name: String,
    /// Any formatting; must contain exactly ten digits.
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
    pub insurance_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFamilyMemberRequest {
    pub full_name: String,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyIdentityRequest {
    pub full_name: String,
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Verified(Patient),
    Unverified(VerificationFailure),
}

impl VerificationOutcome {
    pub fn patient(&self) -> Option<&Patient> {
        match self {
            VerificationOutcome::Verified(patient) => Some(patient),
            VerificationOutcome::Unverified(_) => None,
        }
    }
}

/// Internal reason only; callers facing the end user must not reveal which one occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    NotFound,
    NameMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("A patient with this phone number and date of birth is already registered")]
    DuplicatePatient,

    #[error("Unauthorized access to patient data")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
