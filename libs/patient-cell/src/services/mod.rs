pub mod patient;
pub mod verification;

pub use patient::{normalize_phone, PatientService};
pub use verification::{
    looks_like_verification, parse_verification_utterance, IdentityVerifier, VerificationUtterance,
};
