// libs/conversation-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError};
use patient_cell::models::{Patient, PatientError};

// ==============================================================================
// TRANSCRIPT
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == ChatRole::Assistant
    }
}

/// Snapshot the caller holds between turns. The router never stores it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationContext {
    pub authenticated: bool,
    pub verified: bool,
    pub has_appointments: bool,
    pub has_family_members: bool,
    pub is_rescheduling: bool,
    pub has_patient_profile: bool,
    pub verified_patient_id: Option<Uuid>,
    pub patient_name: Option<String>,
}

impl ConversationContext {
    /// The verified patient, when the caller holds one.
    pub fn verified_patient(&self) -> Option<Uuid> {
        if self.verified {
            self.verified_patient_id
        } else {
            None
        }
    }
}

// ==============================================================================
// ROUTER OUTPUT
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ManageAction {
    Reschedule,
    Cancel,
}

impl ManageAction {
    pub fn verb(&self) -> &'static str {
        match self {
            ManageAction::Reschedule => "reschedule",
            ManageAction::Cancel => "cancel",
        }
    }
}

/// Which structured form the presentation layer should show next.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "form", rename_all = "kebab-case")]
pub enum UiAction {
    None,
    Registration,
    Scheduler { emergency: bool },
    Manager { appointment: Box<Appointment>, action: ManageAction },
    FamilyRegistration,
    FamilyScheduler,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterOutput {
    pub bot_message: String,
    pub ui_action: UiAction,
    /// Set only on the turn that verified the user.
    pub verified_patient: Option<Patient>,
}

impl RouterOutput {
    pub fn reply(message: impl Into<String>) -> Self {
        Self::with_action(message, UiAction::None)
    }

    pub fn with_action(message: impl Into<String>, ui_action: UiAction) -> Self {
        Self {
            bot_message: message.into(),
            ui_action,
            verified_patient: None,
        }
    }
}

/// Result of intent classification; exactly one per user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    AddFamilyMembers,
    Register,
    VerifyIdentity,
    VerificationRequired { family: bool },
    FamilyScheduling,
    ManageAppointment(ManageAction),
    Schedule { emergency: bool },
    RescheduleToTime,
    GeneralInquiry(InquiryTopic),
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryTopic {
    SelfPay,
    Insurance,
    Payment,
    Hours,
    Location,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleMessageRequest {
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub context: ConversationContext,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandleMessageResponse {
    pub messages: Vec<ChatMessage>,
    pub ui_action: UiAction,
    pub verified_patient: Option<Patient>,
}

/// A structured form the presentation layer just finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormCompletion {
    AppointmentScheduled { emergency: bool },
    FamilyAppointmentsScheduled,
    AppointmentManaged,
    RegistrationComplete,
    FamilyRegistrationComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteFormRequest {
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub completion: FormCompletion,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum FallbackError {
    #[error("Conversational fallback not configured")]
    NotConfigured,

    #[error("Fallback API error: {message}")]
    ApiError { message: String },

    #[error("Fallback returned no text")]
    EmptyResponse,
}

impl From<reqwest::Error> for FallbackError {
    fn from(err: reqwest::Error) -> Self {
        FallbackError::ApiError {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversationError {
    #[error(transparent)]
    Patient(#[from] PatientError),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}
