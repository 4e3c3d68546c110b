// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};
use std::fmt;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

/// A fixed-size bookable window. Slots of one business day are contiguous and never overlap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_available: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AvailableSlot {
    /// True when `next` begins exactly where this slot ends.
    pub fn is_followed_by(&self, next: &AvailableSlot) -> bool {
        self.end_time == next.start_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentType {
    pub id: Uuid,
    pub name: String,
    /// Postgres interval rendered as text, e.g. "30 minutes".
    #[serde(default)]
    pub duration: Option<String>,
}

impl AppointmentType {
    pub fn is_emergency(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case("emergency")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// The patient embedded by `select=*,patients(id,full_name,is_primary)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentPatient {
    pub id: Uuid,
    pub full_name: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub emergency_description: Option<String>,
    pub family_group_id: Option<Uuid>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "appointment_types", default, skip_serializing_if = "Option::is_none")]
    pub appointment_type: Option<AppointmentType>,
    #[serde(rename = "patients", default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<AppointmentPatient>,
}

impl Appointment {
    pub fn type_name(&self) -> &str {
        self.appointment_type
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or("appointment")
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub appointment_type_id: Uuid,
    pub emergency_description: Option<String>,
}

/// Either an explicit slot or a free-text clock time such as "3pm".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_slot_id: Option<Uuid>,
    pub requested_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsecutiveSlotsQuery {
    pub date: NaiveDate,
    pub count: usize,
}

/// First back-to-back run plus the first slot of every valid run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsecutiveSlots {
    pub group: Vec<AvailableSlot>,
    pub valid_start_slots: Vec<AvailableSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyBookingEntry {
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub appointment_type_id: Uuid,
    pub emergency_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyBookingRequest {
    pub entries: Vec<FamilyBookingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyBookingPlanRequest {
    pub date: NaiveDate,
    pub patient_ids: Vec<Uuid>,
    pub start_slot_id: Uuid,
    pub appointment_type_id: Uuid,
    pub emergency_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyBooking {
    pub family_group_id: Uuid,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleToTimeResult {
    pub appointment: Appointment,
    pub slot: AvailableSlot,
    /// False when the nearest slot was taken instead of the requested time.
    pub exact_match: bool,
}

// ==============================================================================
// DATASTORE PROCEDURE RESULTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotRpcStatus {
    Booked,
    Rescheduled,
    Cancelled,
    AlreadyCancelled,
    SlotUnavailable,
    NotFound,
}

/// `{"status": …, "appointment_id": …}` as returned by the booking procedures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRpcResponse {
    pub status: SlotRpcStatus,
    pub appointment_id: Option<Uuid>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("That time is no longer available, please choose another.")]
    SlotUnavailable,

    #[error("There are no available times on {0}")]
    NoAvailableSlots(NaiveDate),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Family booking failed for patient {patient_id}: {reason}")]
    FamilyBookingFailed { patient_id: Uuid, reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    /// The message shown to the end user; transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppointmentError::ValidationError(msg) => msg.clone(),
            AppointmentError::DatabaseError(_) => {
                "I'm sorry, something went wrong on our side. Please try again in a moment.".to_string()
            }
            AppointmentError::FamilyBookingFailed { .. } => {
                "I couldn't book all of the family appointments, so none of them were kept. Please choose another time.".to_string()
            }
            other => other.to_string(),
        }
    }
}
