// libs/conversation-cell/src/services/replies.rs
//! Bot message texts. Several double as prompts that later turns look for in the transcript.

use chrono::{DateTime, FixedOffset, Utc};

use appointment_cell::models::Appointment;
use patient_cell::models::FamilyMember;

pub const GREETING: &str = "Hello! I'm your dental assistant. How can I help you today?";

pub const VERIFICATION_REQUEST: &str = "To protect your privacy, I'll need to verify your identity first. Please provide your information in this format:\n[Full Name], [10-digit phone], [YYYY-MM-DD]\n\nFor example: John Smith, 1234567890, 1990-01-01";

pub const FAMILY_VERIFICATION_REQUEST: &str = "I'll help you schedule appointments for your family. First, I'll need to verify your identity. Please provide your information in this format:\n[Full Name], [10-digit phone], [YYYY-MM-DD]\n\nFor example: John Smith, 1234567890, 1990-01-01";

pub const REGISTRATION_FORM: &str =
    "I'll help you register as a new patient. Please complete the registration form that has appeared.";

pub const REGISTRATION_BEFORE_SCHEDULING: &str = "Before we schedule an appointment, I'll need to collect some information from you. Please complete the registration form that has appeared.";

pub const ADD_FAMILY_MEMBERS_FORM: &str =
    "I'll help you add your family members. Please use the form that has appeared to add your family members.";

pub const NO_FAMILY_MEMBERS_FORM: &str = "I notice you don't have any family members registered yet. Please use the form that has appeared to add your family members.";

pub const FAMILY_SCHEDULER_FORM: &str =
    "I've opened the family scheduling form where you can select appointments for your family members.";

pub const NO_UPCOMING_APPOINTMENTS: &str =
    "I don't see any upcoming appointments scheduled for you. Would you like to schedule a new appointment?";

pub const VERIFIED_SCHEDULER_FORM: &str =
    "Thank you for verifying your information. I've opened the scheduling form for you to book your appointment.";

pub const VERIFIED_FAMILY_SCHEDULER_FORM: &str = "Thank you for verifying your information. I've opened the family scheduling form where you can select appointments for your family members.";

pub const NO_SLOTS_ON_DAY: &str =
    "I apologize, but there are no available slots on that date. Would you like to try a different day?";

pub const RESCHEDULE_FAILED: &str =
    "I apologize, but I couldn't reschedule your appointment. Would you like to try a different time?";

pub const GENERIC_ERROR: &str = "I apologize, but I encountered an error. Please try again.";

pub const FALLBACK_UNAVAILABLE: &str =
    "I apologize, but I'm having trouble processing your request right now. Please try again in a moment.";

pub const FAMILY_APPOINTMENTS_SCHEDULED: &str =
    "Great! I've successfully scheduled appointments for your family members. Is there anything else I can help you with?";

pub const APPOINTMENT_MANAGED: &str =
    "Your appointment has been updated successfully. Is there anything else I can help you with?";

pub const REGISTERED_FROM_SCHEDULING: &str =
    "Thank you for registering! I've opened the scheduling form for you to book your appointment.";

pub const REGISTERED: &str = "Thank you for registering! Now I can help you schedule an appointment or answer any questions you have about our services.";

pub const FAMILY_REGISTERED: &str = "Thank you for adding your family members! I've opened the family scheduling form where you can schedule appointments for them.";

const ANYTHING_ELSE: &str = "Is there anything else I can help you with?";

// Prompts looked up in earlier assistant turns.
pub const PROMPT_ADD_FAMILY_FIRST: &str = "Would you like to add family members first";
pub const PROMPT_REGISTER: &str = "like to register";
pub const PROMPT_SCHEDULE: &str = "like to schedule";
pub const PROMPT_SCHEDULE_ONE: &str = "Would you like to schedule one?";
pub const PROMPT_SCHEDULE_NEW: &str = "Would you like to schedule a new appointment?";
pub const PROMPT_FAMILY_SCHEDULING: &str = "schedule appointments for your family";
pub const PROMPT_RESCHEDULE: &str = "would you like to reschedule";
pub const MARK_REGISTRATION_FROM_SCHEDULING: &str = "Before we schedule an appointment";
pub const MARK_FAMILY_VISIT: [&str; 2] = ["family visit", "family appointment"];

pub fn scheduler_form(emergency: bool) -> String {
    format!(
        "I'll help you schedule an appointment{}. Please use the scheduling form that has appeared.",
        if emergency { " - I understand this is an emergency" } else { "" }
    )
}

pub fn manager_form(action: &str) -> String {
    format!("I've found your latest scheduled appointment. You can {} it using the form that has appeared.", action)
}

pub fn appointment_scheduled(emergency: bool) -> String {
    if emergency {
        format!(
            "Great! Your appointment has been scheduled successfully. The dental office staff have been notified about the nature of your emergency and will look into it immediately. {}",
            ANYTHING_ELSE
        )
    } else {
        format!("Great! Your appointment has been scheduled successfully. {}", ANYTHING_ELSE)
    }
}

fn local(time: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    time.with_timezone(&offset)
}

pub fn clock_time(time: DateTime<Utc>, offset: FixedOffset) -> String {
    local(time, offset).format("%-I:%M %p").to_string()
}

pub fn latest_appointment_summary(name: &str, appointment: &Appointment, offset: FixedOffset) -> String {
    let start = local(appointment.start_time, offset);

    format!(
        "Thank you for verifying your information, {}. I can see your upcoming appointment:\n\n\
         Type: {}\nDate: {}\nTime: {}\n\n\
         Would you like to reschedule or cancel this appointment?",
        name,
        appointment.type_name(),
        start.format("%B %-d, %Y"),
        start.format("%-I:%M %p"),
    )
}

pub fn no_appointments_summary(name: &str) -> String {
    format!(
        "Thank you for verifying your information, {}. I don't see any upcoming appointments scheduled for you. {}",
        name, PROMPT_SCHEDULE_ONE
    )
}

pub fn family_summary(name: &str, members: &[FamilyMember]) -> String {
    if members.is_empty() {
        return format!(
            "Thank you for verifying your information, {}. I notice you don't have any family members registered yet. {}?",
            name, PROMPT_ADD_FAMILY_FIRST
        );
    }

    let list = members
        .iter()
        .map(|member| format!("{} ({})", member.patient.full_name, member.relationship))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Thank you for verifying your information, {}. I can see you have the following family members registered: {}. \
         Would you like to add more family members or proceed with scheduling appointments for your family?",
        name, list
    )
}

pub fn rescheduled(time: &str, exact_match: bool) -> String {
    if exact_match {
        format!("I've successfully rescheduled your appointment to {}. {}", time, ANYTHING_ELSE)
    } else {
        format!(
            "The requested time wasn't available, but I've rescheduled your appointment to the nearest available time at {}. {}",
            time, ANYTHING_ELSE
        )
    }
}
