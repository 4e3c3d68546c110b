// libs/conversation-cell/src/services/intent.rs
//! Keyword classification of the latest user message as an ordered rule list.
//! The first rule that applies decides the intent; later rules are never consulted.

use tracing::debug;

use appointment_cell::services::slots::parse_clock_time;
use patient_cell::services::looks_like_verification;

use crate::models::{ChatMessage, ConversationContext, InquiryTopic, Intent, ManageAction};
use crate::services::{inquiry, replies};

const BOOKING_KEYWORDS: &[&str] = &["schedule", "book", "make", "set up", "yes"];
const RESCHEDULE_KEYWORDS: &[&str] = &["reschedule", "change", "move", "switch", "different time", "another time"];
const CANCEL_KEYWORDS: &[&str] = &["cancel", "remove", "delete"];
const EMERGENCY_KEYWORDS: &[&str] = &["emergency", "urgent", "pain", "severe"];
const APPOINTMENT_KEYWORDS: &[&str] = &["appointment", "booking", "slot", "time", "schedule"];
const NEW_PATIENT_KEYWORDS: &[&str] = &["new patient", "first time", "register", "sign up"];
const FAMILY_KEYWORDS: &[&str] = &[
    "family", "together", "kids", "children", "child", "spouse", "wife", "husband",
    "daughter", "son", "back-to-back", "consecutive",
];

/// Booking words for recognising a family visit in a verification message.
const FAMILY_VISIT_KEYWORDS: &[&str] = &["schedule", "book", "booking", "make", "set up", "appointment", "visit"];

fn contains_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| message.contains(keyword))
}

fn contains_ignore_case(text: &str, phrase: &str) -> bool {
    text.to_lowercase().contains(&phrase.to_lowercase())
}

/// A message asking to bring several family members in.
pub fn is_family_visit_request(message: &str) -> bool {
    let message = message.to_lowercase();
    contains_any(&message, FAMILY_KEYWORDS) && contains_any(&message, FAMILY_VISIT_KEYWORDS)
}

/// True when an assistant turn in `history` contains `phrase`, ignoring case.
pub fn assistant_said(history: &[ChatMessage], phrase: &str) -> bool {
    history
        .iter()
        .any(|message| message.is_assistant() && contains_ignore_case(&message.content, phrase))
}

/// "yes" directly answering one of the bot's questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    AddFamilyMembers,
    Register,
    Schedule,
}

/// Everything the rules look at, extracted once per message.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    confirmation: Option<Confirmation>,
    pub new_patient: bool,
    pub verification: bool,
    pub family: bool,
    pub appointment: bool,
    pub booking: bool,
    pub rescheduling: bool,
    pub cancelling: bool,
    pub emergency: bool,
    pub awaiting_reschedule_time: bool,
    pub clock_time: bool,
    pub inquiry: Option<InquiryTopic>,
}

impl Signals {
    /// `history` ends with the message being classified.
    pub fn extract(history: &[ChatMessage]) -> Self {
        let Some((latest, earlier)) = history.split_last() else {
            return Self::default();
        };
        let message = latest.content.to_lowercase();

        let confirmation = match earlier.last() {
            Some(previous) if previous.is_assistant() && message.trim() == "yes" => {
                if contains_ignore_case(&previous.content, replies::PROMPT_ADD_FAMILY_FIRST) {
                    Some(Confirmation::AddFamilyMembers)
                } else if contains_ignore_case(&previous.content, replies::PROMPT_REGISTER) {
                    Some(Confirmation::Register)
                } else if contains_ignore_case(&previous.content, replies::PROMPT_SCHEDULE) {
                    Some(Confirmation::Schedule)
                } else {
                    None
                }
            }
            _ => None,
        };

        let appointment = contains_any(&message, APPOINTMENT_KEYWORDS);

        Self {
            new_patient: contains_any(&message, NEW_PATIENT_KEYWORDS),
            verification: looks_like_verification(&latest.content),
            family: contains_any(&message, FAMILY_KEYWORDS),
            booking: (contains_any(&message, BOOKING_KEYWORDS) && appointment)
                || confirmation == Some(Confirmation::Schedule),
            rescheduling: contains_any(&message, RESCHEDULE_KEYWORDS) && appointment,
            cancelling: contains_any(&message, CANCEL_KEYWORDS) && appointment,
            emergency: contains_any(&message, EMERGENCY_KEYWORDS),
            awaiting_reschedule_time: assistant_said(earlier, replies::PROMPT_RESCHEDULE),
            clock_time: parse_clock_time(&message).is_some(),
            inquiry: inquiry::topic(&message),
            appointment,
            confirmation,
        }
    }

    fn family_appointment(&self) -> bool {
        self.family && self.appointment
    }
}

type RuleFn = fn(&Signals, &ConversationContext) -> Option<Intent>;

struct Rule {
    name: &'static str,
    apply: RuleFn,
}

const RULES: &[Rule] = &[
    Rule { name: "confirmation", apply: confirmation },
    Rule { name: "new_patient", apply: new_patient },
    Rule { name: "verification", apply: verification },
    Rule { name: "verification_required", apply: verification_required },
    Rule { name: "family_scheduling", apply: family_scheduling },
    Rule { name: "manage_appointment", apply: manage_appointment },
    Rule { name: "schedule", apply: schedule },
    Rule { name: "reschedule_to_time", apply: reschedule_to_time },
    Rule { name: "general_inquiry", apply: general_inquiry },
];

fn confirmation(signals: &Signals, context: &ConversationContext) -> Option<Intent> {
    match signals.confirmation? {
        Confirmation::AddFamilyMembers if context.verified => Some(Intent::AddFamilyMembers),
        Confirmation::Register if context.authenticated => Some(Intent::Register),
        _ => None,
    }
}

fn new_patient(signals: &Signals, context: &ConversationContext) -> Option<Intent> {
    (signals.new_patient && context.authenticated && !context.has_patient_profile).then_some(Intent::Register)
}

fn verification(signals: &Signals, _context: &ConversationContext) -> Option<Intent> {
    signals.verification.then_some(Intent::VerifyIdentity)
}

/// Family-oriented requests get the family wording of the verification request
/// instead of the generic one; every other match gets the generic template.
fn verification_required(signals: &Signals, context: &ConversationContext) -> Option<Intent> {
    let wants_records = signals.booking
        || signals.rescheduling
        || signals.cancelling
        || signals.family_appointment();

    (wants_records && !context.verified).then_some(Intent::VerificationRequired {
        family: signals.family_appointment(),
    })
}

fn family_scheduling(signals: &Signals, context: &ConversationContext) -> Option<Intent> {
    (signals.family_appointment() && context.verified).then_some(Intent::FamilyScheduling)
}

/// A plain mention of an appointment counts as managing it unless the message is a booking request.
fn manage_appointment(signals: &Signals, context: &ConversationContext) -> Option<Intent> {
    let wants_manage = signals.rescheduling
        || signals.cancelling
        || (signals.appointment && !signals.booking);

    if !(wants_manage && context.authenticated && context.verified) {
        return None;
    }

    let action = if signals.rescheduling {
        ManageAction::Reschedule
    } else {
        ManageAction::Cancel
    };
    Some(Intent::ManageAppointment(action))
}

fn schedule(signals: &Signals, context: &ConversationContext) -> Option<Intent> {
    (signals.booking && context.authenticated).then_some(Intent::Schedule {
        emergency: signals.emergency,
    })
}

fn reschedule_to_time(signals: &Signals, _context: &ConversationContext) -> Option<Intent> {
    (signals.awaiting_reschedule_time && signals.clock_time).then_some(Intent::RescheduleToTime)
}

fn general_inquiry(signals: &Signals, _context: &ConversationContext) -> Option<Intent> {
    signals.inquiry.map(Intent::GeneralInquiry)
}

/// Classifies the last message of `history`. Pure: same input, same intent.
pub fn classify(history: &[ChatMessage], context: &ConversationContext) -> Intent {
    let signals = Signals::extract(history);

    RULES
        .iter()
        .find_map(|rule| {
            let intent = (rule.apply)(&signals, context)?;
            debug!("Intent rule '{}' matched: {:?}", rule.name, intent);
            Some(intent)
        })
        .unwrap_or(Intent::Fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified() -> ConversationContext {
        ConversationContext {
            authenticated: true,
            verified: true,
            has_patient_profile: true,
            verified_patient_id: Some(uuid::Uuid::new_v4()),
            ..Default::default()
        }
    }

    fn signed_in() -> ConversationContext {
        ConversationContext {
            authenticated: true,
            ..Default::default()
        }
    }

    fn single(message: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::assistant(replies::GREETING), ChatMessage::user(message)]
    }

    fn after(prompt: &str, message: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::assistant(prompt), ChatMessage::user(message)]
    }

    #[test]
    fn test_reschedule_while_unverified_requires_verification() {
        assert_eq!(
            classify(&single("I need to reschedule my appointment"), &signed_in()),
            Intent::VerificationRequired { family: false }
        );
    }

    #[test]
    fn test_family_request_while_unverified_uses_family_template() {
        assert_eq!(
            classify(&single("Can I book appointments for my kids together?"), &signed_in()),
            Intent::VerificationRequired { family: true }
        );
    }

    #[test]
    fn test_yes_answers_the_previous_prompt() {
        let add_family = after(&replies::family_summary("Ann", &[]), "Yes");
        assert_eq!(classify(&add_family, &verified()), Intent::AddFamilyMembers);
        // Only meaningful once verified.
        assert_ne!(classify(&add_family, &signed_in()), Intent::AddFamilyMembers);

        let register = after("If you're a new patient, would you like to register?", "yes");
        assert_eq!(classify(&register, &signed_in()), Intent::Register);

        let schedule = after(&replies::no_appointments_summary("Ann"), "yes");
        assert_eq!(classify(&schedule, &verified()), Intent::Schedule { emergency: false });
        assert_eq!(
            classify(&schedule, &signed_in()),
            Intent::VerificationRequired { family: false }
        );
    }

    #[test]
    fn test_yes_must_be_the_whole_message() {
        let history = after(replies::NO_UPCOMING_APPOINTMENTS, "yes please, and where are you?");
        assert_eq!(classify(&history, &verified()), Intent::GeneralInquiry(InquiryTopic::Location));
    }

    #[test]
    fn test_new_patient_only_without_profile() {
        assert_eq!(classify(&single("I'm a new patient"), &signed_in()), Intent::Register);
        assert_ne!(classify(&single("I'm a new patient"), &verified()), Intent::Register);
    }

    #[test]
    fn test_verification_utterance_beats_keywords() {
        let history = single("John Smith, 1234567890, 1990-01-01 book appointment");
        assert_eq!(classify(&history, &signed_in()), Intent::VerifyIdentity);
    }

    #[test]
    fn test_family_scheduling_when_verified() {
        assert_eq!(
            classify(&single("I want back-to-back appointments for my family"), &verified()),
            Intent::FamilyScheduling
        );
    }

    #[test]
    fn test_manage_and_schedule_when_verified() {
        assert_eq!(
            classify(&single("Can I move my appointment?"), &verified()),
            Intent::ManageAppointment(ManageAction::Reschedule)
        );
        assert_eq!(
            classify(&single("Please cancel my appointment"), &verified()),
            Intent::ManageAppointment(ManageAction::Cancel)
        );
        assert_eq!(
            classify(&single("I'd like to book an appointment"), &verified()),
            Intent::Schedule { emergency: false }
        );
        assert_eq!(
            classify(&single("I need to schedule an urgent appointment, severe pain"), &verified()),
            Intent::Schedule { emergency: true }
        );
    }

    #[test]
    fn test_clock_time_after_reschedule_prompt() {
        let history = vec![
            ChatMessage::user("John Smith, 1234567890, 1990-01-01"),
            ChatMessage::assistant("... Would you like to reschedule or cancel this appointment?"),
            ChatMessage::user("3pm works"),
        ];
        assert_eq!(classify(&history, &signed_in()), Intent::RescheduleToTime);

        // Without the prompt the same words are only small talk.
        assert_eq!(classify(&single("3pm works"), &signed_in()), Intent::Fallback);
    }

    #[test]
    fn test_impossible_clock_time_is_not_a_reschedule() {
        let history = vec![
            ChatMessage::user("John Smith, 1234567890, 1990-01-01"),
            ChatMessage::assistant("... Would you like to reschedule or cancel this appointment?"),
            ChatMessage::user("13pm please"),
        ];
        assert_eq!(classify(&history, &signed_in()), Intent::Fallback);
    }

    #[test]
    fn test_inquiry_and_fallback() {
        assert_eq!(
            classify(&single("Do you accept Delta Dental insurance?"), &signed_in()),
            Intent::GeneralInquiry(InquiryTopic::Insurance)
        );
        assert_eq!(classify(&single("Tell me about whitening"), &signed_in()), Intent::Fallback);
        assert_eq!(classify(&[], &signed_in()), Intent::Fallback);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let history = single("I need to change my appointment time");
        let context = verified();
        let first = classify(&history, &context);
        assert!((0..10).all(|_| classify(&history, &context) == first));
    }
}
