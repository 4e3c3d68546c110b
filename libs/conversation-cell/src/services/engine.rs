// libs/conversation-cell/src/services/engine.rs
use std::sync::Arc;

use chrono::FixedOffset;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use appointment_cell::models::AppointmentError;
use appointment_cell::services::SlotAllocator;
use patient_cell::handlers::VERIFICATION_FAILED_MESSAGE;
use patient_cell::models::{PatientError, VerificationOutcome};
use patient_cell::services::{looks_like_verification, IdentityVerifier, PatientService};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    ChatMessage, ConversationContext, ConversationError, FormCompletion, HandleMessageResponse,
    Intent, ManageAction, RouterOutput, UiAction,
};
use crate::services::fallback::{ConversationFallback, FallbackHints, GeminiFallback};
use crate::services::intent::{self, assistant_said};
use crate::services::{inquiry, replies};

/// Decides the next bot message and form for a conversation.
/// Holds no per-conversation state; every call works from the transcript and context it is given.
pub struct ConversationRouter {
    verifier: IdentityVerifier,
    patients: PatientService,
    allocator: SlotAllocator,
    fallback: Arc<dyn ConversationFallback>,
    offset: FixedOffset,
}

impl ConversationRouter {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parts(
            Arc::new(SupabaseClient::new(config)),
            config.practice_offset(),
            Arc::new(GeminiFallback::new(config)),
        )
    }

    pub fn with_parts(
        supabase: Arc<SupabaseClient>,
        offset: FixedOffset,
        fallback: Arc<dyn ConversationFallback>,
    ) -> Self {
        Self {
            verifier: IdentityVerifier::with_client(Arc::clone(&supabase)),
            patients: PatientService::with_client(Arc::clone(&supabase)),
            allocator: SlotAllocator::with_client(supabase, offset),
            fallback,
            offset,
        }
    }

    pub fn greeting() -> RouterOutput {
        RouterOutput::reply(replies::GREETING)
    }

    /// Appends the user's message and routes it.
    pub async fn handle_message(
        &self,
        mut history: Vec<ChatMessage>,
        context: &ConversationContext,
        content: String,
        auth_token: &str,
    ) -> HandleMessageResponse {
        history.push(ChatMessage::user(content));
        let output = self.route(&history, context, auth_token).await;

        HandleMessageResponse {
            messages: vec![ChatMessage::assistant(output.bot_message)],
            ui_action: output.ui_action,
            verified_patient: output.verified_patient,
        }
    }

    /// Routes the last message of `history`. Failures become an apology, never an error.
    pub async fn route(
        &self,
        history: &[ChatMessage],
        context: &ConversationContext,
        auth_token: &str,
    ) -> RouterOutput {
        if !history.last().is_some_and(|message| !message.is_assistant()) {
            return Self::greeting();
        }

        let intent = intent::classify(history, context);
        info!("Routing message as {:?}", intent);

        match self.dispatch(intent, history, context, auth_token).await {
            Ok(output) => output,
            Err(e) => {
                error!("Handling {:?} failed: {}", intent, e);
                RouterOutput::reply(replies::GENERIC_ERROR)
            }
        }
    }

    async fn dispatch(
        &self,
        intent: Intent,
        history: &[ChatMessage],
        context: &ConversationContext,
        auth_token: &str,
    ) -> Result<RouterOutput, ConversationError> {
        match intent {
            Intent::AddFamilyMembers => Ok(RouterOutput::with_action(
                replies::ADD_FAMILY_MEMBERS_FORM,
                UiAction::FamilyRegistration,
            )),
            Intent::Register => Ok(RouterOutput::with_action(
                replies::REGISTRATION_FORM,
                UiAction::Registration,
            )),
            Intent::VerifyIdentity => self.verify(history, auth_token).await,
            Intent::VerificationRequired { family: true } => {
                Ok(RouterOutput::reply(replies::FAMILY_VERIFICATION_REQUEST))
            }
            Intent::VerificationRequired { family: false } => {
                Ok(RouterOutput::reply(replies::VERIFICATION_REQUEST))
            }
            Intent::FamilyScheduling => Ok(if context.has_family_members {
                RouterOutput::with_action(replies::FAMILY_SCHEDULER_FORM, UiAction::FamilyScheduler)
            } else {
                RouterOutput::with_action(replies::NO_FAMILY_MEMBERS_FORM, UiAction::FamilyRegistration)
            }),
            Intent::ManageAppointment(action) => self.manage(action, context, auth_token).await,
            Intent::Schedule { emergency } => Ok(Self::schedule(emergency, context)),
            Intent::RescheduleToTime => self.reschedule_to_time(history, context, auth_token).await,
            Intent::GeneralInquiry(topic) => Ok(RouterOutput::reply(inquiry::answer(topic))),
            Intent::Fallback => Ok(self.fallback_reply(history, context).await),
        }
    }

    async fn verify(
        &self,
        history: &[ChatMessage],
        auth_token: &str,
    ) -> Result<RouterOutput, ConversationError> {
        let Some((latest, earlier)) = history.split_last() else {
            return Ok(Self::greeting());
        };

        let patient = match self.verifier.verify_utterance(&latest.content, auth_token).await {
            Ok(VerificationOutcome::Verified(patient)) => patient,
            Ok(VerificationOutcome::Unverified(reason)) => {
                debug!("Verification rejected: {:?}", reason);
                return Ok(RouterOutput::reply(VERIFICATION_FAILED_MESSAGE));
            }
            Err(PatientError::ValidationError(hint)) => return Ok(RouterOutput::reply(hint)),
            Err(e) => return Err(e.into()),
        };

        let name = patient.full_name.clone();

        let mut output = if assistant_said(earlier, replies::PROMPT_SCHEDULE_ONE)
            || assistant_said(earlier, replies::PROMPT_SCHEDULE_NEW)
        {
            RouterOutput::with_action(
                replies::VERIFIED_SCHEDULER_FORM,
                UiAction::Scheduler { emergency: false },
            )
        } else if assistant_said(earlier, replies::PROMPT_FAMILY_SCHEDULING) {
            let members = self.patients.family_members(patient.id, auth_token).await?;
            if members.is_empty() {
                RouterOutput::with_action(replies::ADD_FAMILY_MEMBERS_FORM, UiAction::FamilyRegistration)
            } else {
                RouterOutput::with_action(replies::VERIFIED_FAMILY_SCHEDULER_FORM, UiAction::FamilyScheduler)
            }
        } else if intent::is_family_visit_request(&latest.content)
            || replies::MARK_FAMILY_VISIT.iter().any(|mark| assistant_said(earlier, mark))
        {
            let members = self.patients.family_members(patient.id, auth_token).await?;
            RouterOutput::reply(replies::family_summary(&name, &members))
        } else {
            match self.allocator.latest_appointment(patient.id, auth_token).await? {
                Some(appointment) => RouterOutput::reply(replies::latest_appointment_summary(
                    &name,
                    &appointment,
                    self.offset,
                )),
                None => RouterOutput::reply(replies::no_appointments_summary(&name)),
            }
        };

        output.verified_patient = Some(patient);
        Ok(output)
    }

    async fn manage(
        &self,
        action: ManageAction,
        context: &ConversationContext,
        auth_token: &str,
    ) -> Result<RouterOutput, ConversationError> {
        let Some(patient_id) = context.verified_patient() else {
            return Ok(RouterOutput::reply(replies::VERIFICATION_REQUEST));
        };

        Ok(match self.allocator.latest_appointment(patient_id, auth_token).await? {
            Some(appointment) => RouterOutput::with_action(
                replies::manager_form(action.verb()),
                UiAction::Manager {
                    appointment: Box::new(appointment),
                    action,
                },
            ),
            None => RouterOutput::reply(replies::NO_UPCOMING_APPOINTMENTS),
        })
    }

    fn schedule(emergency: bool, context: &ConversationContext) -> RouterOutput {
        if !context.has_patient_profile && context.verified_patient().is_none() {
            return RouterOutput::with_action(
                replies::REGISTRATION_BEFORE_SCHEDULING,
                UiAction::Registration,
            );
        }

        RouterOutput::with_action(replies::scheduler_form(emergency), UiAction::Scheduler { emergency })
    }

    async fn reschedule_to_time(
        &self,
        history: &[ChatMessage],
        context: &ConversationContext,
        auth_token: &str,
    ) -> Result<RouterOutput, ConversationError> {
        let Some((latest, earlier)) = history.split_last() else {
            return Ok(Self::greeting());
        };

        let patient_id = match context.verified_patient() {
            Some(id) => Some(id),
            None => self.reverify_from_transcript(earlier, auth_token).await?,
        };

        let appointment = match patient_id {
            Some(id) => self.allocator.latest_appointment(id, auth_token).await?,
            None => None,
        };

        let Some(appointment) = appointment else {
            debug!("No appointment to move, answering conversationally");
            return Ok(self.converse(history, context).await);
        };

        Ok(match self.allocator.reschedule_to_clock_time(appointment.id, &latest.content, auth_token).await {
            Ok(result) => {
                let time = replies::clock_time(result.slot.start_time, self.offset);
                RouterOutput::reply(replies::rescheduled(&time, result.exact_match))
            }
            Err(AppointmentError::NoAvailableSlots(date)) => {
                info!("No slots left on {} for appointment {}", date, appointment.id);
                RouterOutput::reply(replies::NO_SLOTS_ON_DAY)
            }
            Err(e) => {
                warn!("Could not reschedule appointment {}: {}", appointment.id, e);
                RouterOutput::reply(replies::RESCHEDULE_FAILED)
            }
        })
    }

    /// Re-checks the most recent identity utterance in the transcript.
    async fn reverify_from_transcript(
        &self,
        earlier: &[ChatMessage],
        auth_token: &str,
    ) -> Result<Option<Uuid>, ConversationError> {
        let Some(utterance) = earlier
            .iter()
            .rev()
            .find(|message| !message.is_assistant() && looks_like_verification(&message.content))
        else {
            return Ok(None);
        };

        match self.verifier.verify_utterance(&utterance.content, auth_token).await {
            Ok(outcome) => Ok(outcome.patient().map(|patient| patient.id)),
            Err(PatientError::ValidationError(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Static practice answers first, the language model otherwise.
    async fn converse(&self, history: &[ChatMessage], context: &ConversationContext) -> RouterOutput {
        let topic = history.last().and_then(|message| inquiry::topic(&message.content));

        match topic {
            Some(topic) => RouterOutput::reply(inquiry::answer(topic)),
            None => self.fallback_reply(history, context).await,
        }
    }

    async fn fallback_reply(&self, history: &[ChatMessage], context: &ConversationContext) -> RouterOutput {
        let hints = FallbackHints::from(context);

        match self.fallback.reply(history, &hints).await {
            Ok(text) => RouterOutput::reply(text),
            Err(e) => {
                warn!("Conversational fallback failed: {}", e);
                RouterOutput::reply(replies::FALLBACK_UNAVAILABLE)
            }
        }
    }

    /// Follow-up once the presentation layer reports a finished form.
    pub fn complete_form(&self, history: &[ChatMessage], completion: FormCompletion) -> RouterOutput {
        match completion {
            FormCompletion::AppointmentScheduled { emergency } => {
                RouterOutput::reply(replies::appointment_scheduled(emergency))
            }
            FormCompletion::FamilyAppointmentsScheduled => {
                RouterOutput::reply(replies::FAMILY_APPOINTMENTS_SCHEDULED)
            }
            FormCompletion::AppointmentManaged => RouterOutput::reply(replies::APPOINTMENT_MANAGED),
            FormCompletion::RegistrationComplete => {
                let from_scheduling = history
                    .iter()
                    .any(|message| message.content.contains(replies::MARK_REGISTRATION_FROM_SCHEDULING));

                if from_scheduling {
                    RouterOutput::with_action(
                        replies::REGISTERED_FROM_SCHEDULING,
                        UiAction::Scheduler { emergency: false },
                    )
                } else {
                    RouterOutput::reply(replies::REGISTERED)
                }
            }
            FormCompletion::FamilyRegistrationComplete => {
                RouterOutput::with_action(replies::FAMILY_REGISTERED, UiAction::FamilyScheduler)
            }
        }
    }
}
