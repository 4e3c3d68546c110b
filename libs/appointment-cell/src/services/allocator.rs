// libs/appointment-cell/src/services/allocator.rs
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use patient_cell::models::PatientError;
use patient_cell::services::PatientService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentType, AvailableSlot,
    BookAppointmentRequest, ConsecutiveSlots, RescheduleToTimeResult, SlotRpcResponse,
    SlotRpcStatus,
};
use crate::services::repository::SlotRepository;
use crate::services::slots;

/// Finds, books, cancels and reschedules appointment slots.
pub struct SlotAllocator {
    repository: SlotRepository,
    patients: PatientService,
    offset: FixedOffset,
}

impl SlotAllocator {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)), config.practice_offset())
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, offset: FixedOffset) -> Self {
        Self {
            repository: SlotRepository::new(Arc::clone(&supabase)),
            patients: PatientService::with_client(supabase),
            offset,
        }
    }

    /// Future available slots on a practice calendar day, ascending.
    pub async fn available_slots(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let now = Utc::now();
        let Some((from, to)) = slots::day_window(date, self.offset, now) else {
            debug!("{} is already over, no slots to offer", date);
            return Ok(Vec::new());
        };

        let slots = self.repository.available_between(from, to, auth_token).await?;

        Ok(slots.into_iter().filter(|slot| slot.start_time > now).collect())
    }

    pub async fn appointment_types(
        &self,
        auth_token: &str,
    ) -> Result<Vec<AppointmentType>, AppointmentError> {
        self.repository.appointment_types(auth_token).await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.repository
            .get_appointment(appointment_id, auth_token)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn book(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let description = self
            .validate_emergency(request.appointment_type_id, request.emergency_description.as_deref(), auth_token)
            .await?;

        self.reserve(
            request.patient_id,
            request.slot_id,
            request.appointment_type_id,
            description.as_deref(),
            None,
            auth_token,
        ).await
    }

    /// The emergency type needs a non-empty description; other types drop it.
    pub(crate) async fn validate_emergency(
        &self,
        appointment_type_id: Uuid,
        emergency_description: Option<&str>,
        auth_token: &str,
    ) -> Result<Option<String>, AppointmentError> {
        let appointment_type = self
            .repository
            .appointment_type(appointment_type_id, auth_token)
            .await?
            .ok_or_else(|| AppointmentError::ValidationError("Unknown appointment type".to_string()))?;

        if !appointment_type.is_emergency() {
            return Ok(None);
        }

        match emergency_description.map(str::trim).filter(|d| !d.is_empty()) {
            Some(description) => Ok(Some(description.to_string())),
            None => Err(AppointmentError::ValidationError(
                "Please describe your emergency so we can prepare for your visit".to_string(),
            )),
        }
    }

    /// Books one slot through the atomic procedure; input must already be validated.
    pub(crate) async fn reserve(
        &self,
        patient_id: Uuid,
        slot_id: Uuid,
        appointment_type_id: Uuid,
        emergency_description: Option<&str>,
        family_group_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment_id = self
            .reserve_slot(patient_id, slot_id, appointment_type_id, emergency_description, family_group_id, auth_token)
            .await?;
        self.get_appointment(appointment_id, auth_token).await
    }

    /// Runs the booking procedure and returns the id it committed.
    pub(crate) async fn reserve_slot(
        &self,
        patient_id: Uuid,
        slot_id: Uuid,
        appointment_type_id: Uuid,
        emergency_description: Option<&str>,
        family_group_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError> {
        let response = self.repository
            .book(patient_id, slot_id, appointment_type_id, emergency_description, family_group_id, auth_token)
            .await?;

        let appointment_id = match response {
            SlotRpcResponse { status: SlotRpcStatus::Booked, appointment_id: Some(id) } => id,
            SlotRpcResponse { status: SlotRpcStatus::SlotUnavailable, .. } => {
                info!("Slot {} was taken before patient {} could book it", slot_id, patient_id);
                return Err(AppointmentError::SlotUnavailable);
            }
            other => {
                return Err(AppointmentError::DatabaseError(format!(
                    "Unexpected booking result: {:?}", other
                )));
            }
        };

        info!("Appointment {} booked for patient {} on slot {}", appointment_id, patient_id, slot_id);
        Ok(appointment_id)
    }

    /// Undoes a booking through the cancel procedure alone, without reading the row first.
    pub(crate) async fn release(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let response = self.repository.cancel(appointment_id, auth_token).await?;
        match response.status {
            SlotRpcStatus::Cancelled | SlotRpcStatus::AlreadyCancelled => {
                info!("Appointment {} released", appointment_id);
                Ok(())
            }
            SlotRpcStatus::NotFound => Err(AppointmentError::NotFound),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected cancellation result: {:?}", other
            ))),
        }
    }

    /// Every scheduled appointment stamped with `family_group_id`.
    pub(crate) async fn group_appointments(
        &self,
        family_group_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.repository.scheduled_in_group(family_group_id, None, auth_token).await
    }

    /// Cancels and frees the slot. Cancelling an already cancelled appointment succeeds without a write.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(appointment_id, auth_token).await?;

        match appointment.status {
            AppointmentStatus::Cancelled => {
                debug!("Appointment {} already cancelled", appointment_id);
                return Ok(appointment);
            }
            AppointmentStatus::Completed => {
                return Err(AppointmentError::InvalidStatusTransition(appointment.status));
            }
            AppointmentStatus::Scheduled => {}
        }

        let response = self.repository.cancel(appointment_id, auth_token).await?;
        match response.status {
            SlotRpcStatus::Cancelled => info!("Appointment {} cancelled, slot released", appointment_id),
            SlotRpcStatus::AlreadyCancelled => debug!("Appointment {} was cancelled concurrently", appointment_id),
            SlotRpcStatus::NotFound => return Err(AppointmentError::NotFound),
            other => {
                return Err(AppointmentError::DatabaseError(format!(
                    "Unexpected cancellation result: {:?}", other
                )));
            }
        }

        appointment.status = AppointmentStatus::Cancelled;
        Ok(appointment)
    }

    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        new_slot_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if appointment.status != AppointmentStatus::Scheduled {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let response = self.repository.reschedule(appointment_id, new_slot_id, auth_token).await?;
        match response.status {
            SlotRpcStatus::Rescheduled => {
                info!("Appointment {} moved to slot {}", appointment_id, new_slot_id);
            }
            SlotRpcStatus::SlotUnavailable => {
                info!("Slot {} was taken before appointment {} could move", new_slot_id, appointment_id);
                return Err(AppointmentError::SlotUnavailable);
            }
            SlotRpcStatus::NotFound => return Err(AppointmentError::NotFound),
            other => {
                return Err(AppointmentError::DatabaseError(format!(
                    "Unexpected reschedule result: {:?}", other
                )));
            }
        }

        self.get_appointment(appointment_id, auth_token).await
    }

    pub async fn find_consecutive_slots(
        &self,
        date: NaiveDate,
        count: usize,
        auth_token: &str,
    ) -> Result<Option<ConsecutiveSlots>, AppointmentError> {
        if count == 0 {
            return Err(AppointmentError::ValidationError(
                "At least one slot must be requested".to_string(),
            ));
        }

        let available = self.available_slots(date, auth_token).await?;
        Ok(slots::consecutive_windows(&available, count))
    }

    /// Moves an appointment to the slot on its own day that starts at, or nearest to, a clock time in `text`.
    pub async fn reschedule_to_clock_time(
        &self,
        appointment_id: Uuid,
        text: &str,
        auth_token: &str,
    ) -> Result<RescheduleToTimeResult, AppointmentError> {
        let time = slots::parse_clock_time(text).ok_or_else(|| {
            AppointmentError::ValidationError(
                "Please tell me the time you'd prefer, for example \"3pm\" or \"10:30 am\"".to_string(),
            )
        })?;

        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        let date = appointment.start_time.with_timezone(&self.offset).date_naive();

        let available = self.available_slots(date, auth_token).await?;
        let target = slots::local_instant(date, time, self.offset).ok_or_else(|| {
            AppointmentError::ValidationError("That time does not exist on this day".to_string())
        })?;

        let (slot, exact_match) = match slots::exact_slot(&available, target) {
            Some(slot) => (slot.clone(), true),
            None => match slots::nearest_slot(&available, target) {
                Some(slot) => (slot.clone(), false),
                None => return Err(AppointmentError::NoAvailableSlots(date)),
            },
        };

        if !exact_match {
            debug!("No slot at {}, nearest is {}", target, slot.start_time);
        }

        let appointment = self.reschedule(appointment_id, slot.id, auth_token).await?;

        Ok(RescheduleToTimeResult { appointment, slot, exact_match })
    }

    /// The patient's own earliest future appointment; for a primary patient with none,
    /// the earliest one among their family members.
    pub async fn latest_appointment(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let now = Utc::now();

        if let Some(own) = self.repository.earliest_scheduled(&[patient_id], now, auth_token).await? {
            return Ok(Some(own));
        }

        let patient = match self.patients.get_patient(patient_id, auth_token).await {
            Ok(patient) => patient,
            Err(PatientError::NotFound) => return Ok(None),
            Err(e) => return Err(AppointmentError::DatabaseError(e.to_string())),
        };
        if !patient.is_primary {
            return Ok(None);
        }

        let member_ids: Vec<Uuid> = self.patients
            .family_members(patient.id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .into_iter()
            .map(|member| member.patient.id)
            .collect();

        self.repository.earliest_scheduled(&member_ids, now, auth_token).await
    }

    /// Other scheduled appointments booked together with this one.
    pub async fn family_group_appointments(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        match appointment.family_group_id {
            Some(group_id) => self.repository.scheduled_in_group(group_id, Some(appointment_id), auth_token).await,
            None => Ok(Vec::new()),
        }
    }

    /// Current availability for the day of a slot that was just lost to another booking.
    pub async fn refresh_after_conflict(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        match self.repository.get_slot(slot_id, auth_token).await? {
            Some(slot) => {
                let date = slot.start_time.with_timezone(&self.offset).date_naive();
                self.available_slots(date, auth_token).await
            }
            None => {
                warn!("Slot {} disappeared while refreshing availability", slot_id);
                Ok(Vec::new())
            }
        }
    }
}
