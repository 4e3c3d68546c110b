// libs/appointment-cell/src/services/family.rs
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, FamilyBooking, FamilyBookingEntry, FamilyBookingPlanRequest,
};
use crate::services::allocator::SlotAllocator;
use crate::services::slots;

/// Books several household members into one group. Either every entry is kept or none is.
pub struct FamilyBookingCoordinator {
    allocator: SlotAllocator,
}

impl FamilyBookingCoordinator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            allocator: SlotAllocator::new(config),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            allocator: SlotAllocator::with_client(supabase, config.practice_offset()),
        }
    }

    /// Assigns each patient, in order, one slot of the back-to-back run that begins at the chosen start slot.
    pub async fn plan(
        &self,
        request: FamilyBookingPlanRequest,
        auth_token: &str,
    ) -> Result<Vec<FamilyBookingEntry>, AppointmentError> {
        let count = request.patient_ids.len();
        if count == 0 {
            return Err(AppointmentError::ValidationError(
                "Select at least one family member".to_string(),
            ));
        }

        let available = self.allocator.available_slots(request.date, auth_token).await?;
        let windows = slots::consecutive_windows(&available, count).ok_or_else(|| {
            AppointmentError::ValidationError(format!(
                "There are no {} back-to-back times available on {}",
                count, request.date
            ))
        })?;

        if !windows.valid_start_slots.iter().any(|slot| slot.id == request.start_slot_id) {
            return Err(AppointmentError::SlotUnavailable);
        }

        let run = slots::run_starting_at(&available, request.start_slot_id, count)
            .ok_or(AppointmentError::SlotUnavailable)?;

        Ok(request
            .patient_ids
            .iter()
            .zip(run)
            .map(|(&patient_id, slot)| FamilyBookingEntry {
                patient_id,
                slot_id: slot.id,
                appointment_type_id: request.appointment_type_id,
                emergency_description: request.emergency_description.clone(),
            })
            .collect())
    }

    /// Validates every entry, then books them under one new group id.
    /// A failure cancels the members booked so far, latest first.
    pub async fn book_family(
        &self,
        entries: Vec<FamilyBookingEntry>,
        auth_token: &str,
    ) -> Result<FamilyBooking, AppointmentError> {
        let descriptions = self.validate(&entries, auth_token).await?;

        let family_group_id = Uuid::new_v4();
        let mut committed: Vec<Uuid> = Vec::with_capacity(entries.len());
        let mut booked: Vec<Appointment> = Vec::with_capacity(entries.len());

        for (entry, description) in entries.iter().zip(&descriptions) {
            let step = match self.allocator.reserve_slot(
                entry.patient_id,
                entry.slot_id,
                entry.appointment_type_id,
                description.as_deref(),
                Some(family_group_id),
                auth_token,
            ).await {
                Ok(appointment_id) => {
                    committed.push(appointment_id);
                    self.allocator.get_appointment(appointment_id, auth_token).await
                }
                Err(e) => Err(e),
            };

            match step {
                Ok(appointment) => booked.push(appointment),
                Err(e) => {
                    warn!(
                        "Family group {} failed at patient {}: {}; rolling back {} booking(s)",
                        family_group_id, entry.patient_id, e, committed.len()
                    );
                    // Only a clean refusal proves the procedure wrote nothing for this entry.
                    let sweep_group = !matches!(e, AppointmentError::SlotUnavailable);
                    self.compensate(family_group_id, &committed, sweep_group, auth_token).await;
                    return Err(AppointmentError::FamilyBookingFailed {
                        patient_id: entry.patient_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Family group {} booked with {} appointment(s)", family_group_id, booked.len());

        Ok(FamilyBooking {
            family_group_id,
            appointments: booked,
        })
    }

    async fn validate(
        &self,
        entries: &[FamilyBookingEntry],
        auth_token: &str,
    ) -> Result<Vec<Option<String>>, AppointmentError> {
        if entries.is_empty() {
            return Err(AppointmentError::ValidationError(
                "Select at least one family member".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if !entries.iter().all(|entry| seen.insert(entry.slot_id)) {
            return Err(AppointmentError::ValidationError(
                "Each family member needs a different time slot".to_string(),
            ));
        }

        let mut descriptions = Vec::with_capacity(entries.len());

        for entry in entries {
            let description = self.allocator
                .validate_emergency(entry.appointment_type_id, entry.emergency_description.as_deref(), auth_token)
                .await?;
            descriptions.push(description);
        }

        Ok(descriptions)
    }

    /// Releases every committed booking, newest first. With `sweep_group`, also releases
    /// any appointment the procedure stamped with the group id that was never reported back.
    async fn compensate(
        &self,
        family_group_id: Uuid,
        committed: &[Uuid],
        sweep_group: bool,
        auth_token: &str,
    ) {
        let mut to_release: Vec<Uuid> = committed.iter().rev().copied().collect();

        if sweep_group {
            match self.allocator.group_appointments(family_group_id, auth_token).await {
                Ok(found) => to_release.extend(
                    found
                        .into_iter()
                        .map(|appointment| appointment.id)
                        .filter(|id| !committed.contains(id)),
                ),
                Err(e) => error!("Could not list family group {} for rollback: {}", family_group_id, e),
            }
        }

        for appointment_id in to_release {
            if let Err(e) = self.allocator.release(appointment_id, auth_token).await {
                error!(
                    "Could not roll back appointment {} of family group {}: {}",
                    appointment_id, family_group_id, e
                );
            }
        }
    }
}
