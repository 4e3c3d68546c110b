// libs/appointment-cell/src/services/repository.rs
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentType, AvailableSlot, SlotRpcResponse,
};

const APPOINTMENT_SELECT: &str = "*,appointment_types(*),patients(id,full_name,is_primary)";

/// Raw reads and atomic procedure calls against the scheduling tables.
pub struct SlotRepository {
    supabase: Arc<SupabaseClient>,
}

impl SlotRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Available slots starting in `[from, to)`, ascending by start time.
    pub async fn available_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let path = format!(
            "/rest/v1/available_slots?is_available=eq.true&start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
            timestamp(from),
            timestamp(to),
        );
        self.fetch_rows(&path, auth_token).await
    }

    pub async fn get_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<AvailableSlot>, AppointmentError> {
        let path = format!("/rest/v1/available_slots?id=eq.{}&limit=1", slot_id);
        Ok(self.fetch_rows(&path, auth_token).await?.into_iter().next())
    }

    pub async fn appointment_types(
        &self,
        auth_token: &str,
    ) -> Result<Vec<AppointmentType>, AppointmentError> {
        self.fetch_rows("/rest/v1/appointment_types?order=name.asc", auth_token).await
    }

    pub async fn appointment_type(
        &self,
        type_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<AppointmentType>, AppointmentError> {
        let path = format!("/rest/v1/appointment_types?id=eq.{}&limit=1", type_id);
        Ok(self.fetch_rows(&path, auth_token).await?.into_iter().next())
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?select={}&id=eq.{}&limit=1",
            APPOINTMENT_SELECT, appointment_id
        );
        Ok(self.fetch_rows(&path, auth_token).await?.into_iter().next())
    }

    /// Earliest scheduled appointment at or after `now` among the given patients.
    pub async fn earliest_scheduled(
        &self,
        patient_ids: &[Uuid],
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let patient_filter = match patient_ids {
            [] => return Ok(None),
            [single] => format!("eq.{}", single),
            many => format!(
                "in.({})",
                many.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
            ),
        };

        let path = format!(
            "/rest/v1/appointments?select={}&patient_id={}&status=eq.scheduled&start_time=gte.{}&order=start_time.asc&limit=1",
            APPOINTMENT_SELECT,
            patient_filter,
            timestamp(now),
        );
        Ok(self.fetch_rows(&path, auth_token).await?.into_iter().next())
    }

    /// Scheduled appointments of a family group, excluding `except` when given.
    pub async fn scheduled_in_group(
        &self,
        family_group_id: Uuid,
        except: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?select={}&family_group_id=eq.{}&status=eq.scheduled",
            APPOINTMENT_SELECT, family_group_id
        );
        if let Some(except) = except {
            path.push_str(&format!("&id=neq.{}", except));
        }
        path.push_str("&order=start_time.asc");
        self.fetch_rows(&path, auth_token).await
    }

    /// Reserves the slot and creates the appointment in one transaction.
    pub async fn book(
        &self,
        patient_id: Uuid,
        slot_id: Uuid,
        appointment_type_id: Uuid,
        emergency_description: Option<&str>,
        family_group_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<SlotRpcResponse, AppointmentError> {
        debug!("Calling book_appointment for patient {} on slot {}", patient_id, slot_id);
        self.call("book_appointment", json!({
            "p_patient_id": patient_id,
            "p_slot_id": slot_id,
            "p_appointment_type_id": appointment_type_id,
            "p_emergency_description": emergency_description,
            "p_family_group_id": family_group_id
        }), auth_token).await
    }

    /// Releases the old slot and reserves the new one in one transaction.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        new_slot_id: Uuid,
        auth_token: &str,
    ) -> Result<SlotRpcResponse, AppointmentError> {
        debug!("Calling reschedule_appointment for {} to slot {}", appointment_id, new_slot_id);
        self.call("reschedule_appointment", json!({
            "p_appointment_id": appointment_id,
            "p_new_slot_id": new_slot_id
        }), auth_token).await
    }

    /// Flips the status to cancelled and frees the matching slot in one transaction.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<SlotRpcResponse, AppointmentError> {
        debug!("Calling cancel_appointment for {}", appointment_id);
        self.call("cancel_appointment", json!({
            "p_appointment_id": appointment_id
        }), auth_token).await
    }

    async fn call(
        &self,
        function: &str,
        params: Value,
        auth_token: &str,
    ) -> Result<SlotRpcResponse, AppointmentError> {
        self.supabase
            .rpc(function, Some(auth_token), params)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<T>, AppointmentError> {
        debug!("Fetching {}", path);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse rows: {}", e)))
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    urlencoding::encode(&at.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}
