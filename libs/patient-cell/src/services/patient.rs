use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{is_conflict, SupabaseClient};

use crate::models::{
    AddFamilyMemberRequest, FamilyMember, FamilyRelationshipRow, Patient, PatientError,
    RegisterPatientRequest,
};

/// Formats a phone number the way it is stored: "(###) ###-####".
pub fn normalize_phone(raw: &str) -> Result<String, PatientError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 10 {
        return Err(PatientError::ValidationError(
            "Phone number must contain exactly 10 digits".to_string(),
        ));
    }

    Ok(format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..]))
}

pub struct PatientService {
    supabase: Arc<SupabaseClient>,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Registers the account holder. (phone, date of birth) must be unused by any primary patient.
    pub async fn register_patient(
        &self,
        user_id: Uuid,
        request: RegisterPatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let full_name = request.full_name.trim();
        if full_name.is_empty() {
            return Err(PatientError::ValidationError("Full name is required".to_string()));
        }
        let phone_number = normalize_phone(&request.phone_number)?;

        debug!("Registering primary patient for user {}", user_id);

        if self
            .find_primary_by_identity(&phone_number, request.date_of_birth, auth_token)
            .await?
            .is_some()
        {
            warn!("Registration rejected: primary patient with same phone and date of birth exists");
            return Err(PatientError::DuplicatePatient);
        }

        let now = Utc::now().to_rfc3339();
        let patient_data = json!({
            "user_id": user_id,
            "full_name": full_name,
            "phone_number": phone_number,
            "date_of_birth": request.date_of_birth.format("%Y-%m-%d").to_string(),
            "insurance_name": request.insurance_name.filter(|name| !name.trim().is_empty()),
            "is_primary": true,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            Some(patient_data),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| {
            if is_conflict(&e) {
                PatientError::DuplicatePatient
            } else {
                PatientError::DatabaseError(e.to_string())
            }
        })?;

        let patient = first_row::<Patient>(result, "Failed to create patient profile")?;
        info!("Primary patient {} registered", patient.id);

        Ok(patient)
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}&limit=1", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(PatientError::NotFound);
        }

        first_row(result, "Patient not found")
    }

    /// Looks up the primary patient by exact stored phone (display form) and date of birth.
    pub async fn find_primary_by_identity(
        &self,
        phone_number: &str,
        date_of_birth: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<Patient>, PatientError> {
        debug!("Looking up primary patient by phone and date of birth");

        let path = format!(
            "/rest/v1/patients?phone_number=eq.{}&date_of_birth=eq.{}&is_primary=eq.true&limit=1",
            urlencoding::encode(phone_number),
            date_of_birth.format("%Y-%m-%d"),
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e))),
            None => Ok(None),
        }
    }

    pub async fn family_members(
        &self,
        primary_patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<FamilyMember>, PatientError> {
        debug!("Fetching family members of primary patient {}", primary_patient_id);

        let path = format!(
            "/rest/v1/family_relationships?select=id,relationship,family_member:family_member_id(*)&primary_patient_id=eq.{}",
            primary_patient_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let rows = result
            .into_iter()
            .map(serde_json::from_value::<FamilyRelationshipRow>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PatientError::DatabaseError(format!("Failed to parse family relationships: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| FamilyMember {
                patient: row.family_member,
                relationship: row.relationship,
            })
            .collect())
    }

    /// Creates a non-primary patient under the account holder and links it to them.
    pub async fn add_family_member(
        &self,
        primary_patient_id: Uuid,
        request: AddFamilyMemberRequest,
        auth_token: &str,
    ) -> Result<FamilyMember, PatientError> {
        let full_name = request.full_name.trim();
        if full_name.is_empty() {
            return Err(PatientError::ValidationError("Family member name is required".to_string()));
        }

        let primary = self.get_patient(primary_patient_id, auth_token).await?;
        if !primary.is_primary {
            return Err(PatientError::ValidationError(
                "Family members can only be added to the primary account holder".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        let member_data = json!({
            "user_id": primary.user_id,
            "full_name": full_name,
            "is_primary": false,
            "created_at": now,
            "updated_at": now
        });

        let created: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            Some(member_data),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;
        let member = first_row::<Patient>(created, "Failed to create family member")?;

        let relationship_data = json!({
            "primary_patient_id": primary.id,
            "family_member_id": member.id,
            "relationship": request.relationship.to_string(),
            "created_at": now
        });

        let linked: Result<Vec<Value>, _> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/family_relationships",
            Some(auth_token),
            Some(relationship_data),
            Some(SupabaseClient::representation_headers()),
        ).await;

        if let Err(e) = linked {
            error!("Linking family member {} failed, removing orphaned patient row: {}", member.id, e);
            let delete_path = format!("/rest/v1/patients?id=eq.{}", member.id);
            if let Err(cleanup) = self.supabase
                .request_with_headers::<Vec<Value>>(
                    Method::DELETE,
                    &delete_path,
                    Some(auth_token),
                    None,
                    Some(SupabaseClient::representation_headers()),
                )
                .await
            {
                error!("Failed to remove orphaned family member {}: {}", member.id, cleanup);
            }
            return Err(PatientError::DatabaseError(e.to_string()));
        }

        info!("Family member {} ({}) added to primary patient {}", member.id, request.relationship, primary.id);

        Ok(FamilyMember {
            patient: member,
            relationship: request.relationship,
        })
    }
}

fn first_row<T: serde::de::DeserializeOwned>(rows: Vec<Value>, empty_message: &str) -> Result<T, PatientError> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| PatientError::DatabaseError(empty_message.to_string()))?;

    serde_json::from_value(row)
        .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e)))
}
