// libs/conversation-cell/src/services/fallback.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{ChatMessage, ChatRole, ConversationContext, FallbackError};

/// Context the free-text generator may use to shape its reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackHints {
    pub authenticated: bool,
    pub patient_name: Option<String>,
    pub has_appointments: bool,
    pub is_rescheduling: bool,
    pub is_verified: bool,
    pub has_family_members: bool,
}

impl From<&ConversationContext> for FallbackHints {
    fn from(context: &ConversationContext) -> Self {
        Self {
            authenticated: context.authenticated,
            patient_name: context.patient_name.clone(),
            has_appointments: context.has_appointments,
            is_rescheduling: context.is_rescheduling,
            is_verified: context.verified,
            has_family_members: context.has_family_members,
        }
    }
}

/// Produces a reply when no structured intent applies. Called at most once per message, never retried.
#[async_trait]
pub trait ConversationFallback: Send + Sync {
    async fn reply(&self, transcript: &[ChatMessage], hints: &FallbackHints) -> Result<String, FallbackError>;
}

// ==============================================================================
// GEMINI
// ==============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 250;

/// Google Gemini `generateContent` client.
pub struct GeminiFallback {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiFallback {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Gemini wants the conversation to open with a user turn, so the greeting is dropped.
    fn contents(transcript: &[ChatMessage]) -> Vec<Content> {
        transcript
            .iter()
            .skip_while(|message| message.is_assistant())
            .map(|message| Content {
                role: Some(match message.role {
                    ChatRole::User => "user".to_string(),
                    ChatRole::Assistant => "model".to_string(),
                }),
                parts: vec![Part { text: message.content.clone() }],
            })
            .collect()
    }
}

#[async_trait]
impl ConversationFallback for GeminiFallback {
    async fn reply(&self, transcript: &[ChatMessage], hints: &FallbackHints) -> Result<String, FallbackError> {
        if self.api_key.is_empty() {
            return Err(FallbackError::NotConfigured);
        }

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let request_body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system_prompt(hints) }],
            },
            contents: Self::contents(transcript),
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        debug!("Requesting fallback reply from {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Gemini request failed: {} - {}", status, response_text);
            return Err(FallbackError::ApiError {
                message: format!("HTTP {}: {}", status, response_text),
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| FallbackError::ApiError {
                message: format!("Failed to parse generateContent response: {}", e),
            })?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect::<String>())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(FallbackError::EmptyResponse);
        }

        info!("Fallback reply generated ({} chars)", text.len());
        Ok(text)
    }
}

pub fn system_prompt(hints: &FallbackHints) -> String {
    let audience = if hints.authenticated {
        format!(
            "You are talking to {}{}.",
            hints.patient_name.as_deref().unwrap_or("a patient"),
            if hints.has_family_members { " who has family members registered with us" } else { "" }
        )
    } else {
        "You are talking to a new patient.".to_string()
    };

    let family_context = if hints.has_family_members {
        "- Patient has registered family members\n\
         - Can schedule back-to-back appointments for family\n\
         - Actively suggest family scheduling when appropriate"
    } else {
        "- No family members registered yet\n\
         - Suggest adding family members when family-related keywords are used"
    };

    let mut session = Vec::new();
    if hints.is_verified {
        session.push("- The patient's identity has already been verified");
    }
    if hints.has_appointments {
        session.push("- The patient has upcoming appointments");
    }
    if hints.is_rescheduling {
        session.push("- The patient is currently rescheduling an appointment");
    }

    format!(
        "You are a dental practice assistant chatbot. {audience}

Practice Information:
- Hours: Monday-Saturday, 8am-6pm
- Services: Cleanings, General Checkups, Emergency Care
- Insurance: Accepts all major dental insurance plans
- Location: Available upon request

Your role is to:
1. Help patients schedule appointments
2. Answer questions about services and insurance
3. Handle emergency situations with urgency
4. Maintain a friendly, professional tone

Important rules:
- When verifying patient identity, always ask for:
  * Full name (as registered with us)
  * Phone number (10 digits)
  * Date of birth (YYYY-MM-DD)
- For emergencies, express urgency and care
- Guide new patients through registration
- Be concise but thorough
- For appointment cancellations, always ask for verification first

Family Booking Context:
{family_context}
{session}
Verification format instructions:
- Ask patients to provide their information in this exact format:
  [Full Name], [10-digit phone], [YYYY-MM-DD]
- Example: \"John Smith, 1234567890, 1990-01-01\"",
        session = if session.is_empty() {
            String::new()
        } else {
            format!("\nSession:\n{}\n", session.join("\n"))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_assistant_turns_are_dropped() {
        let transcript = vec![
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("How can I help?"),
            ChatMessage::user("Do you do whitening?"),
        ];

        let contents = GeminiFallback::contents(&transcript);
        let roles: Vec<_> = contents.iter().filter_map(|c| c.role.as_deref()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_system_prompt_reflects_hints() {
        let anonymous = system_prompt(&FallbackHints::default());
        assert!(anonymous.contains("You are talking to a new patient."));
        assert!(anonymous.contains("No family members registered yet"));

        let known = system_prompt(&FallbackHints {
            authenticated: true,
            patient_name: Some("Ann Lee".to_string()),
            has_family_members: true,
            is_rescheduling: true,
            ..Default::default()
        });
        assert!(known.contains("You are talking to Ann Lee who has family members registered with us."));
        assert!(known.contains("currently rescheduling"));
    }
}
