use std::env;
use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    /// Fixed UTC offset of the practice; calendar days and clock times are read in it.
    pub practice_utc_offset_minutes: i32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            gemini_api_key: env::var("GEMINI_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("GEMINI_API_KEY not set, conversational fallback disabled");
                    String::new()
                }),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            practice_utc_offset_minutes: env::var("PRACTICE_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|raw| match raw.parse::<i32>() {
                    Ok(minutes) => Some(minutes),
                    Err(_) => {
                        warn!("PRACTICE_UTC_OFFSET_MINUTES is not a number ({}), using UTC", raw);
                        None
                    }
                })
                .unwrap_or(0),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_fallback_configured(&self) -> bool {
        !self.gemini_api_key.is_empty()
            && !self.gemini_model.is_empty()
            && !self.gemini_base_url.is_empty()
    }

    /// Out-of-range offsets fall back to UTC.
    pub fn practice_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.practice_utc_offset_minutes * 60)
            .unwrap_or_else(|| {
                warn!("Practice offset {} minutes out of range, using UTC", self.practice_utc_offset_minutes);
                Utc.fix()
            })
    }
}
