//! Provider selection and credentials.
//!
//! Stored as JSON in the `app_settings` table and re-read on every provider
//! call, so switching backends or rotating a key takes effect immediately.
//! Environment variables only seed the defaults used when nothing is stored.

use serde::{Deserialize, Serialize};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.0-generate-001";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    /// Offline backend producing deterministic placeholder artifacts
    #[default]
    Dryrun,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Dryrun => write!(f, "dryrun"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "dryrun" | "dry_run" | "dry-run" | "offline" => Ok(ProviderKind::Dryrun),
            _ => Err(()),
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_GEMINI_API_BASE.to_string()
}

fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSettings {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: None,
            api_base: default_api_base(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            video_model: default_video_model(),
        }
    }
}

impl ProviderSettings {
    /// Defaults seeded from `VITRINE_PROVIDER`, `GEMINI_API_KEY`,
    /// `GEMINI_API_BASE` and `GEMINI_{TEXT,IMAGE,VIDEO}_MODEL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let api_key = non_empty("GEMINI_API_KEY");

        let provider = match non_empty("VITRINE_PROVIDER") {
            Some(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %value, "Unknown VITRINE_PROVIDER, using dryrun");
                ProviderKind::Dryrun
            }),
            None if api_key.is_some() => ProviderKind::Gemini,
            None => ProviderKind::Dryrun,
        };

        Self {
            provider,
            api_key,
            api_base: non_empty("GEMINI_API_BASE").unwrap_or_else(default_api_base),
            text_model: non_empty("GEMINI_TEXT_MODEL").unwrap_or_else(default_text_model),
            image_model: non_empty("GEMINI_IMAGE_MODEL").unwrap_or_else(default_image_model),
            video_model: non_empty("GEMINI_VIDEO_MODEL").unwrap_or_else(default_video_model),
        }
    }

    /// Copy safe to return over HTTP: the key is reduced to its last 4 chars.
    pub fn redacted(&self) -> Self {
        let api_key = self.api_key.as_ref().map(|key| {
            let tail: String = key
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{tail}")
        });
        Self {
            api_key,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn api_key_alone_selects_gemini() {
        let settings = ProviderSettings::from_lookup(lookup(&[("GEMINI_API_KEY", "abc123")]));
        assert_eq!(settings.provider, ProviderKind::Gemini);
        assert_eq!(settings.api_key.as_deref(), Some("abc123"));
        assert_eq!(settings.api_base, DEFAULT_GEMINI_API_BASE);
    }

    #[test]
    fn explicit_provider_wins() {
        let settings = ProviderSettings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "abc123"),
            ("VITRINE_PROVIDER", "dryrun"),
            ("GEMINI_VIDEO_MODEL", "veo-custom"),
        ]));
        assert_eq!(settings.provider, ProviderKind::Dryrun);
        assert_eq!(settings.video_model, "veo-custom");
    }

    #[test]
    fn nothing_configured_means_dryrun() {
        let settings = ProviderSettings::from_lookup(lookup(&[]));
        assert_eq!(settings, ProviderSettings::default());
    }

    #[test]
    fn redaction_keeps_only_the_tail() {
        let settings = ProviderSettings {
            api_key: Some("secret-key-9876".into()),
            ..Default::default()
        };
        assert_eq!(settings.redacted().api_key.as_deref(), Some("****9876"));
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let settings: ProviderSettings = serde_json::from_str(r#"{"provider":"gemini"}"#).unwrap();
        assert_eq!(settings.provider, ProviderKind::Gemini);
        assert_eq!(settings.image_model, DEFAULT_IMAGE_MODEL);
    }
}
