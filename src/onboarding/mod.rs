//! Onboarding configuration
//!
//! Maps raw quiz answers to a persisted configuration record. The mapping
//! itself is a pure function; persistence (one local JSON key) and remote
//! submission are best-effort and independent of each other.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::upload::pipeline::Uploader;

/// File name of the single persisted key
pub const CONFIG_KEY: &str = "onboarding-config.json";

/// Partial mapping of question identifiers (`q1`..`q6`) to free-text
/// option strings
pub type RawAnswers = BTreeMap<String, String>;

/// Derived, total configuration record
///
/// Immutable once computed. Field names follow the server's snake_case
/// contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingConfig {
    pub mode: String,
    pub tone: String,
    pub depth: String,
    pub intervention_type: String,
    pub frequency: String,
    pub audio_enabled: bool,
    /// Original answers, kept for audit
    pub raw_answers: RawAnswers,
}

/// Map raw quiz answers to a configuration record
///
/// Deterministic keyword matching; a missing answer resolves to the
/// catch-all category of its field. No side effects.
pub fn map_answers_to_config(raw: &RawAnswers) -> OnboardingConfig {
    let answer = |key: &str| raw.get(key).map(String::as_str).unwrap_or("");

    // q1: primary goal (keywords are case-sensitive; the option strings are
    // fixed UI copy)
    let q1 = answer("q1");
    let mode = if q1.contains("stress") {
        "stress_management"
    } else if q1.contains("emotions") || q1.contains("mood") {
        "mood_tracking"
    } else if q1.contains("talk") || q1.contains("vent") {
        "companionship"
    } else {
        "demo"
    };

    // q2: preferred tone
    let q2 = answer("q2").to_lowercase();
    let tone = if q2.contains("direct") {
        "direct"
    } else if q2.contains("gentle") || q2.contains("warm") {
        "gentle"
    } else {
        "reflective"
    };

    // q3: conversation depth
    let q3 = answer("q3").to_lowercase();
    let depth = if q3.contains("quick") || q3.contains("light") {
        "light"
    } else if q3.contains("balanced") {
        "balanced"
    } else {
        "deep"
    };

    // q4: preferred intervention
    let q4 = answer("q4").to_lowercase();
    let intervention_type = if q4.contains("breath") {
        "breathing_exercises"
    } else if q4.contains("journal") {
        "journaling_prompts"
    } else if q4.contains("ground") {
        "grounding"
    } else {
        "coping_tips"
    };

    // q5: check-in frequency
    let q5 = answer("q5").to_lowercase();
    let frequency = if q5.contains("week") {
        "weekly"
    } else if q5.contains("once a day") || q5.contains("daily") {
        "daily"
    } else {
        "multiple_daily"
    };

    // q6: voice output opt-in
    let q6 = answer("q6").to_lowercase();
    let audio_enabled = q6.contains("voice") || q6.contains("audio");

    OnboardingConfig {
        mode: mode.to_string(),
        tone: tone.to_string(),
        depth: depth.to_string(),
        intervention_type: intervention_type.to_string(),
        frequency: frequency.to_string(),
        audio_enabled,
        raw_answers: raw.clone(),
    }
}

/// Local persistence for the onboarding config
///
/// One JSON file under the storage directory. Absence of the file is the
/// signal to show onboarding again.
pub struct OnboardingStore {
    path: PathBuf,
}

impl OnboardingStore {
    pub fn new(storage_dir: &Path) -> Self {
        Self {
            path: storage_dir.join(CONFIG_KEY),
        }
    }

    /// Load the persisted config, if one exists
    pub fn load(&self) -> Option<OnboardingConfig> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("Ignoring unreadable onboarding config: {}", err);
                None
            }
        }
    }

    /// Whether onboarding should be shown
    pub fn needs_onboarding(&self) -> bool {
        self.load().is_none()
    }

    /// Write the config. Best-effort: failures are logged, never escalated.
    pub fn save(&self, config: &OnboardingConfig) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(config)?;
            fs::write(&self.path, json)
        };

        match write() {
            Ok(()) => tracing::debug!("Onboarding config saved to {:?}", self.path),
            Err(err) => tracing::warn!("Failed to persist onboarding config: {}", err),
        }
    }
}

/// Map, persist, and submit the quiz answers
///
/// Local write and remote submission are independent best-effort steps; the
/// mapped config is returned regardless of either outcome. A non-2xx from
/// the server means "saved locally only".
pub async fn complete_onboarding(
    raw: RawAnswers,
    store: &OnboardingStore,
    uploader: Arc<dyn Uploader>,
) -> OnboardingConfig {
    let config = map_answers_to_config(&raw);

    store.save(&config);

    if let Err(err) = uploader.submit_config(&config).await {
        tracing::warn!("Onboarding config saved locally only: {}", err);
    }

    config
}
