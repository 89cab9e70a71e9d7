//! Creation-time preconditions.
//!
//! The orchestrator consults a [`PreconditionChecker`] once per `create_job`.
//! [`VoiceRegistry`] is the in-process implementation: a catalogue of voices
//! with an owner, a language, a default flag and a readiness status.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state_machine::Requester;

/// Narrow view of the entities a job may reference.
pub trait PreconditionChecker: Send + Sync {
    fn voice_exists(&self, voice: &str) -> bool;

    /// Whether the voice has finished preparing and may be used.
    fn is_ready(&self, voice: &str) -> bool;

    fn ownership_valid(&self, voice: &str, requester: &Requester) -> bool;

    /// Voice used when a request names none.
    fn default_voice_for(&self, language: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStatus {
    #[default]
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub language: String,
    /// Owning user id. `None` for shared voices.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub status: VoiceStatus,
}

impl Voice {
    /// A ready, shared voice usable by anyone.
    pub fn default_for(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            owner: None,
            is_default: true,
            status: VoiceStatus::Ready,
        }
    }

    /// A user's own voice, still being prepared.
    pub fn custom(name: impl Into<String>, language: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            owner: Some(owner.into()),
            is_default: false,
            status: VoiceStatus::Pending,
        }
    }
}

#[derive(Debug, Default)]
pub struct VoiceRegistry {
    voices: RwLock<BTreeMap<String, Voice>>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: impl IntoIterator<Item = Voice>) -> Self {
        let registry = Self::new();
        for voice in voices {
            registry.register(voice);
        }
        registry
    }

    pub fn register(&self, voice: Voice) {
        let mut voices = self.voices.write().unwrap_or_else(PoisonError::into_inner);
        voices.insert(voice.name.clone(), voice);
    }

    pub fn get(&self, name: &str) -> Option<Voice> {
        let voices = self.voices.read().unwrap_or_else(PoisonError::into_inner);
        voices.get(name).cloned()
    }

    pub fn list(&self) -> Vec<Voice> {
        let voices = self.voices.read().unwrap_or_else(PoisonError::into_inner);
        voices.values().cloned().collect()
    }

    pub fn mark_ready(&self, name: &str) -> bool {
        self.set_status(name, VoiceStatus::Ready)
    }

    pub fn mark_failed(&self, name: &str) -> bool {
        self.set_status(name, VoiceStatus::Failed)
    }

    fn set_status(&self, name: &str, status: VoiceStatus) -> bool {
        let mut voices = self.voices.write().unwrap_or_else(PoisonError::into_inner);
        match voices.get_mut(name) {
            Some(voice) => {
                voice.status = status;
                info!(voice = name, ?status, "voice status updated");
                true
            }
            None => false,
        }
    }
}

impl PreconditionChecker for VoiceRegistry {
    fn voice_exists(&self, voice: &str) -> bool {
        self.get(voice).is_some()
    }

    fn is_ready(&self, voice: &str) -> bool {
        self.get(voice)
            .is_some_and(|v| v.status == VoiceStatus::Ready)
    }

    fn ownership_valid(&self, voice: &str, requester: &Requester) -> bool {
        let Some(voice) = self.get(voice) else {
            return false;
        };
        if voice.is_default {
            return true;
        }
        match requester {
            Requester::Guest(_) => false,
            Requester::User(id) => voice.owner.as_deref() == Some(id.as_str()),
        }
    }

    fn default_voice_for(&self, language: &str) -> Option<String> {
        let voices = self.voices.read().unwrap_or_else(PoisonError::into_inner);
        voices
            .values()
            .find(|v| v.is_default && v.language == language)
            .map(|v| v.name.clone())
    }
}
