use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum NarratorError {
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Timed out waiting for job {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl NarratorError {
    /// HTTP-style status an outer web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            NarratorError::Precondition(e) => e.status_code(),
            NarratorError::JobNotFound(_) => 404,
            NarratorError::Timeout(_) => 504,
            _ => 500,
        }
    }
}

/// Creation-time validation failures. No job is created when one is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Voice is not ready for use: {0}")]
    VoiceNotReady(String),

    #[error("Guests cannot use custom voices")]
    GuestCustomVoice,

    #[error("Cannot use another user's voice")]
    ForeignVoice,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Text must not be empty")]
    EmptyText,

    #[error("Invalid requester id '{0}': must be alphanumeric")]
    InvalidRequester(String),
}

impl PreconditionError {
    pub fn status_code(&self) -> u16 {
        match self {
            PreconditionError::VoiceNotFound(_) => 404,
            PreconditionError::GuestCustomVoice | PreconditionError::ForeignVoice => 403,
            PreconditionError::VoiceNotReady(_)
            | PreconditionError::UnsupportedLanguage(_)
            | PreconditionError::EmptyText
            | PreconditionError::InvalidRequester(_) => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_are_client_errors() {
        let all = [
            PreconditionError::VoiceNotFound("v".into()),
            PreconditionError::VoiceNotReady("v".into()),
            PreconditionError::GuestCustomVoice,
            PreconditionError::ForeignVoice,
            PreconditionError::UnsupportedLanguage("fr".into()),
            PreconditionError::EmptyText,
            PreconditionError::InvalidRequester("a b".into()),
        ];
        for e in all {
            assert!((400..500).contains(&e.status_code()), "{e}");
        }
    }

    #[test]
    fn narrator_error_status_codes() {
        assert_eq!(NarratorError::JobNotFound("x".into()).status_code(), 404);
        assert_eq!(
            NarratorError::from(PreconditionError::ForeignVoice).status_code(),
            403
        );
        assert_eq!(NarratorError::Config("bad".into()).status_code(), 500);
    }

    #[test]
    fn precondition_display_is_transparent() {
        let err = NarratorError::from(PreconditionError::GuestCustomVoice);
        assert_eq!(err.to_string(), "Guests cannot use custom voices");
    }
}
