//! Wire payloads for the remote TTS service's `POST /generate_audio`.

use serde::{Deserialize, Serialize};

use super::SynthesisTask;
use crate::state_machine::SynthesisOutput;

/// Request body sent to `/generate_audio`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateAudioRequest {
    pub text: String,
    pub lang: String,
    pub voice_name: String,
    pub user_id: String,
    /// `"user"` or `"guest"`.
    pub user_type: String,
    pub preset: String,
}

impl From<&SynthesisTask> for GenerateAudioRequest {
    fn from(task: &SynthesisTask) -> Self {
        Self {
            text: task.input.text.clone(),
            lang: task.input.language.clone(),
            voice_name: task.input.voice.clone(),
            user_id: task.owner.id().to_string(),
            user_type: task.owner.kind().to_string(),
            preset: task.input.preset.clone(),
        }
    }
}

/// Response body of `/generate_audio`.
///
/// The audio fields land in [`SynthesisOutput`]; the rest is informational.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateAudioResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub output: SynthesisOutput,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{Requester, SynthesisInput};

    #[test]
    fn request_carries_requester_identity() {
        let task = SynthesisTask {
            job_id: "j1".into(),
            owner: Requester::Guest("g7".into()),
            input: SynthesisInput::new("hello", "en", "narrator-en"),
        };
        let req = GenerateAudioRequest::from(&task);
        assert_eq!(req.user_id, "g7");
        assert_eq!(req.user_type, "guest");
        assert_eq!(req.lang, "en");
        assert_eq!(req.voice_name, "narrator-en");
        assert_eq!(req.preset, "ultra_fast");
    }

    #[test]
    fn response_deserialize_from_service_format() {
        let json = r#"{
            "message": "Audio generated successfully",
            "file_url": "http://tts/download/user/42/1_v_ab.wav",
            "delete_url": "http://tts/delete_audio/user/42/1_v_ab.wav",
            "audio_name": "1_v_ab.wav",
            "audio_size": 48044,
            "audio_path": "output/user/42/1_v_ab.wav",
            "generation_time": 1.5,
            "audio_duration": 1.0,
            "audio_wavelength": 1.0,
            "user_type": "user",
            "user_id": "42",
            "voice_name": "v",
            "language": "en",
            "preset": "ultra_fast",
            "timestamp": 1,
            "text_length": 5,
            "mime_type": "audio/wav",
            "sample_rate": 24000
        }"#;
        let resp: GenerateAudioResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.as_deref(), Some("Audio generated successfully"));
        assert_eq!(resp.timestamp, Some(1));
        assert_eq!(resp.output.audio_size, 48044);
        assert_eq!(resp.output.sample_rate, 24000);
        assert_eq!(resp.output.text_length, 5);
        assert_eq!(resp.output.mime_type, "audio/wav");
    }
}
