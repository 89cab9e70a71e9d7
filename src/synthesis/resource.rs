//! The expensive, non-reentrant synthesis capability.
//!
//! A [`SynthesisResource`] is owned by exactly one [`SynthesisWorker`] and is
//! only ever called from that worker's thread. `&mut self` keeps it that way.
//!
//! [`SynthesisWorker`]: crate::worker::SynthesisWorker

use std::collections::HashSet;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use super::SynthesisTask;
use super::error::SynthesisError;
use crate::state_machine::SynthesisOutput;

/// Blocking text-to-audio conversion bound to a single model/device.
pub trait SynthesisResource: Send + 'static {
    fn synthesize(&mut self, task: &SynthesisTask) -> Result<SynthesisOutput, SynthesisError>;
}

impl<F> SynthesisResource for F
where
    F: FnMut(&SynthesisTask) -> Result<SynthesisOutput, SynthesisError> + Send + 'static,
{
    fn synthesize(&mut self, task: &SynthesisTask) -> Result<SynthesisOutput, SynthesisError> {
        self(task)
    }
}

pub const SAMPLE_RATE: u32 = 24_000;

/// Stand-in model used by the demo and local runs.
///
/// Blocks for a fixed latency per call and describes a mono 16-bit WAV whose
/// length follows the text. Nothing is written to disk.
#[derive(Debug, Clone)]
pub struct SimulatedResource {
    latency: Duration,
    voices: HashSet<String>,
    output_dir: PathBuf,
}

impl SimulatedResource {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            voices: HashSet::new(),
            output_dir: PathBuf::from("output"),
        }
    }

    /// Restrict the voices this model has loaded; others yield `NotFound`.
    pub fn with_voices<I, S>(mut self, voices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.voices = voices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

impl SynthesisResource for SimulatedResource {
    fn synthesize(&mut self, task: &SynthesisTask) -> Result<SynthesisOutput, SynthesisError> {
        let input = &task.input;
        if !self.voices.is_empty() && !self.voices.contains(&input.voice) {
            return Err(SynthesisError::NotFound(format!(
                "voice '{}' is not loaded",
                input.voice
            )));
        }
        if input.text.trim().is_empty() {
            return Err(SynthesisError::Other("empty text".into()));
        }

        let started = Instant::now();
        thread::sleep(self.latency);

        // Roughly 15 characters of speech per second.
        let text_length = input.text.chars().count();
        let audio_duration = (text_length as f64 / 15.0).max(0.1);
        let samples = (audio_duration * SAMPLE_RATE as f64) as u64;
        let audio_name = format!(
            "{}_{}_{}.wav",
            Utc::now().timestamp(),
            input.voice,
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let audio_path = self
            .output_dir
            .join(task.owner.kind())
            .join(task.owner.id())
            .join(&audio_name);

        Ok(SynthesisOutput {
            audio_path: audio_path.to_string_lossy().into_owned(),
            file_url: String::new(),
            delete_url: String::new(),
            audio_name,
            audio_size: 44 + samples * 2,
            audio_duration,
            generation_time: started.elapsed().as_secs_f64(),
            mime_type: "audio/wav".into(),
            sample_rate: SAMPLE_RATE,
            language: input.language.clone(),
            preset: input.preset.clone(),
            text_length,
            voice_name: input.voice.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{Requester, SynthesisInput};
    use crate::synthesis::SynthesisErrorKind;

    fn task(voice: &str, text: &str) -> SynthesisTask {
        SynthesisTask {
            job_id: "j".into(),
            owner: Requester::User("42".into()),
            input: SynthesisInput::new(text, "en", voice),
        }
    }

    #[test]
    fn produces_wav_metadata() {
        let mut res = SimulatedResource::new(Duration::ZERO).with_output_dir("out");
        let out = res.synthesize(&task("narrator-en", "fifteen chars!!")).unwrap();
        assert_eq!(out.mime_type, "audio/wav");
        assert_eq!(out.sample_rate, SAMPLE_RATE);
        assert_eq!(out.text_length, 15);
        assert!((out.audio_duration - 1.0).abs() < 1e-9);
        assert_eq!(out.audio_size, 44 + 48_000);
        assert!(out.audio_path.starts_with("out"));
        assert!(out.audio_path.contains("42"));
        assert!(out.audio_name.ends_with(".wav"));
        assert!(out.audio_name.contains("narrator-en"));
    }

    #[test]
    fn unknown_voice_is_not_found() {
        let mut res = SimulatedResource::new(Duration::ZERO).with_voices(["narrator-en"]);
        let err = res.synthesize(&task("someone-else", "hi")).unwrap_err();
        assert_eq!(err.kind(), SynthesisErrorKind::NotFound);
    }

    #[test]
    fn latency_is_applied() {
        let mut res = SimulatedResource::new(Duration::from_millis(30));
        let started = Instant::now();
        res.synthesize(&task("v", "hi")).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn closures_are_resources() {
        let mut calls = 0u32;
        let mut res = move |_: &SynthesisTask| {
            calls += 1;
            Err::<SynthesisOutput, _>(SynthesisError::Transient(format!("call {calls}")))
        };
        let err = SynthesisResource::synthesize(&mut res, &task("v", "hi")).unwrap_err();
        assert_eq!(err.to_string(), "transient failure: call 1");
    }
}
