use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::RelayError;
use crate::llm::build_http_client;
use crate::transcribe::{transcribe_audio, WhisperRequest};
use crate::upload::AudioClip;

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Option<AudioClip>) -> Result<String, RelayError>;
}

pub fn create_transcriber(config: &Config) -> Result<Box<dyn Transcriber>, RelayError> {
    Ok(Box::new(WhisperTranscriber::new(config)?))
}

/// Speech-to-text through an OpenAI-compatible Whisper endpoint.
pub struct WhisperTranscriber {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl WhisperTranscriber {
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        Ok(WhisperTranscriber {
            http: build_http_client(config)?,
            api_key: config.api_key.clone(),
            model: config.transcription_model.clone(),
            endpoint: format!("{}/audio/transcriptions", config.api_root()),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: Option<AudioClip>) -> Result<String, RelayError> {
        let clip = audio.ok_or_else(|| RelayError::InvalidInput("No audio data provided".into()))?;
        if clip.bytes.is_empty() {
            return Err(RelayError::InvalidInput("Audio upload is empty".into()));
        }

        let size = clip.bytes.len();
        let text = transcribe_audio(
            &self.http,
            WhisperRequest {
                endpoint: &self.endpoint,
                api_key: &self.api_key,
                model: &self.model,
                file_name: &clip.file_name,
                mime_type: &clip.mime_type,
                audio: clip.bytes,
            },
        )
        .await
        .map_err(RelayError::RemoteService)?;

        info!(
            model = %self.model,
            bytes = size,
            chars = text.chars().count(),
            "Transcribed audio"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcriber() -> WhisperTranscriber {
        let mut config = Config::test_defaults();
        // Nothing listens here; any network attempt fails with RemoteService.
        config.api_base_url = "http://127.0.0.1:9".into();
        WhisperTranscriber::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_missing_audio_is_invalid_input() {
        let err = transcriber().transcribe(None).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
        assert!(err.to_string().contains("No audio data provided"));
    }

    #[tokio::test]
    async fn test_empty_audio_is_invalid_input() {
        let clip = AudioClip {
            file_name: "a.mp3".into(),
            mime_type: "audio/mpeg".into(),
            bytes: vec![],
        };
        let err = transcriber().transcribe(Some(clip)).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_network_failure_is_remote_error() {
        let clip = AudioClip {
            file_name: "a.mp3".into(),
            mime_type: "audio/mpeg".into(),
            bytes: vec![0xFF, 0xFB],
        };
        let err = transcriber().transcribe(Some(clip)).await.unwrap_err();
        assert!(matches!(err, RelayError::RemoteService(_)));
    }

    #[test]
    fn test_endpoint_and_model_from_config() {
        let mut config = Config::test_defaults();
        config.transcription_model = "whisper-large".into();
        let t = WhisperTranscriber::new(&config).unwrap();
        assert_eq!(t.endpoint, "https://api.openai.com/v1/audio/transcriptions");
        assert_eq!(t.model, "whisper-large");
    }
}
