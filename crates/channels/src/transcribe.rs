//! Voice and audio transcription.

use std::path::Path;

use async_trait::async_trait;
use proto::MediaError;
use serde::Deserialize;
use tracing::debug;

/// Turns a downloaded audio file into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes the file, returning `None` when the result is empty.
    async fn transcribe(&self, path: &Path) -> Result<Option<String>, MediaError>;
}

/// Default endpoint of an OpenAI-compatible transcription service.
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Default transcription model.
const DEFAULT_MODEL: &str = "whisper-large-v3";

/// Whisper-style transcription over an OpenAI-compatible HTTP endpoint.
pub struct WhisperTranscriber {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperTranscriber {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Overrides the service endpoint (trailing slash stripped).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn audio_mime(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ogg") | Some("oga") => "audio/ogg",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("wav") => "audio/wav",
            _ => "application/octet-stream",
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<Option<String>, MediaError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.ogg")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(Self::audio_mime(path))
            .map_err(|e| MediaError::TranscriptionFailed(format!("invalid mime: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::TranscriptionFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::TranscriptionFailed(format!(
                "service returned {status}: {body}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| MediaError::TranscriptionFailed(format!("bad response body: {e}")))?;

        let text = parsed.text.trim().to_string();
        debug!("Transcribed {} chars from {}", text.len(), path.display());
        Ok(if text.is_empty() { None } else { Some(text) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_mime_follows_extension() {
        assert_eq!(
            WhisperTranscriber::audio_mime(Path::new("/tmp/a.ogg")),
            "audio/ogg"
        );
        assert_eq!(
            WhisperTranscriber::audio_mime(Path::new("/tmp/a.mp3")),
            "audio/mpeg"
        );
        assert_eq!(
            WhisperTranscriber::audio_mime(Path::new("/tmp/a.bin")),
            "application/octet-stream"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let t = WhisperTranscriber::new("key").with_base_url("https://api.example.com/v1/");
        assert_eq!(t.base_url, "https://api.example.com/v1");
    }
}
