use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, info, instrument};
use warp::hyper::body::Bytes;

use crate::types::TranscriptionResponse;

/// The transcription model expects 16 kHz mono audio.
pub const SAMPLE_RATE: u32 = 16_000;

/// Multipart field carrying audio, both on upload and when forwarded.
pub const AUDIO_FIELD: &str = "audio_file";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("Transcription backend is not configured")]
    NotConfigured,
    #[error("Transcription request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Transcription backend returned {status}: {message}")]
    Upstream { status: u16, message: String },
}

/// Decodes 16-bit little-endian PCM into samples in `-1.0..1.0`. A trailing
/// odd byte is ignored.
pub fn pcm16_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

pub fn mean_amplitude(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
}

pub fn is_silent(samples: &[f32], threshold: f32) -> bool {
    mean_amplitude(samples) < threshold
}

pub fn duration_secs(samples: &[f32]) -> f32 {
    samples.len() as f32 / SAMPLE_RATE as f32
}

/// Forwards recorded audio to an external speech-to-text service.
pub struct Transcriber {
    endpoint: Option<String>,
    silence_threshold: f32,
    client: Client,
}

impl Transcriber {
    pub fn new(endpoint: Option<String>, silence_threshold: f32) -> Result<Self, TranscribeError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            endpoint: endpoint.map(|url| url.trim_end_matches('/').to_string()),
            silence_threshold,
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    #[instrument(skip_all, fields(bytes = audio.len()))]
    pub async fn transcribe(
        &self,
        audio: Bytes,
        content_type: Option<&str>,
    ) -> Result<TranscriptionResponse, TranscribeError> {
        self.forward("/transcribe", audio, content_type).await
    }

    /// Raw PCM that is silent is answered locally.
    #[instrument(skip_all, fields(bytes = audio.len()))]
    pub async fn transcribe_raw(&self, audio: Bytes) -> Result<TranscriptionResponse, TranscribeError> {
        if !self.is_configured() {
            return Err(TranscribeError::NotConfigured);
        }

        let samples = pcm16_to_samples(&audio);
        if is_silent(&samples, self.silence_threshold) {
            info!(
                "Skipping {:.1}s of silent audio (mean amplitude {:.4})",
                duration_secs(&samples),
                mean_amplitude(&samples)
            );
            return Ok(TranscriptionResponse {
                text: String::new(),
                success: true,
            });
        }

        self.forward("/transcribe/raw", audio, Some("application/octet-stream"))
            .await
    }

    async fn forward(
        &self,
        path: &str,
        audio: Bytes,
        content_type: Option<&str>,
    ) -> Result<TranscriptionResponse, TranscribeError> {
        let endpoint = self.endpoint.as_ref().ok_or(TranscribeError::NotConfigured)?;
        let url = format!("{}{}", endpoint, path);
        debug!("Forwarding audio to: {}", url);

        let mut part = Part::bytes(audio.to_vec()).file_name("audio");
        if let Some(content_type) = content_type {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new().part(AUDIO_FIELD, part);

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let transcription: TranscriptionResponse = response.json().await?;
        Ok(TranscriptionResponse {
            text: transcription.text.trim().to_string(),
            success: transcription.success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_pcm16_to_samples() {
        let samples = pcm16_to_samples(&pcm(&[0, 16384, -32768, 32767]));
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[2], -1.0);
        assert!(samples[3] < 1.0);
    }

    #[test]
    fn test_odd_trailing_byte_is_ignored() {
        let mut bytes = pcm(&[100, 200]);
        bytes.push(7);
        assert_eq!(pcm16_to_samples(&bytes).len(), 2);
    }

    #[test]
    fn test_silence_detection() {
        let quiet = pcm16_to_samples(&pcm(&[10, -10, 20, -20]));
        assert!(is_silent(&quiet, 0.01));
        let speech = pcm16_to_samples(&pcm(&[8000, -9000, 12000, -7000]));
        assert!(!is_silent(&speech, 0.01));
        assert!(is_silent(&[], 0.01));
    }

    #[test]
    fn test_duration() {
        let samples = vec![0.0; SAMPLE_RATE as usize * 2];
        assert_eq!(duration_secs(&samples), 2.0);
    }

    #[tokio::test]
    async fn test_not_configured() {
        let transcriber = Transcriber::new(None, 0.01).unwrap();
        assert!(!transcriber.is_configured());
        let result = transcriber.transcribe(Bytes::from_static(b"RIFF"), None).await;
        assert!(matches!(result, Err(TranscribeError::NotConfigured)));
        let result = transcriber.transcribe_raw(Bytes::new()).await;
        assert!(matches!(result, Err(TranscribeError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_silent_raw_audio_is_not_forwarded() {
        // Port 9 is discard; reaching the network would fail the test.
        let transcriber = Transcriber::new(Some(String::from("http://127.0.0.1:9/")), 0.01).unwrap();
        let result = transcriber
            .transcribe_raw(Bytes::from(pcm(&[0; 1600])))
            .await
            .unwrap();
        assert_eq!(
            result,
            TranscriptionResponse {
                text: String::new(),
                success: true
            }
        );
    }
}
