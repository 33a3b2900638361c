//! Speech to Text client for voice-entered expenses

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Config, SpeechSettings};
use crate::error::{Error, Result, TransportStage};

use super::watsonx::{build_http_client, check_status, exchange_token};

/// Transcribes recorded audio into text
pub struct SpeechTranscriber {
    http: Client,
    iam_url: String,
    url: String,
    model: String,
    api_key: String,
}

impl SpeechTranscriber {
    pub fn new(
        settings: &SpeechSettings,
        iam_url: &str,
        timeout: Duration,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            iam_url: iam_url.to_string(),
            url: settings.url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: api_key.into(),
        })
    }

    /// Build from configuration; fails if no speech API key is set
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.speech_api_key()?;
        Self::new(
            &config.speech,
            &config.watsonx.iam_url,
            config.watsonx.timeout,
            api_key,
        )
    }

    /// Transcribe `audio` (e.g. `audio/wav`, `audio/webm`)
    ///
    /// The best alternative of every result segment is joined into one string.
    pub async fn transcribe(&self, audio: &[u8], content_type: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::InvalidData("Audio recording is empty".into()));
        }

        let token = exchange_token(&self.http, &self.iam_url, &self.api_key).await?;

        let response = self
            .http
            .post(format!("{}/v1/recognize", self.url))
            .query(&[("model", self.model.as_str())])
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| Error::from_reqwest(TransportStage::Speech, e))?;

        let body: RecognizeResponse = check_status(response, TransportStage::Speech)
            .await?
            .json()
            .await
            .map_err(|e| Error::from_reqwest(TransportStage::Speech, e))?;

        let transcript = join_transcript(&body);
        debug!(segments = body.results.len(), "Speech recognition response");
        if transcript.is_empty() {
            return Err(Error::NoSpeech);
        }

        info!(chars = transcript.len(), "Audio transcribed");
        Ok(transcript)
    }
}

fn join_transcript(body: &RecognizeResponse) -> String {
    body.results
        .iter()
        .filter_map(|r| r.alternatives.first())
        .map(|a| a.transcript.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognizeResult>,
}

#[derive(Debug, Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockReply, MockWatsonxServer, MOCK_API_KEY};

    fn transcriber(server: &MockWatsonxServer, api_key: &str) -> SpeechTranscriber {
        let settings = SpeechSettings {
            url: server.url(),
            model: "en-US_BroadbandModel".to_string(),
        };
        SpeechTranscriber::new(&settings, &server.iam_url(), Duration::from_secs(5), api_key)
            .unwrap()
    }

    #[test]
    fn test_join_transcript_uses_first_alternative() {
        let body: RecognizeResponse = serde_json::from_str(
            r#"{"results": [
                {"alternatives": [{"transcript": "spent twelve dollars at "}, {"transcript": "ignored"}]},
                {"alternatives": []},
                {"alternatives": [{"transcript": "the cafe "}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(join_transcript(&body), "spent twelve dollars at the cafe");
    }

    #[tokio::test]
    async fn test_transcribe_round_trip() {
        let server = MockWatsonxServer::start().await;
        server.set_speech(MockReply::text("forty dollars for gas"));

        let text = transcriber(&server, MOCK_API_KEY)
            .transcribe(b"RIFF....WAVE", "audio/wav")
            .await
            .unwrap();
        assert_eq!(text, "forty dollars for gas");

        let requests = server.requests();
        let recognize = requests.iter().find(|r| r.path == "/v1/recognize").unwrap();
        assert_eq!(recognize.query.as_deref(), Some("model=en-US_BroadbandModel"));
        assert_eq!(recognize.content_type.as_deref(), Some("audio/wav"));
    }

    #[tokio::test]
    async fn test_silence_is_no_speech() {
        let server = MockWatsonxServer::start().await;
        server.set_speech(MockReply::text(""));

        let err = transcriber(&server, MOCK_API_KEY)
            .transcribe(b"RIFF....WAVE", "audio/wav")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSpeech));
    }

    #[tokio::test]
    async fn test_speech_failure_stage() {
        let server = MockWatsonxServer::start().await;
        server.set_speech(MockReply::status(415, "unsupported audio"));

        let err = transcriber(&server, MOCK_API_KEY)
            .transcribe(b"xx", "audio/flac")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                stage: TransportStage::Speech,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_audio_rejected_without_network() {
        let server = MockWatsonxServer::start().await;
        let err = transcriber(&server, MOCK_API_KEY)
            .transcribe(&[], "audio/wav")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(server.requests().is_empty());
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = Config::embedded().unwrap();
        assert!(matches!(
            SpeechTranscriber::from_config(&config),
            Err(Error::Credentials(_))
        ));
    }
}
