use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use tracing::{debug, info, warn};

use super::messages::{
    CreateMessage, CreateRun, MessageList, Run, RunStatus, SpeechRequest, Thread,
};
use crate::audio::{AudioPayload, SpeechAudio};
use crate::config::OpenAiConfig;
use crate::error::TurnError;
use crate::turn::{Assistant, AssistantReply, ConversationHandle, SpeechSynthesizer, Transcriber};

/// Client for the OpenAI audio and Assistants endpoints
///
/// Implements the transcription, assistant and speech ports.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            bail!("OpenAI API key required (set openai.api_key or OPENAI_API_KEY)");
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("loqa-voice/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.config.api_key)
    }

    fn assistants(&self, request: RequestBuilder) -> RequestBuilder {
        self.authed(request).header("OpenAI-Beta", "assistants=v2")
    }

    /// Upload a WAV file for transcription
    pub async fn transcribe_wav(&self, wav: Vec<u8>) -> Result<String> {
        debug!("Uploading {} bytes for transcription", wav.len());

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")?;

        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.config.transcription_model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", "text");

        let response = self
            .authed(self.http.post(self.url("/audio/transcriptions")))
            .multipart(form)
            .send()
            .await
            .context("Transcription request failed")?;

        let text = ensure_success(response, "Transcription")
            .await?
            .text()
            .await
            .context("Failed to read transcription")?;

        Ok(text.trim().to_string())
    }

    pub async fn create_thread(&self) -> Result<String> {
        let response = self
            .assistants(self.http.post(self.url("/threads")))
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Create thread request failed")?;

        let thread: Thread = ensure_success(response, "Create thread")
            .await?
            .json()
            .await
            .context("Invalid thread response")?;

        info!("Created conversation thread {}", thread.id);
        Ok(thread.id)
    }

    pub async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let body = CreateMessage {
            role: "user",
            content: text,
        };

        let response = self
            .assistants(self.http.post(self.url(&format!("/threads/{}/messages", thread_id))))
            .json(&body)
            .send()
            .await
            .context("Create message request failed")?;

        ensure_success(response, "Create message").await?;
        Ok(())
    }

    pub async fn create_run(&self, thread_id: &str) -> Result<Run> {
        let body = CreateRun {
            assistant_id: &self.config.assistant_id,
        };

        let response = self
            .assistants(self.http.post(self.url(&format!("/threads/{}/runs", thread_id))))
            .json(&body)
            .send()
            .await
            .context("Create run request failed")?;

        ensure_success(response, "Create run")
            .await?
            .json()
            .await
            .context("Invalid run response")
    }

    pub async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let response = self
            .assistants(
                self.http
                    .get(self.url(&format!("/threads/{}/runs/{}", thread_id, run_id))),
            )
            .send()
            .await
            .context("Retrieve run request failed")?;

        ensure_success(response, "Retrieve run")
            .await?
            .json()
            .await
            .context("Invalid run response")
    }

    /// Newest assistant message text on the thread, if any
    pub async fn latest_reply(&self, thread_id: &str) -> Result<Option<String>> {
        let response = self
            .assistants(self.http.get(self.url(&format!("/threads/{}/messages", thread_id))))
            .query(&[("order", "desc")])
            .send()
            .await
            .context("List messages request failed")?;

        let messages: MessageList = ensure_success(response, "List messages")
            .await?
            .json()
            .await
            .context("Invalid message list")?;

        Ok(messages.latest_assistant_text())
    }

    /// Poll a run until it finishes or the attempts run out
    async fn await_run(&self, thread_id: &str, mut run: Run) -> Result<(), TurnError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        for attempt in 0..=self.config.max_poll_attempts {
            if run.status == RunStatus::Completed {
                debug!("Run {} completed after {} polls", run.id, attempt);
                return Ok(());
            }

            if run.status.is_failure() {
                let reason = run
                    .last_error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "Unknown error".to_string());
                return Err(TurnError::AssistantFailed(format!(
                    "run {:?}: {}",
                    run.status, reason
                )));
            }

            if attempt == self.config.max_poll_attempts {
                break;
            }

            tokio::time::sleep(interval).await;
            run = self
                .retrieve_run(thread_id, &run.id)
                .await
                .map_err(assistant_failed)?;
        }

        warn!(
            "Run {} still {:?} after {} polls",
            run.id, run.status, self.config.max_poll_attempts
        );
        let waited = interval * self.config.max_poll_attempts;
        Err(TurnError::AssistantTimeout(waited.as_secs()))
    }

    /// Request synthesized speech as MP3
    pub async fn speech(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            bail!("Nothing to synthesize");
        }

        let body = SpeechRequest {
            model: &self.config.speech_model,
            input: text,
            voice,
            speed: self.config.speed,
        };

        let response = self
            .authed(self.http.post(self.url("/audio/speech")))
            .json(&body)
            .send()
            .await
            .context("Speech request failed")?;

        let bytes = ensure_success(response, "Speech")
            .await?
            .bytes()
            .await
            .context("Failed to read speech audio")?;

        Ok(bytes.to_vec())
    }
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    bail!("{} returned {}: {}", what, status, body)
}

fn assistant_failed(e: anyhow::Error) -> TurnError {
    TurnError::AssistantFailed(format!("{:#}", e))
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, payload: &AudioPayload) -> Result<String, TurnError> {
        let wav = payload
            .to_wav()
            .map_err(|e| TurnError::TranscriptionFailed(format!("{:#}", e)))?;

        self.transcribe_wav(wav)
            .await
            .map_err(|e| TurnError::TranscriptionFailed(format!("{:#}", e)))
    }
}

#[async_trait]
impl Assistant for OpenAiClient {
    async fn exchange(
        &self,
        text: &str,
        handle: Option<&ConversationHandle>,
    ) -> Result<AssistantReply, TurnError> {
        if self.config.assistant_id.is_empty() {
            return Err(TurnError::AssistantFailed(
                "no assistant id configured".to_string(),
            ));
        }

        let thread_id = match handle {
            Some(handle) => handle.as_str().to_string(),
            None => self.create_thread().await.map_err(assistant_failed)?,
        };

        self.add_user_message(&thread_id, text)
            .await
            .map_err(assistant_failed)?;
        let run = self.create_run(&thread_id).await.map_err(assistant_failed)?;
        self.await_run(&thread_id, run).await?;

        let reply = self
            .latest_reply(&thread_id)
            .await
            .map_err(assistant_failed)?
            .ok_or_else(|| TurnError::AssistantFailed("no assistant message found".to_string()))?;

        Ok(AssistantReply {
            text: reply,
            handle: ConversationHandle::new(thread_id),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SpeechAudio, TurnError> {
        let bytes = self
            .speech(text, voice)
            .await
            .map_err(|e| TurnError::SynthesisFailed(format!("{:#}", e)))?;

        Ok(SpeechAudio::new(bytes, "audio/mpeg"))
    }
}
