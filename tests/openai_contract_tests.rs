// Contract tests for the OpenAI adapters
//
// Each test stands up a wiremock server in place of the API and checks the
// requests the adapters send and how responses map onto the port results.

use loqa_voice::audio::{AudioPayload, Fragment};
use loqa_voice::config::OpenAiConfig;
use loqa_voice::turn::{Assistant, ConversationHandle, SpeechSynthesizer, Transcriber};
use loqa_voice::{OpenAiClient, TurnError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new(OpenAiConfig {
        api_key: "test-key".to_string(),
        base_url: server.uri(),
        assistant_id: "asst_123".to_string(),
        poll_interval_ms: 10,
        max_poll_attempts: 3,
        ..OpenAiConfig::default()
    })
    .unwrap()
}

fn payload() -> AudioPayload {
    let samples: Vec<i16> = (0..1600).map(|i| ((i % 100) * 100) as i16).collect();
    AudioPayload::assemble(&[Fragment::from_samples(0, &samples, 0)], 16000, 1)
}

async fn mount_run_flow(server: &MockServer, thread: &str, final_status: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/threads/{}/messages", thread)))
        .and(header("OpenAI-Beta", "assistants=v2"))
        .and(body_partial_json(json!({ "role": "user", "content": "hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/threads/{}/runs", thread)))
        .and(body_partial_json(json!({ "assistant_id": "asst_123" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "run_1", "status": "queued" })),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/threads/{}/runs/run_1", thread)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": final_status,
            "last_error": if final_status == "failed" {
                json!({ "code": "server_error", "message": "model overloaded" })
            } else {
                json!(null)
            }
        })))
        .mount(server)
        .await;
}

async fn mount_reply(server: &MockServer, thread: &str, text: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/threads/{}/messages", thread)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "role": "assistant",
                    "content": [{ "type": "text", "text": { "value": text, "annotations": [] } }]
                },
                {
                    "role": "user",
                    "content": [{ "type": "text", "text": { "value": "hello", "annotations": [] } }]
                }
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_transcription_uploads_wav() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string("你好\n"))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server).transcribe(&payload()).await.unwrap();
    assert_eq!(text, "你好");

    // Verify: multipart body carries the WAV and the text-format options
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("RIFF"));
    assert!(body.contains("whisper-1"));
    assert!(body.contains("response_format"));
    assert!(body.contains("zh"));
}

#[tokio::test]
async fn test_transcription_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server).transcribe(&payload()).await.unwrap_err();

    match err {
        TurnError::TranscriptionFailed(detail) => assert!(detail.contains("500")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_first_exchange_creates_thread() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .and(header("OpenAI-Beta", "assistants=v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_1" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_run_flow(&server, "thread_1", "completed").await;
    mount_reply(&server, "thread_1", "hi there").await;

    let reply = client_for(&server).exchange("hello", None).await.unwrap();

    assert_eq!(reply.text, "hi there");
    assert_eq!(reply.handle.as_str(), "thread_1");
}

#[tokio::test]
async fn test_follow_up_reuses_thread() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "unexpected" })))
        .expect(0)
        .mount(&server)
        .await;
    mount_run_flow(&server, "thread_9", "completed").await;
    mount_reply(&server, "thread_9", "again").await;

    let handle = ConversationHandle::new("thread_9");
    let reply = client_for(&server)
        .exchange("hello", Some(&handle))
        .await
        .unwrap();

    assert_eq!(reply.text, "again");
    assert_eq!(reply.handle, handle);
}

#[tokio::test]
async fn test_failed_run_is_assistant_failed() {
    let server = MockServer::start().await;
    mount_run_flow(&server, "thread_1", "failed").await;

    let handle = ConversationHandle::new("thread_1");
    let err = client_for(&server)
        .exchange("hello", Some(&handle))
        .await
        .unwrap_err();

    match err {
        TurnError::AssistantFailed(detail) => assert!(detail.contains("model overloaded")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_run_that_never_finishes_times_out() {
    let server = MockServer::start().await;
    mount_run_flow(&server, "thread_1", "in_progress").await;

    let handle = ConversationHandle::new("thread_1");
    let err = client_for(&server)
        .exchange("hello", Some(&handle))
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::AssistantTimeout(_)));

    // Verify: one retrieve per allowed poll
    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/threads/thread_1/runs/run_1")
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn test_missing_assistant_message() {
    let server = MockServer::start().await;
    mount_run_flow(&server, "thread_1", "completed").await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let handle = ConversationHandle::new("thread_1");
    let err = client_for(&server)
        .exchange("hello", Some(&handle))
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::AssistantFailed(_)));
}

#[tokio::test]
async fn test_speech_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(body_partial_json(json!({
            "model": "tts-1",
            "voice": "shimmer",
            "input": "hi there",
            "speed": 1.0
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![0xFF, 0xFB, 0x90, 0x00]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let audio = client_for(&server)
        .synthesize("hi there", "shimmer")
        .await
        .unwrap();

    assert_eq!(audio.mime, "audio/mpeg");
    assert_eq!(audio.bytes, vec![0xFF, 0xFB, 0x90, 0x00]);
}

#[tokio::test]
async fn test_speech_error_is_synthesis_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad voice"))
        .mount(&server)
        .await;

    let err = client_for(&server).synthesize("hi", "nope").await.unwrap_err();
    assert!(matches!(err, TurnError::SynthesisFailed(_)));

    let err = client_for(&server).synthesize("  ", "nova").await.unwrap_err();
    assert!(matches!(err, TurnError::SynthesisFailed(_)));
}

#[test]
fn test_client_requires_api_key() {
    let result = OpenAiClient::new(OpenAiConfig::default());
    assert!(result.is_err());
}
