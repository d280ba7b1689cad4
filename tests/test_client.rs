use futures::StreamExt;
use llm_bench::{
    Category, ChatEvent, ChatRequest, ChatTransport, ErrorKind, Message, OpenAiClient, Prompt,
    PromptSuite, RunConfig, TokenUsage, TransportError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(chunks: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn delta(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    })
}

fn usage_chunk(prompt_tokens: u32, completion_tokens: u32) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
}

fn request(stream: bool) -> ChatRequest {
    ChatRequest {
        model: "test-model".to_string(),
        messages: vec![Message::user("Say hello")],
        max_tokens: 32,
        temperature: 0.0,
        stream,
    }
}

fn client(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new(
        format!("{}/v1", server.uri()),
        "sk-test",
        Duration::from_secs(5),
        1,
    )
    .unwrap()
}

async fn collect(client: &OpenAiClient, request: &ChatRequest) -> Result<Vec<ChatEvent>, TransportError> {
    let mut events = client.open(request).await?;
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event?);
    }
    Ok(out)
}

#[tokio::test]
async fn test_streaming_yields_deltas_then_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": true,
            "stream_options": {"include_usage": true}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[delta("Hel"), delta("lo"), usage_chunk(7, 2)]),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let events = collect(&client(&server), &request(true)).await.unwrap();

    assert_eq!(
        events,
        vec![
            ChatEvent::Delta("Hel".to_string()),
            ChatEvent::Delta("lo".to_string()),
            ChatEvent::Usage(TokenUsage {
                prompt_tokens: 7,
                completion_tokens: 2
            }),
            ChatEvent::Done,
        ]
    );
}

#[tokio::test]
async fn test_streaming_auth_failure_surfaces_on_open() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Invalid API key", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = client(&server).open(&request(true)).await.err().unwrap();
    assert_eq!(err, TransportError::Auth(401));
}

#[tokio::test]
async fn test_streaming_unparseable_chunk_is_malformed() {
    let server = MockServer::start().await;
    let body = format!("data: {}\n\ndata: {{not json\n\n", delta("partial"));
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let err = collect(&client(&server), &request(true)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[tokio::test]
async fn test_non_streaming_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6}
        })))
        .mount(&server)
        .await;

    let events = collect(&client(&server), &request(false)).await.unwrap();

    assert_eq!(events[0], ChatEvent::Delta("Hello there".to_string()));
    assert_eq!(
        events[1],
        ChatEvent::Usage(TokenUsage {
            prompt_tokens: 4,
            completion_tokens: 2
        })
    );
    assert_eq!(events[2], ChatEvent::Done);
}

#[tokio::test]
async fn test_non_streaming_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = client(&server).open(&request(false)).await.err().unwrap();
    assert_eq!(err, TransportError::RateLimit);
}

#[tokio::test]
async fn test_gateway_timeout_names_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(504).set_body_string("upstream timed out"))
        .mount(&server)
        .await;

    let err = client(&server).open(&request(false)).await.err().unwrap();
    assert_eq!(err, TransportError::ServerTimeout(504));
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_client_timeout_reports_configured_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(
        format!("{}/v1", server.uri()),
        "sk-test",
        Duration::from_millis(200),
        1,
    )
    .unwrap();

    let err = client.open(&request(false)).await.err().unwrap();
    assert_eq!(err, TransportError::Timeout(200));
    assert_eq!(err.to_string(), "request timed out after 200 ms");
}

#[tokio::test]
async fn test_run_against_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[delta("The capital "), delta("is Paris"), usage_chunk(9, 4)]),
            "text/event-stream",
        ))
        .expect(2)
        .mount(&server)
        .await;

    let suite = PromptSuite {
        name: "geo".to_string(),
        description: String::new(),
        prompts: vec![
            Prompt::new("What is the capital of France?", Category::Factual)
                .with_reference("The capital is Paris"),
            Prompt::new("Name a French city", Category::Factual),
        ],
    };
    let config = RunConfig {
        base_url: format!("{}/v1", server.uri()),
        api_key: "sk-test".to_string(),
        ..RunConfig::default()
    };

    let result = llm_bench::run("gpt-4o", &suite, &config).await.unwrap();

    assert_eq!(result.stats.successful, 2);
    assert_eq!(result.base_url, config.base_url);
    assert!(result.samples.iter().all(|s| s.ttft_secs.is_some() && s.usage_reported));
    assert_eq!(result.samples[0].response, "The capital is Paris");
    assert_eq!(result.samples[0].quality, Some(1.0));
    assert_eq!(result.stats.total_input_tokens, 18);
    assert_eq!(result.stats.total_output_tokens, 8);
    assert!(result.stats.total_cost.is_some());
}

#[tokio::test]
async fn test_run_records_server_errors_per_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let suite = PromptSuite {
        name: "one".to_string(),
        description: String::new(),
        prompts: vec![Prompt::new("hi", Category::Custom)],
    };
    let config = RunConfig {
        base_url: format!("{}/v1", server.uri()),
        stream: false,
        ..RunConfig::default()
    };

    let result = llm_bench::run("gpt-4o", &suite, &config).await.unwrap();

    assert_eq!(result.stats.failed, 1);
    let error = result.samples[0].error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::Status);
    assert!(error.message.contains("500"));
    assert!(error.message.contains("upstream exploded"));
}
