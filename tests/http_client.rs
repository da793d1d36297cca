//! End-to-end tests against an in-process HTTP server.
//!
//! Each fixture accepts one connection, records the raw request, and answers
//! with a canned response.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use oobabooga_client::{
    ChatCompletionOptions, ChatMessage, ChatMode, ClientError, ClientOptions, CompletionOptions,
    OobaboogaClient,
};

// ─── Fixture ─────────────────────────────────────────────────────────────────

enum Reply {
    /// Complete response with a correct `Content-Length`.
    Full {
        status: u16,
        content_type: &'static str,
        body: String,
    },
    /// Promise more bytes than are sent, then close the connection.
    Truncated { body: String },
    /// Send `body` and keep the connection open without finishing.
    Stall { body: String },
    /// Read the request and never answer.
    Silent,
}

struct Fixture {
    base_url: String,
    handle: JoinHandle<String>,
}

impl Fixture {
    async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;

            match reply {
                Reply::Full {
                    status,
                    content_type,
                    body,
                } => {
                    write_head(&mut socket, status, content_type, body.len()).await;
                    socket.write_all(body.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                }
                Reply::Truncated { body } => {
                    write_head(&mut socket, 200, "text/event-stream", body.len() + 512).await;
                    socket.write_all(body.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                    drop(socket);
                }
                Reply::Stall { body } => {
                    write_head(&mut socket, 200, "text/event-stream", body.len() + 512).await;
                    socket.write_all(body.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Reply::Silent => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }

            request
        });

        Self { base_url, handle }
    }

    fn client(&self) -> OobaboogaClient {
        self.client_with(ClientOptions::default())
    }

    fn client_with(&self, options: ClientOptions) -> OobaboogaClient {
        OobaboogaClient::new(ClientOptions {
            base_url: self.base_url.clone(),
            timeout_secs: 10,
            stream_timeout_secs: 10,
            ..options
        })
        .unwrap()
    }

    /// The raw request the server received.
    async fn request(self) -> String {
        self.handle.await.unwrap()
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn write_head(socket: &mut TcpStream, status: u16, content_type: &str, length: usize) {
    let head = format!(
        "HTTP/1.1 {status} Status\r\nContent-Type: {content_type}\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n"
    );
    socket.write_all(head.as_bytes()).await.unwrap();
}

fn sse(frames: &[&str]) -> String {
    frames.iter().map(|f| format!("data: {f}\n\n")).collect()
}

fn event_stream(body: String) -> Reply {
    Reply::Full {
        status: 200,
        content_type: "text/event-stream",
        body,
    }
}

fn json(body: &str) -> Reply {
    Reply::Full {
        status: 200,
        content_type: "application/json",
        body: body.to_string(),
    }
}

fn user_hi() -> Vec<ChatMessage> {
    vec![ChatMessage::user("Hi")]
}

// ─── Streaming Chat ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stream_chat_hello_world() {
    let fixture = Fixture::start(event_stream(sse(&[
        r#"{"choices": [{"index": 0, "delta": {"role": "assistant"}}]}"#,
        r#"{"choices": [{"index": 0, "delta": {"content": "Hello"}}]}"#,
        r#"{"choices": [{"index": 0, "delta": {"content": " world"}}]}"#,
        r#"{"choices": [{"index": 0, "delta": {"content": "!"}}]}"#,
        "[DONE]",
    ])))
    .await;

    let stream = fixture
        .client()
        .stream_chat_completion(
            user_hi(),
            &ChatCompletionOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let messages: Vec<ChatMessage> = stream.map(|r| r.unwrap()).collect().await;

    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.role == "assistant"));
    let text: String = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(text, "Hello world!");

    let request = fixture.request().await;
    assert!(request.starts_with("POST /v1/chat/completions HTTP/1.1"));
    assert!(request.contains(r#""stream":true"#));
    assert!(request.contains(r#""mode":"chat""#));
    assert!(request.to_lowercase().contains("accept: text/event-stream"));
}

#[tokio::test]
async fn test_stream_chat_rejected_before_any_item() {
    let fixture = Fixture::start(Reply::Full {
        status: 500,
        content_type: "text/plain",
        body: "Internal error".to_string(),
    })
    .await;

    let result = fixture
        .client()
        .stream_chat_completion(
            user_hi(),
            &ChatCompletionOptions::default(),
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(ClientError::TransportRejected {
            provider,
            status,
            body,
        }) => {
            assert_eq!(provider, "Oobabooga");
            assert_eq!(status, 500);
            assert_eq!(body, "Internal error");
        }
        Err(other) => panic!("expected TransportRejected, got {other:?}"),
        Ok(_) => panic!("a rejected call must not produce a stream"),
    }
}

#[tokio::test]
async fn test_stream_chat_skips_malformed_frame() {
    let body = format!(
        "data: {}\n\ndata: {{\"choices\": [{{\"delta\": \n\ndata: {}\n\ndata: [DONE]\n\n",
        r#"{"choices": [{"delta": {"content": "before"}}]}"#,
        r#"{"choices": [{"delta": {"content": "after"}}]}"#,
    );
    let fixture = Fixture::start(event_stream(body)).await;

    let stream = fixture
        .client()
        .stream_chat_completion(
            user_hi(),
            &ChatCompletionOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let contents: Vec<String> = stream.map(|r| r.unwrap().content).collect().await;
    assert_eq!(contents, vec!["before", "after"]);
}

#[tokio::test]
async fn test_stream_chat_ignores_lines_after_sentinel() {
    let fixture = Fixture::start(event_stream(sse(&[
        r#"{"choices": [{"delta": {"content": "only"}}]}"#,
        "[DONE]",
        r#"{"choices": [{"delta": {"content": "ignored"}}]}"#,
    ])))
    .await;

    let stream = fixture
        .client()
        .stream_chat_completion(
            user_hi(),
            &ChatCompletionOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let contents: Vec<String> = stream.map(|r| r.unwrap().content).collect().await;
    assert_eq!(contents, vec!["only"]);
}

#[tokio::test]
async fn test_stream_chat_interrupted_mid_stream() {
    let fixture = Fixture::start(Reply::Truncated {
        body: sse(&[r#"{"choices": [{"delta": {"content": "partial"}}]}"#]),
    })
    .await;

    let stream = fixture
        .client()
        .stream_chat_completion(
            user_hi(),
            &ChatCompletionOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let items: Vec<Result<ChatMessage, ClientError>> = stream.collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().content, "partial");
    match &items[1] {
        Err(ClientError::TransportInterrupted { .. }) => {}
        other => panic!("expected TransportInterrupted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_chat_cancelled_while_server_stalls() {
    let fixture = Fixture::start(Reply::Stall {
        body: sse(&[r#"{"choices": [{"delta": {"content": "first"}}]}"#]),
    })
    .await;

    let cancel = CancellationToken::new();
    let client = fixture.client();
    let stream = client
        .stream_chat_completion(user_hi(), &ChatCompletionOptions::default(), cancel.clone())
        .await
        .unwrap();
    futures::pin_mut!(stream);

    assert_eq!(stream.next().await.unwrap().unwrap().content, "first");

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("cancellation must interrupt a stalled read");
    assert!(next.unwrap().unwrap_err().is_cancelled());
    assert!(stream.next().await.is_none());

    fixture.handle.abort();
}

#[tokio::test]
async fn test_stream_chat_cancelled_before_headers() {
    let fixture = Fixture::start(Reply::Silent).await;
    let client = fixture.client_with(ClientOptions {
        stream_timeout_secs: 4,
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = client
        .stream_chat_completion(user_hi(), &ChatCompletionOptions::default(), cancel)
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    match result {
        Err(ClientError::Cancelled) => {}
        Err(other) => panic!("expected Cancelled, got {other:?}"),
        Ok(_) => panic!("a cancelled call must not produce a stream"),
    }

    fixture.handle.abort();
}

/// Serve two connections, answering each according to the prompt it carries.
async fn start_two_stream_server(routes: Vec<(&'static str, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        for _ in 0..routes.len() {
            let (mut socket, _) = listener.accept().await.unwrap();
            let routes = routes.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let (_, body) = routes
                    .iter()
                    .find(|(marker, _)| request.contains(marker))
                    .unwrap();
                write_head(&mut socket, 200, "text/event-stream", body.len()).await;
                socket.write_all(body.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            });
        }
    });

    base_url
}

#[tokio::test]
async fn test_concurrent_streams_are_independent() {
    let base_url = start_two_stream_server(vec![
        (
            "tell a story",
            sse(&[
                r#"{"choices": [{"delta": {"role": "narrator"}}]}"#,
                r#"{"choices": [{"delta": {"content": "Once"}}]}"#,
                r#"{"choices": [{"delta": {"content": " upon"}}]}"#,
                "[DONE]",
            ]),
        ),
        (
            "help me",
            sse(&[
                r#"{"choices": [{"delta": {"content": "Sure"}}]}"#,
                r#"{"choices": [{"delta": {"content": " thing"}}]}"#,
                "[DONE]",
            ]),
        ),
    ])
    .await;

    let client = OobaboogaClient::new(ClientOptions {
        base_url,
        ..Default::default()
    })
    .unwrap();
    let options = ChatCompletionOptions::default();

    let mut story = client
        .stream_chat_completion(
            vec![ChatMessage::user("tell a story")],
            &options,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let mut help = client
        .stream_chat_completion(
            vec![ChatMessage::user("help me")],
            &options,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Interleave pulls across the two streams.
    let s1 = story.next().await.unwrap().unwrap();
    let h1 = help.next().await.unwrap().unwrap();
    let s2 = story.next().await.unwrap().unwrap();
    let h2 = help.next().await.unwrap().unwrap();

    assert_eq!(s1, ChatMessage::new("narrator", "Once"));
    assert_eq!(s2, ChatMessage::new("narrator", " upon"));
    assert_eq!(h1, ChatMessage::assistant("Sure"));
    assert_eq!(h2, ChatMessage::assistant(" thing"));
    assert!(story.next().await.is_none());
    assert!(help.next().await.is_none());
}

// ─── Streaming Completion ────────────────────────────────────────────────────

#[tokio::test]
async fn test_stream_completion_with_stop_sequence() {
    let fixture = Fixture::start(event_stream(sse(&[
        r#"{"choices": [{"text": "Hello"}]}"#,
        r#"{"choices": [{"text": " world"}]}"#,
        r#"{"choices": [{"text": "!"}]}"#,
    ])))
    .await;

    let options = CompletionOptions {
        stop_sequences: Some(vec![".".to_string()]),
        ..Default::default()
    };
    let stream = fixture
        .client()
        .stream_completion("Test prompt", &options, CancellationToken::new())
        .await
        .unwrap();
    let tokens: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(tokens, vec!["Hello", " world", "!"]);

    let request = fixture.request().await;
    assert!(request.starts_with("POST /v1/completions HTTP/1.1"));
    assert!(request.contains(r#""stop":["."]"#));
    assert!(request.contains(r#""max_tokens":80"#));
}

#[tokio::test]
async fn test_stream_completion_rejected() {
    let fixture = Fixture::start(Reply::Full {
        status: 404,
        content_type: "application/json",
        body: r#"{"detail": "Not Found"}"#.to_string(),
    })
    .await;

    let result = fixture
        .client()
        .stream_completion("Hi", &CompletionOptions::default(), CancellationToken::new())
        .await;
    let err = result.err().expect("404 must reject the call");
    assert_eq!(err.status_code(), Some(404));
}

// ─── Non-streaming ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_complete_returns_first_choice_text() {
    let fixture = Fixture::start(json(r#"{"choices": [{"text": "Test response"}]}"#)).await;

    let text = fixture
        .client()
        .complete("Test prompt", &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "Test response");

    let request = fixture.request().await;
    assert!(request.contains(r#""stream":false"#));
    assert!(request.contains(r#""prompt":"Test prompt""#));
}

#[tokio::test]
async fn test_complete_without_choices_is_empty() {
    let fixture = Fixture::start(json(r#"{"choices": []}"#)).await;
    let text = fixture
        .client()
        .complete("Test prompt", &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "");
}

#[tokio::test]
async fn test_chat_complete_instruct_mode() {
    let fixture = Fixture::start(json(
        r#"{"id": "chatcmpl-1", "choices": [{"index": 0, "message": {"role": "assistant", "content": "Response"}, "finish_reason": "stop"}]}"#,
    ))
    .await;

    let options = ChatCompletionOptions {
        mode: ChatMode::Instruct,
        instruction_template: Some("Alpaca".to_string()),
        ..Default::default()
    };
    let response = fixture
        .client()
        .chat_complete(vec![ChatMessage::user("Test")], &options)
        .await
        .unwrap();
    assert_eq!(response.id, "chatcmpl-1");
    assert_eq!(response.first_message().unwrap().content, "Response");
    assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));

    let request = fixture.request().await;
    assert!(request.contains(r#""mode":"instruct""#));
    assert!(request.contains(r#""instruction_template":"Alpaca""#));
}

#[tokio::test]
async fn test_chat_complete_unparsable_body() {
    let fixture = Fixture::start(json("<html>oops</html>")).await;
    let result = fixture
        .client()
        .chat_complete(user_hi(), &ChatCompletionOptions::default())
        .await;
    assert!(matches!(result, Err(ClientError::ResponseParse { .. })));
}

#[tokio::test]
async fn test_api_key_sent_as_bearer() {
    let fixture = Fixture::start(json(r#"{"choices": [{"text": "ok"}]}"#)).await;
    let client = fixture.client_with(ClientOptions {
        api_key: Some("sk-local".to_string()),
        ..Default::default()
    });
    client
        .complete("Hi", &CompletionOptions::default())
        .await
        .unwrap();

    let request = fixture.request().await.to_lowercase();
    assert!(request.contains("authorization: bearer sk-local"));
}

// ─── Health Check ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_is_available_when_server_responds() {
    let fixture = Fixture::start(json(r#"{"object": "list", "data": []}"#)).await;
    assert!(fixture.client().is_available().await);

    let request = fixture.request().await;
    assert!(request.starts_with("GET /v1/models HTTP/1.1"));
}

#[tokio::test]
async fn test_is_unavailable_on_error_status() {
    let fixture = Fixture::start(Reply::Full {
        status: 503,
        content_type: "text/plain",
        body: "loading model".to_string(),
    })
    .await;
    assert!(!fixture.client().is_available().await);
}
