// common/tests/backend_client.rs
//
// Exercises BackendClient against canned HTTP responses served over a
// local TCP listener, covering the failure taxonomy and the fixed
// header set.
use common::backend::BackendClient;
use common::config::Config;
use common::error::{ApiError, GENERIC_REJECTION};
use common::models::session::CredentialSlot;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn test_config(addr: std::net::SocketAddr) -> Config {
    Config {
        api_base_url: format!("http://{}", addr),
        realtime_url: "ws://127.0.0.1:9/ws".to_string(),
        request_timeout_secs: 5,
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = vec![0u8; 4096];
    let mut request: Vec<u8> = Vec::new();
    let mut body_expected = 0usize;

    loop {
        let n = stream.read(&mut buffer).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buffer[..n]);

        let text = String::from_utf8_lossy(&request).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            if body_expected == 0 {
                body_expected = text
                    .to_ascii_lowercase()
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:").map(str::trim).map(str::to_string))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
            }
            if request.len() >= header_end + 4 + body_expected {
                break;
            }
        }
    }

    String::from_utf8_lossy(&request).to_string()
}

/// Serve exactly one canned response, returning the request that came in
async fn serve_once(
    status_line: &str,
    body: &str,
) -> (std::net::SocketAddr, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        stream.write_all(response.as_bytes()).await.unwrap();
        request
    });

    (addr, handle)
}

#[tokio::test]
async fn non_2xx_with_structured_body_is_rejected_verbatim() {
    let (addr, server) = serve_once("401 UNAUTHORIZED", r#"{"error": "bad pin"}"#).await;
    let client = BackendClient::new(&test_config(addr), CredentialSlot::new());

    let outcome = client.post("/api/gate/verify-pin", &json!({"pin_code": "0000"})).await;
    match outcome {
        Err(ApiError::Rejected(message)) => assert_eq!(message, "bad pin"),
        other => panic!("expected Rejected, got {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn non_2xx_without_structured_body_gets_the_generic_message() {
    let (addr, server) = serve_once("500 INTERNAL SERVER ERROR", "oops").await;
    let client = BackendClient::new(&test_config(addr), CredentialSlot::new());

    let outcome = client.get("/api/resident/me").await;
    match outcome {
        Err(ApiError::Rejected(message)) => assert_eq!(message, GENERIC_REJECTION),
        other => panic!("expected Rejected, got {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn network_failure_is_unreachable() {
    // Bind to learn a free port, then close it before the request.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = BackendClient::new(&test_config(addr), CredentialSlot::new());
    let outcome = client.post("/api/gate/check-vehicle", &json!({"vehicle_number": "X"})).await;
    assert!(matches!(outcome, Err(ApiError::Unreachable(_))));
}

#[tokio::test]
async fn attaches_bearer_and_compatibility_header() {
    let (addr, server) = serve_once("200 OK", r#"{"message": "ok"}"#).await;
    let credential = CredentialSlot::new();
    credential.set("tok-abc".to_string());
    let client = BackendClient::new(&test_config(addr), credential);

    let value = client.get("/api/resident/notifications").await.unwrap();
    assert_eq!(value["message"], "ok");

    let request = server.await.unwrap().to_ascii_lowercase();
    assert!(request.contains("authorization: bearer tok-abc"));
    assert!(request.contains("ngrok-skip-browser-warning: true"));
}

#[tokio::test]
async fn compatibility_header_is_sent_without_a_credential() {
    let (addr, server) = serve_once("200 OK", r#"{"status": "Visitor"}"#).await;
    let client = BackendClient::new(&test_config(addr), CredentialSlot::new());

    client
        .post("/api/gate/check-vehicle", &json!({"vehicle_number": "KA01ZZ0001"}))
        .await
        .unwrap();

    let request = server.await.unwrap().to_ascii_lowercase();
    assert!(request.contains("ngrok-skip-browser-warning: true"));
    assert!(!request.contains("authorization:"));
}

#[tokio::test]
async fn unauthorized_with_bearer_is_auth_expired() {
    let (addr, server) = serve_once("401 UNAUTHORIZED", r#"{"message": "Token is invalid!"}"#).await;
    let credential = CredentialSlot::new();
    credential.set("stale-token".to_string());
    let client = BackendClient::new(&test_config(addr), credential);

    let outcome = client.get("/api/resident/me").await;
    assert!(matches!(outcome, Err(ApiError::AuthExpired)));
    server.await.unwrap();
}

#[tokio::test]
async fn unauthorized_without_bearer_is_a_plain_rejection() {
    let (addr, server) = serve_once(
        "401 UNAUTHORIZED",
        r#"{"error": "Invalid flat number or password"}"#,
    )
    .await;
    let client = BackendClient::new(&test_config(addr), CredentialSlot::new());

    let outcome = client
        .post("/api/resident/login", &json!({"flat_number": "B2-101", "password": "nope"}))
        .await;
    match outcome {
        Err(ApiError::Rejected(message)) => {
            assert_eq!(message, "Invalid flat number or password")
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
    server.await.unwrap();
}
