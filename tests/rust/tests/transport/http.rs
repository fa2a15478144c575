//! HTTP adapter tests
//!
//! Failure paths of the Streamable HTTP transport. Every error a caller sees
//! must have credential query parameters redacted.

use std::collections::HashMap;
use std::time::Duration;

use pretty_assertions::assert_eq;
use skillmux_core::redact::REDACTED;
use skillmux_core::{redact_url, McpError, TransportType};
use skillmux_mcp::pool::transport::{create_client_handler, HttpTransport};
use skillmux_mcp::Transport;
use tests::fixtures::identity;

fn transport(url: &str, headers: HashMap<String, String>) -> HttpTransport {
    HttpTransport::new(
        identity("s1", "remote"),
        url.to_string(),
        headers,
        None,
        create_client_handler("skillmux-tests", "remote"),
        Duration::from_secs(5),
        Duration::from_secs(1),
    )
}

/// Serve plain 500s so the MCP handshake fails after a real HTTP exchange.
async fn start_broken_server() -> String {
    let router = axum::Router::new().fallback(|| async {
        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom")
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://127.0.0.1:{}/mcp", addr.port())
}

#[test]
fn test_description_is_redacted() {
    let t = transport("https://mcp.example.com/mcp?api_key=SECRET", HashMap::new());

    assert_eq!(
        t.description(),
        format!("http:https://mcp.example.com/mcp?api_key={}", REDACTED)
    );
    assert_eq!(t.transport_type(), TransportType::Http);
}

#[tokio::test]
async fn test_invalid_url_is_configuration_error() {
    let t = transport("not a url?token=SECRET", HashMap::new());

    let err = t.connect().await.err().unwrap();

    assert!(matches!(err, McpError::Configuration(_)), "got {:?}", err);
    assert!(!err.to_string().contains("SECRET"));
}

#[tokio::test]
async fn test_invalid_header_is_configuration_error() {
    let headers = HashMap::from([("X-Api-Key".to_string(), "line\nbreak".to_string())]);
    let t = transport("https://mcp.example.com/mcp", headers);

    let err = t.connect().await.err().unwrap();

    let McpError::Configuration(message) = &err else {
        panic!("expected Configuration, got {:?}", err);
    };
    assert!(message.contains("X-Api-Key"));
    assert!(!message.contains("line"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_server_error_is_redacted() {
    // Bind then drop a listener to get a port nobody is serving
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{}/mcp?api_key=SECRET", port);
    let t = transport(&url, HashMap::new());

    let err = t.connect().await.err().unwrap();

    assert!(matches!(err, McpError::Connection(_)), "got {:?}", err);
    let message = err.to_string();
    assert!(!message.contains("SECRET"), "leaked: {message}");
    assert!(message.contains(&redact_url(&url)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_mcp_server_fails_handshake() {
    let base = start_broken_server().await;
    let url = format!("{}?access_token=SECRET", base);
    let t = transport(&url, HashMap::new());

    let err = t.connect().await.err().unwrap();

    assert!(matches!(err, McpError::Connection(_)), "got {:?}", err);
    assert!(!err.to_string().contains("SECRET"));
}
