//! Retry coordinator tests
//!
//! Stale connections are replaced, scope shortfalls trigger one login, and
//! everything shares a three-attempt budget.

use pretty_assertions::assert_eq;
use serde_json::Value;
use skillmux_core::McpError;
use tests::fixtures::{http_context, identity, oauth_context, stdio_context};
use tests::{mock_manager, mock_manager_with_oauth, MockOAuth, MockTransportFactory};

const URL: &str = "https://mcp.example.com/mcp";

fn step_up_error() -> McpError {
    McpError::from_message(r#"HTTP 403: Bearer error="insufficient_scope", scope="files.write""#)
}

fn first_text(result: &rmcp::model::CallToolResult) -> String {
    let value = serde_json::to_value(result).unwrap();
    value["content"][0]["text"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_default()
}

#[tokio::test]
async fn test_stale_connection_is_replaced() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([
        McpError::from_message("Not connected"),
        McpError::from_message("not connected"),
    ]);
    let manager = mock_manager(&factory);
    let id = identity("s1", "search");

    manager.list_tools(&id, &stdio_context()).await.unwrap();

    assert_eq!(factory.connect_count(), 3);
    assert_eq!(factory.call_count(), 3);
    assert_eq!(factory.close_count(), 2);
    assert!(manager.is_connected(&id));
}

#[tokio::test]
async fn test_call_tool_lands_on_fresh_connection() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([McpError::Operation("write EPIPE: Broken pipe".into())]);
    let manager = mock_manager(&factory);

    let result = manager
        .call_tool(&identity("s1", "search"), &stdio_context(), "echo", None)
        .await
        .unwrap();

    assert_eq!(first_text(&result), "echo@2");
}

#[tokio::test]
async fn test_retries_exhausted_after_three_attempts() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls((0..3).map(|i| McpError::StaleConnection(format!("closed #{}", i))));
    let manager = mock_manager(&factory);

    let err = manager
        .read_resource(&identity("s1", "docs"), &stdio_context(), "file:///readme")
        .await
        .unwrap_err();

    match &err {
        McpError::RetriesExhausted {
            operation,
            server,
            attempts,
            last,
        } => {
            assert_eq!(operation, "resources/read");
            assert_eq!(server, "docs");
            assert_eq!(*attempts, 3);
            assert!(last.contains("closed #2"));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains("3 attempts"));
    assert!(message.contains("closed #2"));
    assert_eq!(factory.connect_count(), 3);
}

#[tokio::test]
async fn test_other_errors_fail_immediately() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([McpError::from_message("Tool not found")]);
    let manager = mock_manager(&factory);

    let err = manager
        .call_tool(&identity("s1", "search"), &stdio_context(), "missing", None)
        .await
        .unwrap_err();

    assert_eq!(err, McpError::Operation("Tool not found".into()));
    assert_eq!(factory.call_count(), 1);
    assert_eq!(factory.connect_count(), 1);
    assert_eq!(factory.close_count(), 0);
}

#[tokio::test]
async fn test_list_operations_are_retried() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([
        McpError::from_message("Transport closed"),
        McpError::from_message("Transport closed"),
    ]);
    let manager = mock_manager(&factory);
    let id = identity("s1", "search");

    manager.list_resources(&id, &stdio_context()).await.unwrap();
    manager.list_prompts(&id, &stdio_context()).await.unwrap();

    assert_eq!(factory.connect_count(), 3);
}

#[tokio::test]
async fn test_get_prompt_passes_through() {
    let factory = MockTransportFactory::new();
    let manager = mock_manager(&factory);

    let result = manager
        .get_prompt(&identity("s1", "prompts"), &stdio_context(), "greet", None)
        .await
        .unwrap();

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["messages"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_step_up_logs_in_with_required_scope() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([step_up_error()]);
    let oauth = MockOAuth::new().with_token("initial");
    let manager = mock_manager_with_oauth(&factory, &oauth);

    manager
        .call_tool(&identity("s1", "files"), &oauth_context(URL), "write", None)
        .await
        .unwrap();

    assert_eq!(oauth.login_count(), 1);
    assert_eq!(oauth.requested_scopes(), vec![Some("files.write".to_string())]);
    assert_eq!(factory.connect_count(), 2);
    assert_eq!(factory.close_count(), 1);
}

#[tokio::test]
async fn test_step_up_and_stale_share_the_budget() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([McpError::from_message("Not connected"), step_up_error()]);
    let oauth = MockOAuth::new();
    let manager = mock_manager_with_oauth(&factory, &oauth);

    let result = manager
        .call_tool(&identity("s1", "files"), &oauth_context(URL), "write", None)
        .await
        .unwrap();

    assert_eq!(first_text(&result), "write@3");
    assert_eq!(oauth.login_count(), 1);
    assert_eq!(factory.connect_count(), 3);
}

#[tokio::test]
async fn test_step_up_happens_once_per_operation() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([step_up_error(), step_up_error()]);
    let oauth = MockOAuth::new();
    let manager = mock_manager_with_oauth(&factory, &oauth);

    let err = manager
        .call_tool(&identity("s1", "files"), &oauth_context(URL), "write", None)
        .await
        .unwrap_err();

    assert!(err.is_step_up());
    assert_eq!(oauth.login_count(), 1);
    assert_eq!(factory.connect_count(), 2);
}

#[tokio::test]
async fn test_step_up_without_oauth_config_is_not_handled() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([step_up_error()]);
    let oauth = MockOAuth::new();
    let manager = mock_manager_with_oauth(&factory, &oauth);

    let err = manager
        .call_tool(&identity("s1", "files"), &http_context(URL), "write", None)
        .await
        .unwrap_err();

    assert!(err.is_step_up());
    assert_eq!(oauth.login_count(), 0);
    assert_eq!(oauth.providers_created(), 0);
    assert_eq!(factory.connect_count(), 1);
}

#[tokio::test]
async fn test_failed_login_surfaces_authorization_error() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([step_up_error()]);
    let oauth = MockOAuth::new();
    oauth.fail_login(McpError::Authorization("user cancelled".into()));
    let manager = mock_manager_with_oauth(&factory, &oauth);

    let err = manager
        .call_tool(&identity("s1", "files"), &oauth_context(URL), "write", None)
        .await
        .unwrap_err();

    assert!(matches!(err, McpError::Authorization(_)));
    assert_eq!(oauth.login_count(), 1);
    assert_eq!(factory.connect_count(), 1);
}

#[tokio::test]
async fn test_auth_provider_follows_oauth_config() {
    let factory = MockTransportFactory::new();
    let oauth = MockOAuth::new();
    let manager = mock_manager_with_oauth(&factory, &oauth);

    manager
        .list_tools(&identity("s1", "secured"), &oauth_context(URL))
        .await
        .unwrap();
    manager
        .list_tools(&identity("s1", "public"), &http_context(URL))
        .await
        .unwrap();

    assert_eq!(factory.auth_providers_seen(), vec![true, false]);
    assert_eq!(oauth.providers_created(), 1);
}

#[tokio::test]
async fn test_auth_provider_reused_until_session_disconnects() {
    let factory = MockTransportFactory::new();
    factory.fail_next_calls([McpError::from_message("Not connected")]);
    let oauth = MockOAuth::new();
    let manager = mock_manager_with_oauth(&factory, &oauth);
    let id = identity("s1", "secured");

    // Reconnect after a stale error keeps the same provider
    manager.list_tools(&id, &oauth_context(URL)).await.unwrap();
    assert_eq!(factory.connect_count(), 2);
    assert_eq!(oauth.providers_created(), 1);

    manager.disconnect_session("s1").await;
    manager.list_tools(&id, &oauth_context(URL)).await.unwrap();
    assert_eq!(oauth.providers_created(), 2);
}
