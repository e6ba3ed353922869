//! Gateway and MCP surface integration tests against an in-process host

use hostbridge_core::registry::{FieldSchema, FieldType};
use hostbridge_core::{
    codes, BridgeConfig, CommandDescriptor, CommandGateway, CommandRegistry, FnHandler,
    InvocationOutcome, McpServer, ParameterSchema,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod common;
use common::{eventually, failure, success, unused_port, MockHost};

fn registry() -> CommandRegistry {
    let mut node_schema = ParameterSchema::default();
    node_schema.properties.insert(
        "path".to_string(),
        FieldSchema {
            kind: Some(FieldType::String),
            description: Some("Node path".to_string()),
            ..FieldSchema::default()
        },
    );
    node_schema.required.push("path".to_string());

    CommandRegistry::new(
        vec![
            CommandDescriptor::new("ping", "Ping the host"),
            CommandDescriptor::new("get_node_info", "Describe one node").with_schema(node_schema),
            CommandDescriptor::new("reload_all", "Reload").with_alias("reload_project"),
        ],
        Vec::new(),
        false,
    )
    .unwrap()
}

/// Host answering `get_node_info` with a host error and everything else with success
async fn scripted_host() -> MockHost {
    MockHost::with_responder(|request| {
        Some(match request["command"].as_str() {
            Some("get_node_info") => failure(request, "NODE_NOT_FOUND", "No node at that path"),
            _ => success(
                request,
                json!({"command": request["command"], "params": request["params"]}),
            ),
        })
    })
    .await
}

fn gateway_for(port: u16) -> CommandGateway {
    let config = BridgeConfig::new()
        .with_endpoint("127.0.0.1", port)
        .with_connect_timeout(Duration::from_secs(2))
        .with_request_timeout(Duration::from_secs(2));
    CommandGateway::new(Arc::new(registry()), config)
}

#[tokio::test]
async fn test_invoke_reconnects_implicitly() {
    let mut host = scripted_host().await;
    let gateway = gateway_for(host.port());

    let result = gateway.invoke("ping", json!({})).await;
    assert!(result.success, "{result:?}");
    assert_eq!(result.result.unwrap()["command"], "ping");
    assert_eq!(host.next_request().await["command"], "ping");

    let status = gateway.connection_status().await.result.unwrap();
    assert_eq!(status["connected"], true);
    assert!(status["connected_since"].is_string());
}

#[tokio::test]
async fn test_host_error_code_is_kept() {
    let host = scripted_host().await;
    let gateway = gateway_for(host.port());

    let result = gateway
        .invoke("get_node_info", json!({"path": "/root/Missing"}))
        .await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.code, "NODE_NOT_FOUND");
    assert_eq!(error.message, "No node at that path");
}

#[tokio::test]
async fn test_wire_alias_is_sent() {
    let mut host = scripted_host().await;
    let gateway = gateway_for(host.port());

    let result = gateway.call_tool("godot_reload_all", Value::Null).await;
    assert!(result.success);
    assert_eq!(host.next_request().await["command"], "reload_project");
}

#[tokio::test]
async fn test_missing_required_field_never_reaches_host() {
    let mut host = scripted_host().await;
    let gateway = gateway_for(host.port());

    let result = gateway.invoke("get_node_info", json!({})).await;
    assert_eq!(result.error_code(), Some(codes::INVALID_ARGUMENTS));
    assert!(result.error.unwrap().message.contains("path"));

    let result = gateway.invoke("get_node_info", json!({"path": null})).await;
    assert_eq!(result.error_code(), Some(codes::INVALID_ARGUMENTS));

    assert!(host
        .try_next_request(Duration::from_millis(200))
        .await
        .is_none());
    assert_eq!(host.connections(), 0);
}

#[tokio::test]
async fn test_unknown_command_never_reaches_host() {
    let host = scripted_host().await;
    let gateway = gateway_for(host.port());

    let result = gateway.invoke("no_such_command", json!({})).await;
    assert_eq!(result.error_code(), Some(codes::UNKNOWN_COMMAND));
    assert_eq!(host.connections(), 0);
}

#[tokio::test]
async fn test_not_connected_when_reconnect_fails() {
    let gateway = gateway_for(unused_port().await);

    let result = gateway.invoke("ping", json!({})).await;
    assert_eq!(result.error_code(), Some(codes::NOT_CONNECTED));
    assert!(result.error.unwrap().message.contains("godot_connect"));
}

#[tokio::test]
async fn test_connect_meta_tool_switches_endpoint() {
    let host = scripted_host().await;
    let gateway = gateway_for(unused_port().await);

    let result = gateway
        .call_tool("godot_connect", json!({"port": host.port()}))
        .await;
    assert!(result.success, "{result:?}");
    assert_eq!(result.result.unwrap()["port"], host.port());

    let status = gateway
        .call_tool("godot_connection_status", json!({}))
        .await
        .result
        .unwrap();
    assert_eq!(status["connected"], true);
    assert_eq!(status["port"], host.port());

    assert!(gateway.invoke("ping", json!({})).await.success);
}

#[tokio::test]
async fn test_connect_meta_tool_failure() {
    let gateway = gateway_for(unused_port().await);
    let result = gateway.call_tool("godot_connect", json!({})).await;
    assert_eq!(result.error_code(), Some(codes::CONNECTION_FAILED));
}

#[tokio::test]
async fn test_disconnect_meta_tool() {
    let host = scripted_host().await;
    let gateway = gateway_for(host.port());
    assert!(gateway.invoke("ping", json!({})).await.success);

    let result = gateway.call_tool("godot_disconnect", json!({})).await;
    assert!(result.success);
    let status = gateway.connection_status().await.result.unwrap();
    assert_eq!(status["connected"], false);

    // The next call reconnects on its own
    assert!(gateway.invoke("ping", json!({})).await.success);
    assert_eq!(host.connections(), 2);
}

#[tokio::test]
async fn test_standing_subscription_survives_reconnect() {
    let host = MockHost::manual().await;
    let gateway = gateway_for(host.port());

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    gateway
        .subscribe_each_session(
            "log",
            Arc::new(FnHandler::new(move |_, payload| {
                seen_tx.send(payload.clone()).map_err(|e| e.to_string())
            })),
        )
        .await;

    assert!(gateway.call_tool("godot_connect", json!({})).await.success);
    host.send(json!({"type": "log_event", "data": {"message": "first"}}));
    let payload = tokio::time::timeout(Duration::from_secs(2), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["message"], "first");

    assert!(gateway.call_tool("godot_connect", json!({})).await.success);
    host.send(json!({"type": "log_event", "data": {"message": "second"}}));
    let payload = tokio::time::timeout(Duration::from_secs(2), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["message"], "second");
}

#[tokio::test]
async fn test_mcp_tools_call_end_to_end() {
    let host = scripted_host().await;
    let server = McpServer::new(Arc::new(gateway_for(host.port())));

    let line = server
        .handle_line(
            &json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "godot_ping", "arguments": {"verbose": true}}
            })
            .to_string(),
        )
        .await
        .unwrap();

    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], 7);
    assert_eq!(response["result"]["isError"], false);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    let body: Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["params"], json!({"verbose": true}));
}

async fn wait_disconnected(gateway: &CommandGateway) -> bool {
    eventually(|| async move {
        !gateway
            .connection_status()
            .await
            .result
            .map_or(false, |status| status["connected"] == true)
    })
    .await
}

#[tokio::test]
async fn test_unanswered_invoke_times_out() {
    let mut host = MockHost::manual().await;
    let gateway = gateway_for(host.port());

    let result = gateway
        .invoke_with_timeout("ping", json!({}), Duration::from_millis(200))
        .await;
    assert_eq!(result.error_code(), Some(codes::TIMEOUT));
    assert_eq!(InvocationOutcome::of(&result), InvocationOutcome::TimedOut);

    let shape = serde_json::to_value(&result).unwrap();
    assert_eq!(shape["success"], false);
    assert_eq!(shape["error"]["code"], "TIMEOUT");
    assert!(shape.get("result").is_none());

    assert_eq!(host.next_request().await["command"], "ping");
    let status = gateway.connection_status().await.result.unwrap();
    assert_eq!(status["pending_requests"], 0);
}

#[tokio::test]
async fn test_remote_close_during_invoke() {
    let mut host = MockHost::manual().await;
    let gateway = Arc::new(gateway_for(host.port()));

    let call = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway
                .invoke_with_timeout("ping", json!({}), Duration::from_secs(10))
                .await
        })
    };
    host.next_request().await;
    host.close();

    let result = call.await.unwrap();
    assert_eq!(result.error_code(), Some(codes::CONNECTION_CLOSED));
    assert_eq!(InvocationOutcome::of(&result), InvocationOutcome::ConnectionLost);
}

#[tokio::test]
async fn test_implicit_reconnect_after_remote_close() {
    let host = scripted_host().await;
    let gateway = gateway_for(host.port());

    let (standing_tx, mut standing) = mpsc::unbounded_channel();
    gateway
        .subscribe_each_session(
            "log",
            Arc::new(FnHandler::new(move |_, payload| {
                standing_tx.send(payload.clone()).map_err(|e| e.to_string())
            })),
        )
        .await;

    let first = gateway.invoke("ping", json!({})).await;
    assert_eq!(InvocationOutcome::of(&first), InvocationOutcome::Resolved);

    // Only bound to the first session
    let (session_tx, mut session_only) = mpsc::unbounded_channel();
    let _keep_open = session_tx.clone();
    gateway
        .client()
        .await
        .events()
        .subscribe(
            "log",
            Arc::new(FnHandler::new(move |_, payload| {
                session_tx.send(payload.clone()).map_err(|e| e.to_string())
            })),
        )
        .await;

    host.close();
    assert!(wait_disconnected(&gateway).await);

    let second = gateway.invoke("ping", json!({})).await;
    assert!(second.success, "{second:?}");
    assert_eq!(InvocationOutcome::of(&second), InvocationOutcome::Resolved);
    assert_eq!(host.connections(), 2);
    assert!(!gateway.client().await.is_spent());

    host.send(json!({"type": "log_event", "data": {"message": "after reconnect"}}));
    let payload = tokio::time::timeout(Duration::from_secs(2), standing.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["message"], "after reconnect");
    assert!(
        tokio::time::timeout(Duration::from_millis(200), session_only.recv())
            .await
            .is_err()
    );
}
