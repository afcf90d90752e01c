//! McpCadConnector against a mock MCP bridge.

use std::sync::Arc;

use millwork_cad::{CadConfig, DataExtractor, McpCadConnector};
use millwork_core::{CadConnector, Error};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn connector(server: &MockServer) -> McpCadConnector {
    McpCadConnector::new(CadConfig {
        rpc_url: format!("{}/mcp", server.uri()),
        timeout_secs: 5,
        long_timeout_secs: 5,
    })
    .expect("client")
}

/// Tool result in the MCP content wrapper.
fn content(text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"content": [{"type": "text", "text": text}]}
    })
}

/// Script result as the bridge reports it, printed JSON after the banner.
fn printed(output: Value) -> Value {
    let inner = json!({
        "success": true,
        "result": format!("Script successfully executed! Print output: {output}\n")
    });
    content(&inner.to_string())
}

async fn mount_script(server: &MockServer, marker: &str, output: Value) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_string_contains(marker))
        .respond_with(ResponseTemplate::new(200).set_body_json(printed(output)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_document_info_unwraps_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_string_contains("get_document_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(content(
            r#"{"name": "austin.3dm", "units": "inches", "object_count": 42}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let info = connector(&server).document_info().await.unwrap();
    assert_eq!(info.name.as_deref(), Some("austin.3dm"));
    assert_eq!(info.object_count, Some(42));
}

#[tokio::test]
async fn test_request_is_json_rpc_tools_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_string_contains("\"method\":\"tools/call\""))
        .and(body_string_contains("execute_rhinoscript_python_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(printed(json!(["Austin-Van"]))))
        .expect(1)
        .mount(&server)
        .await;

    let groups = connector(&server).groups().await.unwrap();
    assert_eq!(groups, vec!["Austin-Van".to_string()]);
}

#[tokio::test]
async fn test_script_failure_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(content(
            r#"{"success": false, "error": "NameError: name 'foo' is not defined"}"#,
        )))
        .mount(&server)
        .await;

    let cad = connector(&server);
    let out = cad.execute_script("foo", Some(10)).await.unwrap();
    assert!(!out.success);
    assert!(out.error.unwrap().contains("NameError"));

    // Read operations turn a failed script into a boundary error.
    let err = cad.groups().await.unwrap_err();
    assert!(matches!(err, Error::ExternalBoundary(_)));
}

#[tokio::test]
async fn test_rpc_error_maps_to_boundary_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        })))
        .mount(&server)
        .await;

    let err = connector(&server).document_info().await.unwrap_err();
    match err {
        Error::ExternalBoundary(msg) => assert!(msg.contains("Method not found")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_error_maps_to_boundary_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(503).set_body_string("rhino not running"))
        .mount(&server)
        .await;

    let err = connector(&server).groups().await.unwrap_err();
    match err {
        Error::ExternalBoundary(msg) => assert!(msg.contains("503")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_maps_to_boundary_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(printed(json!([])))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = connector(&server)
        .execute_script("print(1)", Some(1))
        .await
        .unwrap_err();
    match err {
        Error::ExternalBoundary(msg) => assert!(msg.contains("timed out")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_bridge() {
    let cad = McpCadConnector::new(CadConfig::default().with_url("http://127.0.0.1:9/mcp")).unwrap();
    let err = cad.groups().await.unwrap_err();
    assert!(matches!(err, Error::ExternalBoundary(_)));
}

#[tokio::test]
async fn test_extraction_over_bridge() {
    let server = MockServer::start().await;
    mount_script(&server, "rs.GroupNames()", json!(["Austin-Van", "Notes"])).await;
    mount_script(
        &server,
        "rs.IsText(obj)",
        json!([
            {"id": "t1", "text": "Elevation", "x": 0.0, "y": 500.0, "z": 0.0},
            {"id": "t2", "text": "Austin Van", "x": 20.0, "y": 550.0, "z": 0.0}
        ]),
    )
    .await;
    mount_script(
        &server,
        "rs.IsLinearDimension(obj)",
        json!([
            {"id": "d1", "text": "34 1/2", "value": null, "layer": "height", "center": [30.0, 600.0, 0.0]},
            {"id": "d2", "text": "30", "value": 30.0, "layer": "width", "center": [10.0, 650.0, 0.0]}
        ]),
    )
    .await;
    mount_script(&server, "rs.IsBlockInstance(obj)", json!([])).await;
    mount_script(
        &server,
        "rs.ObjectsByGroup(group_name)",
        json!({"min": [0.0, 0.0, 0.0], "max": [30.0, 21.0, 34.5]}),
    )
    .await;

    let extractor = DataExtractor::new(Arc::new(connector(&server)));
    let result = extractor.extract(true).await.unwrap();

    assert_eq!(result.groups_found, 2);
    assert_eq!(result.candidates.len(), 1);
    let van = &result.candidates[0];
    assert_eq!(van.name, "Austin-Van");
    assert_eq!(van.width, Some(30.0));
    assert_eq!(van.height, Some(34.5));
    assert_eq!(van.depth, Some(21.0));
    assert!(result.warnings.is_empty());
}
