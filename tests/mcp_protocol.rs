//! MCP Protocol Tests
//!
//! Drives the JSON-RPC handler line by line, the way an agent host would over stdio.

mod support;

use serde_json::{json, Value};
use support::{executor, FakeProvider};
use tabletalk::mcp::McpServer;

fn server(provider: FakeProvider) -> McpServer<FakeProvider> {
    McpServer::new(executor(provider, 1000), "sqlite")
}

async fn call(server: &McpServer<FakeProvider>, request: Value) -> Value {
    let line = server.handle_line(&request.to_string()).await.expect("response expected");
    serde_json::from_str(&line).unwrap()
}

/// Envelope carried in the text block of a tools/call result
fn envelope(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_initialize() {
    let server = server(FakeProvider::new());
    let response = call(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;

    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["protocolVersion"], json!("2024-11-05"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("tabletalk"));
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn test_tools_list_exposes_catalog() {
    let server = server(FakeProvider::new());
    let response = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;

    let tools = response["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["get_tables", "describe_table", "get_all_schemas", "count_records", "execute_select"]);

    let describe = &tools[1]["inputSchema"];
    assert_eq!(describe["required"], json!(["table_name"]));
}

#[tokio::test]
async fn test_tools_call_success() {
    let server = server(FakeProvider::new().with_items("web_items", 4));
    let response = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "count_records", "arguments": {"table_name": "web_items"}}}),
    )
    .await;

    assert_eq!(response["result"]["isError"], json!(false));
    let body = envelope(&response);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["engine"], json!("sqlite"));
    assert_eq!(body["command"], json!("count_records"));
    assert_eq!(body["data"]["columns"][0]["values"], json!([4]));
    assert_eq!(body["meta"]["rows_returned"], json!(1));
}

#[tokio::test]
async fn test_rejected_select_is_tool_error() {
    let provider = FakeProvider::new().with_items("web_items", 4);
    let server = server(provider.clone());
    let response = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
               "params": {"name": "execute_select", "arguments": {"query": "DROP TABLE web_items"}}}),
    )
    .await;

    assert_eq!(response["result"]["isError"], json!(true));
    let body = envelope(&response);
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_REJECTED"));
    assert!(provider.untouched());
}

#[tokio::test]
async fn test_unknown_tool_and_bad_arguments_are_tool_errors() {
    let server = server(FakeProvider::new());

    for params in [
        json!({"name": "drop_everything", "arguments": {}}),
        json!({"name": "describe_table", "arguments": {}}),
        json!({"name": "get_tables", "arguments": {"extra": 1}}),
    ] {
        let response =
            call(&server, json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": params})).await;
        assert_eq!(response["result"]["isError"], json!(true), "{params}");
        assert_eq!(envelope(&response)["error"]["code"], json!("INVALID_ARGUMENTS"), "{params}");
    }
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = server(FakeProvider::new());

    let parse: Value = serde_json::from_str(&server.handle_line("{not json").await.unwrap()).unwrap();
    assert_eq!(parse["error"]["code"], json!(-32700));

    let unknown = call(&server, json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"})).await;
    assert_eq!(unknown["error"]["code"], json!(-32601));

    let missing = call(&server, json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call"})).await;
    assert_eq!(missing["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn test_notifications_and_blank_lines_get_no_response() {
    let server = server(FakeProvider::new());

    assert_eq!(server.handle_line("").await, None);
    assert_eq!(
        server.handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await,
        None
    );
}
