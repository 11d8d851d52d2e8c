//! Output Validation Tests
//!
//! Validates that everything tabletalk prints for machines conforms to the envelope
//! contract:
//! - Success envelopes carry exactly `ok`, `engine`, `command`, `data`, `meta`
//! - Error envelopes carry exactly `ok`, `engine`, `command`, `error`
//! - Error bodies never contain raw database text
//! - Verdicts and turn outcomes serialize to stable shapes
//!
//! Uses `insta` for snapshot testing to detect unintended output changes.

mod support;

use serde_json::{json, Value};
use support::{executor, FakeProvider, RecordingGenerator};

use tabletalk::{
    validate, ConversationRouter, ErrorEnvelope, ErrorInfo, IntentClassifier, Metadata, QueryResult,
    RejectReason, SuccessEnvelope, TalkError, ToolCall,
};

fn keys(value: &Value) -> Vec<&str> {
    let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

// ============================================================================
// Envelope Structure Tests
// ============================================================================

#[test]
fn test_success_envelope_structure() {
    let result = QueryResult::from_columns(vec![("table_name".into(), vec![json!("web_items")])], false);
    let envelope = SuccessEnvelope::from_result("sqlite", "get_tables", result, 42);
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(keys(&value), vec!["command", "data", "engine", "meta", "ok"]);
    assert_eq!(value["ok"], true);
    assert_eq!(keys(&value["data"]), vec!["columns", "row_count", "truncated"]);
    assert_eq!(value["meta"], json!({"execution_ms": 42, "rows_returned": 1, "truncated": false}));
}

#[test]
fn test_error_envelope_structure() {
    let envelope = ErrorEnvelope::new("sqlite", "describe_table", ErrorInfo::new("UNKNOWN_TABLE", "unknown-table", "No such table"));
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(keys(&value), vec!["command", "engine", "error", "ok"]);
    assert_eq!(value["ok"], false);
    assert_eq!(keys(&value["error"]), vec!["code", "message", "reason"]);
}

#[test]
fn test_all_error_codes_are_consistent() {
    let errors = [
        TalkError::validation_rejected(RejectReason::Malformed),
        TalkError::unknown_table("t"),
        TalkError::backend_unavailable("refused"),
        TalkError::query_failed("syntax"),
        TalkError::invalid_arguments("bad"),
        TalkError::config_error("missing"),
        TalkError::generation_failed("offline"),
    ];

    for err in &errors {
        let code = err.error_code();
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{code}");

        let reason = err.reason_code();
        assert!(reason.chars().all(|c| c.is_ascii_lowercase() || c == '-' || c == ':'), "{reason}");

        assert!(!err.user_message().is_empty());
    }
}

// ============================================================================
// Snapshot Tests
// ============================================================================

#[test]
fn test_success_envelope_snapshot() {
    let result = QueryResult::from_columns(vec![("record_count".into(), vec![json!(3)])], false);
    let envelope = SuccessEnvelope::from_result("sqlite", "count_records", result, 7);

    insta::assert_snapshot!(serde_json::to_string_pretty(&envelope).unwrap(), @r#"
    {
      "ok": true,
      "engine": "sqlite",
      "command": "count_records",
      "data": {
        "columns": [
          {
            "name": "record_count",
            "values": [
              3
            ]
          }
        ],
        "row_count": 1,
        "truncated": false
      },
      "meta": {
        "execution_ms": 7,
        "rows_returned": 1,
        "truncated": false
      }
    }
    "#);
}

#[test]
fn test_error_envelope_from_rejection() {
    let err = TalkError::validation_rejected(RejectReason::StackedStatement);
    let envelope = ErrorEnvelope::from_error("postgres", "execute_select", &err);

    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "ok": false,
            "engine": "postgres",
            "command": "execute_select",
            "error": {
                "code": "VALIDATION_REJECTED",
                "reason": "validation-rejected:stacked-statement",
                "message": err.user_message(),
            }
        })
    );
}

#[test]
fn test_verdict_shapes() {
    assert_eq!(
        serde_json::to_value(validate("SELECT 1", 10)).unwrap(),
        json!({"verdict": "accepted", "statement": "SELECT 1 LIMIT 10", "applied_limit": 10})
    );
    assert_eq!(
        serde_json::to_value(validate("SELECT 1; SELECT 2", 10)).unwrap(),
        json!({"verdict": "rejected", "reason": "stacked-statement"})
    );
    assert_eq!(
        serde_json::to_value(validate("SELECT * INTO t2 FROM t", 10)).unwrap(),
        json!({"verdict": "rejected", "reason": "forbidden-keyword:INTO"})
    );
}

#[test]
fn test_metadata_without_rows_omits_fields() {
    let value = serde_json::to_value(Metadata::new(5)).unwrap();
    assert_eq!(value, json!({"execution_ms": 5}));
}

// ============================================================================
// Real Output Tests
// ============================================================================

#[tokio::test]
async fn test_failed_tool_output_hides_internals() {
    let executor = executor(FakeProvider::new().unavailable(), 1000);
    let err = executor.execute(&ToolCall::GetTables).await.unwrap_err();
    let text = serde_json::to_string(&ErrorEnvelope::from_error("sqlite", "get_tables", &err)).unwrap();

    assert!(text.contains(r#""code":"BACKEND_UNAVAILABLE""#));
    assert!(!text.contains("fake"));
    assert!(!text.contains("refused"));
}

#[tokio::test]
async fn test_turn_outcome_shape() {
    let provider = FakeProvider::new().with_items("web_items", 2);
    let mut router = ConversationRouter::new(
        executor(provider, 1000),
        IntentClassifier::default(),
        RecordingGenerator::replying(&["Two."]),
    );

    let outcome = router.turn("how many rows in web_items").await;
    let value = serde_json::to_value(&outcome).unwrap();

    assert_eq!(keys(&value), vec!["intent", "response", "result", "states"]);
    assert_eq!(
        value["intent"],
        json!({"tool": "count_records", "arguments": {"table_name": "web_items"}, "confident": true})
    );
    assert_eq!(value["states"], json!(["received", "classified", "tool_executed", "responded"]));
    assert_eq!(value["response"], "Two.");
}

#[tokio::test]
async fn test_declined_turn_outcome_shape() {
    let mut router = ConversationRouter::new(
        executor(FakeProvider::new(), 1000),
        IntentClassifier::default(),
        RecordingGenerator::replying(&["never"]),
    );

    let value = serde_json::to_value(router.turn("tell me a joke").await).unwrap();
    assert_eq!(value["intent"], json!({"tool": null, "arguments": {}, "confident": false, "reason": "out-of-domain"}));
    assert!(value.get("result").is_none());
    assert!(value.get("error").is_none());
}
