// transport/tests/transport.rs

use mockito::Server;
use serde_json::json;
use transport::{Transport, TransportError};

#[test]
fn send_request_success() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","result":123,"id":1}"#)
        .create();

    let tx = Transport::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let result = rt.block_on(tx.send_request("foo", &[] as &[u8])).unwrap();

    assert_eq!(result, json!(123));
}

#[test]
fn send_request_rpc_error() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","error":{"code":-1,"message":"oops"},"id":1}"#)
        .create();

    let tx = Transport::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let err = rt
        .block_on(tx.send_request("bar", &[] as &[u8]))
        .unwrap_err();

    match err {
        TransportError::Rpc(v) => {
            assert_eq!(v["message"], json!("oops"));
        }
        other => panic!("expected Rpc error, got {:?}", other),
    }
}

#[test]
fn test_connection_error() {
    let tx = Transport::new("http://127.0.0.1:0");
    let rt = tokio::runtime::Runtime::new().unwrap();

    let err = rt
        .block_on(tx.send_request("foo", &[] as &[u8]))
        .unwrap_err();

    match err {
        TransportError::Http(0, _) => {}
        other => panic!("expected Http(0, _) error, got {:?}", other),
    }
}

#[test]
fn missing_result_error() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1}"#)
        .create();

    let tx = Transport::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let err = rt
        .block_on(tx.send_request("foo", &[] as &[u8]))
        .unwrap_err();

    match err {
        TransportError::MissingResult => {}
        other => panic!("expected MissingResult error, got {:?}", other),
    }
}

#[test]
fn call_method_with_type_deserialization() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","result":{"name":"test","value":42},"id":1}"#)
        .create();

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct TestResult {
        name: String,
        value: u32,
    }

    let tx = Transport::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let result: TestResult = rt.block_on(tx.call("test_method", &[] as &[u8])).unwrap();

    assert_eq!(
        result,
        TestResult {
            name: "test".to_string(),
            value: 42,
        }
    );
}

#[test]
fn new_with_cookie_reads_user_and_password() {
    let dir = tempfile::tempdir().unwrap();
    let cookie_path = dir.path().join(".cookie");
    std::fs::write(&cookie_path, "rpcuser:s3cret\n").unwrap();

    // Constructing must succeed; the resulting auth header is exercised
    // indirectly via new_with_auth's own tests since Transport does not
    // expose its header for direct inspection.
    let tx = Transport::new_with_cookie("http://127.0.0.1:18443", &cookie_path);
    assert!(tx.is_ok());
}

#[test]
fn new_with_cookie_missing_file() {
    let missing = std::path::PathBuf::from("/nonexistent/.cookie");
    let err = Transport::new_with_cookie("http://127.0.0.1:18443", &missing).unwrap_err();
    match err {
        TransportError::Cookie(_, _) => {}
        other => panic!("expected Cookie error, got {:?}", other),
    }
}

#[test]
fn new_with_cookie_malformed_contents() {
    let dir = tempfile::tempdir().unwrap();
    let cookie_path = dir.path().join(".cookie");
    std::fs::write(&cookie_path, "no-colon-here").unwrap();

    let err = Transport::new_with_cookie("http://127.0.0.1:18443", &cookie_path).unwrap_err();
    match err {
        TransportError::Cookie(_, msg) => assert!(msg.contains("user:password")),
        other => panic!("expected Cookie error, got {:?}", other),
    }
}

#[test]
fn send_batch_success_positionally_aligned() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"jsonrpc":"1.0","result":123,"id":"batch-0"},{"jsonrpc":"1.0","result":"abc","id":"batch-1"}]"#,
        )
        .create();

    let tx = Transport::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let calls = vec![
        ("foo", json!([])),
        ("bar", json!(["test"])),
    ];
    let results = rt.block_on(tx.send_batch(&calls)).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0], Some(json!(123)));
    assert_eq!(results[1], Some(json!("abc")));
}

#[test]
fn send_batch_one_bad_entry_does_not_fail_the_rest() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"jsonrpc":"1.0","error":{"code":-5,"message":"not found"},"id":"batch-0"},{"jsonrpc":"1.0","result":"abc","id":"batch-1"}]"#,
        )
        .create();

    let tx = Transport::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let calls = vec![("foo", json!([])), ("bar", json!([]))];
    let results = rt.block_on(tx.send_batch(&calls)).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0], None);
    assert_eq!(results[1], Some(json!("abc")));
}

#[test]
fn send_batch_empty_is_noop() {
    let tx = Transport::new("http://127.0.0.1:18443");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let results = rt.block_on(tx.send_batch(&[])).unwrap();
    assert!(results.is_empty());
}
