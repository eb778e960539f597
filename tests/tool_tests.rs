// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unfold::tools::{DecompilerHandle, HttpDecompilerBackend, ToolRegistry};

async fn decompiler_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn registry_for(binary: &Path, server: &MockServer) -> (ToolRegistry, Arc<DecompilerHandle>) {
    let backend = HttpDecompilerBackend::new(server.uri()).with_project_dir("/tmp/unfold-projects");
    let handle = Arc::new(DecompilerHandle::new(Arc::new(backend)));
    let registry = ToolRegistry::for_binary(binary, handle.clone()).unwrap();
    (registry, handle)
}

fn binary() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"\x7fELF\x02\x01\x01\0flag{not_here}\0main\0").unwrap();
    file
}

#[test]
fn test_registry_for_binary_lists_every_tool() {
    let file = binary();
    let backend = HttpDecompilerBackend::new("http://127.0.0.1:1");
    let handle = Arc::new(DecompilerHandle::new(Arc::new(backend)));
    let registry = ToolRegistry::for_binary(file.path(), handle.clone()).unwrap();

    for name in [
        "analyze_binary",
        "list_functions",
        "decompile",
        "get_xrefs_to",
        "get_xrefs_from",
        "get_strings",
        "get_imports_exports",
        "rename_function",
        "read_bytes",
        "file_info",
        "binary_info",
        "raw_strings",
        "binary_size",
    ] {
        assert!(registry.contains(name), "missing {name}");
    }
    assert_eq!(registry.len(), 13);
    assert_eq!(registry.definitions().len(), 13);
    assert!(!handle.is_started());
}

#[tokio::test]
async fn test_decompile_through_http_backend() {
    let file = binary();
    let server = decompiler_server().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_partial_json(json!({
            "operation": "decompile",
            "binary": file.path(),
            "project_dir": "/tmp/unfold-projects",
            "args": {"function": "main"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"name": "main", "address": "0x401000", "code": "int main(void) { return 0; }"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let (registry, handle) = registry_for(file.path(), &server);

    let output = registry
        .dispatch("decompile", json!({"function": "main"}))
        .await;
    let parsed: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["address"], "0x401000");
    assert!(handle.is_started());

    // Prefixed names resolve to the same tool; the backend is started only once
    let output = registry
        .dispatch("functions.decompile", json!({"function": "main"}))
        .await;
    assert!(output.contains("int main(void)"));
}

#[tokio::test]
async fn test_backend_error_kinds_become_payloads() {
    let file = binary();
    let server = decompiler_server().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_partial_json(json!({"operation": "get_xrefs_to"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"kind": "NotFound", "message": "no function or symbol named nope"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_partial_json(json!({"operation": "list_functions"})))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"kind": "JVMException", "message": "java.lang.OutOfMemoryError: Java heap space"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_partial_json(json!({"operation": "get_strings"})))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let (registry, _handle) = registry_for(file.path(), &server);

    let output = registry
        .dispatch("get_xrefs_to", json!({"target": "nope"}))
        .await;
    assert_eq!(
        output,
        json!({"error": "NotFound: no function or symbol named nope"}).to_string()
    );

    let output = registry.dispatch("list_functions", json!({})).await;
    assert!(output.contains("JVMException"));
    assert!(output.contains("_JAVA_OPTIONS='-Xmx4g'"));

    let output = registry.dispatch("get_strings", json!({})).await;
    assert!(output.contains("BackendError: 503"));
}

#[tokio::test]
async fn test_read_bytes_count_is_clamped() {
    let file = binary();
    let server = decompiler_server().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_partial_json(json!({
            "operation": "read_bytes",
            "args": {"address": "0x1000", "count": 1024}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "00 01 02"})))
        .expect(1)
        .mount(&server)
        .await;

    let (registry, _handle) = registry_for(file.path(), &server);
    let output = registry
        .dispatch("read_bytes", json!({"address": "0x1000", "count": 999999}))
        .await;
    assert_eq!(output, "00 01 02");
}

#[tokio::test]
async fn test_invalid_arguments_never_start_backend() {
    let file = binary();
    let server = MockServer::start().await;
    let (registry, handle) = registry_for(file.path(), &server);

    let output = registry.dispatch("rename_function", json!({"target": "f"})).await;
    assert!(output.contains("InvalidArguments"));
    assert!(output.contains("new_name"));
    assert!(!handle.is_started());
}

#[tokio::test]
async fn test_unreachable_backend() {
    let file = binary();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let backend = HttpDecompilerBackend::new(format!("http://127.0.0.1:{port}"));
    let handle = Arc::new(DecompilerHandle::new(Arc::new(backend)));
    let registry = ToolRegistry::for_binary(file.path(), handle.clone()).unwrap();

    let output = registry.dispatch("analyze_binary", json!({})).await;
    assert!(output.contains("BackendUnavailable"), "{output}");
    assert!(!handle.is_started());
}

#[tokio::test]
async fn test_shutdown_is_sent_once() {
    let file = binary();
    let server = decompiler_server().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"functions": 3}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shutdown"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (registry, handle) = registry_for(file.path(), &server);
    registry.dispatch("analyze_binary", json!({})).await;

    handle.shutdown().await.unwrap();
    handle.shutdown().await.unwrap();

    let output = registry.dispatch("list_functions", json!({})).await;
    assert!(output.contains("BackendStopped"));
}

#[tokio::test]
async fn test_file_tools_on_real_file() {
    let file = binary();
    let server = MockServer::start().await;
    let (registry, handle) = registry_for(file.path(), &server);

    let strings = registry
        .dispatch("raw_strings", json!({"min_length": 6}))
        .await;
    assert!(strings.contains("flag{not_here}"));
    assert!(!strings.contains("main"));

    let size: Value = serde_json::from_str(&registry.dispatch("binary_size", json!({})).await).unwrap();
    assert_eq!(size["file_size"], 28);
    assert_eq!(size["sha256"].as_str().unwrap().len(), 64);

    // File tools never touch the decompiler
    assert!(!handle.is_started());
}
