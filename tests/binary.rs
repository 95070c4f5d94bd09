//! Smoke test for the `palaryn-mcp` binary over real stdio.

use std::io::Write;
use std::process::{Command, Stdio};

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[test]
fn binary_answers_initialize_and_exits_on_eof() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_palaryn-mcp"))
        .args(["--log-level", "warn"])
        .env_remove("PALARYN_CONFIG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn palaryn-mcp");

    {
        let mut stdin = child.stdin.take().unwrap();
        let init = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2025-03-26", "clientInfo": {"name": "smoke", "version": "0"}}
        });
        writeln!(stdin, "{init}").unwrap();
        writeln!(stdin, "{}", json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).unwrap();
        // stdin dropped here: EOF
    }

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "exit status: {:?}", output.status);

    let stdout = String::from_utf8(output.stdout).unwrap();
    let responses: Vec<Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("stdout carries only JSON-RPC"))
        .collect();
    assert_eq!(responses.len(), 2);

    let init = responses.iter().find(|r| r["id"] == 1).unwrap();
    assert_eq!(init["result"]["serverInfo"]["name"], "palaryn-mcp-bridge");
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");

    let list = responses.iter().find(|r| r["id"] == 2).unwrap();
    assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 3);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Palaryn MCP server started (stdio, 3 tools)"), "{stderr}");
}

#[test]
fn binary_fails_fast_on_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "server:\n  max_in_flight: 0\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_palaryn-mcp"))
        .arg("--config")
        .arg(&path)
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Palaryn MCP server fatal error"), "{stderr}");
}
