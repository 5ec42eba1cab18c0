//! Evaluate generated scripts with a real `node`
//!
//! Tests that need a JavaScript engine call [`node_available`] first and
//! return early when it is missing.

use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const HARNESS_PRELUDE: &str = "\
const fs = require('fs');
const path = require('path');
const Module = require('module');
(0, eval)(fs.readFileSync(process.argv[2], 'utf8'));
const output = (function () {
";

const HARNESS_EPILOGUE: &str = "
})();
process.stdout.write(JSON.stringify(output === undefined ? null : output));
";

pub fn node_available() -> bool {
    which::which("node").is_ok()
}

/// Evaluate `script` at global scope, then run `body` as a function body and
/// return what it returns, decoded from JSON.
///
/// `body` sees `fs`, `path`, `Module` and the node `require`; the script's
/// top-level bindings (`snapshotResult`, `snapshotAuxiliaryData`) are globals.
pub fn run_script(script: &str, body: &str) -> Result<serde_json::Value, String> {
    let dir = TempDir::new().map_err(|e| e.to_string())?;
    let script_path = dir.path().join("snapshot.js");
    let harness_path = dir.path().join("harness.js");
    std::fs::write(&script_path, script).map_err(|e| e.to_string())?;
    std::fs::write(
        &harness_path,
        format!("{}{}{}", HARNESS_PRELUDE, body, HARNESS_EPILOGUE),
    )
    .map_err(|e| e.to_string())?;

    let output = Command::new(node_binary()?)
        .arg(&harness_path)
        .arg(&script_path)
        .output()
        .map_err(|e| e.to_string())?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).into_owned());
    }
    serde_json::from_slice(&output.stdout).map_err(|e| e.to_string())
}

fn node_binary() -> Result<PathBuf, String> {
    which::which("node").map_err(|e| e.to_string())
}
