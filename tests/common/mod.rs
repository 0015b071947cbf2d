//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use aimmit::DiffSummary;
use tempfile::TempDir;

/// A well-formed commit message object as a model would print it.
pub const VALID_MESSAGE_JSON: &str =
    r#"{"type":"feat","scope":"auth","subject":"add login endpoint","body":"Adds POST /login.","breaking_changes":false}"#;

/// A small staged diff touching one file.
pub fn sample_diff() -> DiffSummary {
    DiffSummary::from_unified(
        "diff --git a/src/auth.rs b/src/auth.rs\n\
         --- a/src/auth.rs\n\
         +++ b/src/auth.rs\n\
         @@ -1,2 +1,3 @@\n \
         fn health() {}\n\
         +fn login() {}\n",
        true,
    )
}

/// Create an executable shell script standing in for `llama-cli`.
///
/// Returns the temp directory (keep it alive for the test), the script path,
/// and the path of an empty placeholder model file in the same directory.
#[cfg(unix)]
pub fn create_mock_script(script_content: &str) -> (TempDir, PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let script_path = temp_dir.path().join("llama-cli");

    let mut file = File::create(&script_path).expect("Failed to create mock script");
    file.write_all(script_content.as_bytes())
        .expect("Failed to write mock script");
    drop(file);

    // Make executable
    let mut perms = fs::metadata(&script_path)
        .expect("Failed to get metadata")
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script_path, perms).expect("Failed to set permissions");

    let model_path = temp_dir.path().join("model.gguf");
    fs::write(&model_path, b"GGUF").expect("Failed to write model file");

    (temp_dir, script_path, model_path)
}
