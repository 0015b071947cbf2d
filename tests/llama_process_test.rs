//! Integration tests for the llama.cpp process backend.
//!
//! A shell script stands in for `llama-cli`, so the real spawn, stdout
//! streaming, sentinel kill and deadline paths are exercised without a model.
#![cfg(unix)]

mod common;

use std::path::Path;
use std::time::{Duration, Instant};

use aimmit::commit::prompt::{PromptEnvelope, STOP_SENTINEL};
use aimmit::llama::run_llama;
use aimmit::{InferenceBackend, InferenceError, LlamaConfig, LlamaCppBackend, RunState};

use common::{VALID_MESSAGE_JSON, create_mock_script};

fn prompt() -> PromptEnvelope {
    PromptEnvelope::new("system text", "user text")
}

fn config(script: &Path, model: &Path, timeout_secs: u64) -> LlamaConfig {
    LlamaConfig::new(model, script).with_timeout(Duration::from_secs(timeout_secs))
}

#[tokio::test]
async fn test_sentinel_stops_process_early() {
    let script = format!(
        "#!/bin/sh\necho 'thinking...'\necho '{VALID_MESSAGE_JSON}'\necho '{STOP_SENTINEL}'\nexec sleep 30\n"
    );
    let (_dir, script_path, model_path) = create_mock_script(&script);

    let started = Instant::now();
    let result = run_llama(&config(&script_path, &model_path, 60), &prompt())
        .await
        .expect("sentinel run should succeed");

    assert!(
        started.elapsed() < Duration::from_secs(10),
        "took {:?}",
        started.elapsed()
    );
    assert_eq!(result.state, RunState::KilledBySentinel);
    assert!(result.terminated_early());
    assert!(result.text.contains(VALID_MESSAGE_JSON));
    assert!(result.text.trim_end().ends_with(STOP_SENTINEL));
}

#[tokio::test]
async fn test_nothing_after_sentinel_is_captured() {
    let script = format!(
        "#!/bin/sh\necho 'answer'\necho '{STOP_SENTINEL}'\nsleep 1\necho 'after the sentinel'\nexec sleep 30\n"
    );
    let (_dir, script_path, model_path) = create_mock_script(&script);

    let result = run_llama(&config(&script_path, &model_path, 60), &prompt())
        .await
        .unwrap();

    assert_eq!(result.state, RunState::KilledBySentinel);
    assert!(!result.text.contains("after the sentinel"));
}

#[tokio::test]
async fn test_timeout_returns_partial_output() {
    let script = "#!/bin/sh\necho 'partial line one'\necho 'partial line two'\nexec sleep 30\n";
    let (_dir, script_path, model_path) = create_mock_script(script);

    let started = Instant::now();
    let err = run_llama(&config(&script_path, &model_path, 1), &prompt())
        .await
        .unwrap_err();

    assert!(
        started.elapsed() < Duration::from_secs(10),
        "took {:?}",
        started.elapsed()
    );
    match err {
        InferenceError::Timeout { secs, partial } => {
            assert_eq!(secs, 1);
            assert!(partial.contains("partial line one"));
            assert!(partial.contains("partial line two"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_natural_exit_completes() {
    let script = format!("#!/bin/sh\necho '{VALID_MESSAGE_JSON}'\nexit 0\n");
    let (_dir, script_path, model_path) = create_mock_script(&script);

    let result = run_llama(&config(&script_path, &model_path, 30), &prompt())
        .await
        .unwrap();

    assert_eq!(result.state, RunState::Completed);
    assert!(!result.terminated_early());
    assert_eq!(result.text.trim(), VALID_MESSAGE_JSON);
}

#[tokio::test]
async fn test_non_zero_exit_is_reported() {
    let script = "#!/bin/sh\necho 'error: failed to load model'\nexit 3\n";
    let (_dir, script_path, model_path) = create_mock_script(script);

    let err = run_llama(&config(&script_path, &model_path, 30), &prompt())
        .await
        .unwrap_err();

    match err {
        InferenceError::NonZeroExit { code, output } => {
            assert_eq!(code, 3);
            assert!(output.contains("failed to load model"));
        }
        other => panic!("expected non-zero exit, got {other:?}"),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_arguments_and_library_path_are_passed() {
    // Print every argument on its own line, then the library search path.
    let script = "#!/bin/sh\nfor arg in \"$@\"; do echo \"ARG:$arg\"; done\necho \"LIB:$LD_LIBRARY_PATH\"\n";
    let (dir, script_path, model_path) = create_mock_script(script);

    let result = run_llama(&config(&script_path, &model_path, 30), &prompt())
        .await
        .unwrap();

    let text = result.text;
    assert!(text.contains(&format!("ARG:{}", model_path.display())));
    assert!(text.contains("ARG:--no-display-prompt"));
    assert!(text.contains("ARG:--n-predict"));
    assert!(text.contains("ARG:--top-k"));
    assert!(text.contains("<|im_start|>system"));
    assert!(text.contains("user text"));
    assert!(text.contains(&format!("LIB:{}", dir.path().display())));
}

#[tokio::test]
async fn test_missing_executable_is_not_installed() {
    let (dir, _script_path, model_path) = create_mock_script("#!/bin/sh\nexit 0\n");
    let missing = dir.path().join("no-such-llama-cli");

    let err = run_llama(&config(&missing, &model_path, 30), &prompt())
        .await
        .unwrap_err();

    assert!(matches!(err, InferenceError::NotInstalled(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_missing_model_fails_before_spawn() {
    // The script would leave a marker file if it were ever started.
    let (dir, script_path, _model_path) =
        create_mock_script("#!/bin/sh\ntouch \"$(dirname \"$0\")/spawned\"\n");
    let missing_model = dir.path().join("missing.gguf");

    let err = run_llama(&config(&script_path, &missing_model, 30), &prompt())
        .await
        .unwrap_err();

    assert!(matches!(err, InferenceError::ModelNotFound(_)));
    assert!(!dir.path().join("spawned").exists());
}

#[tokio::test]
async fn test_backend_trait_delegates_to_process() {
    let script = format!("#!/bin/sh\necho '{VALID_MESSAGE_JSON}'\necho '{STOP_SENTINEL}'\n");
    let (_dir, script_path, model_path) = create_mock_script(&script);

    let backend = LlamaCppBackend::new(config(&script_path, &model_path, 30));
    assert_eq!(backend.name(), "llama.cpp");

    let result = backend.invoke(&prompt()).await.unwrap();
    assert!(result.text.contains(VALID_MESSAGE_JSON));
}
