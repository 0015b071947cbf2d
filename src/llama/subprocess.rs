//! llama.cpp CLI spawning with streaming output capture.
//!
//! The prompt is passed on the command line and the generated text is read
//! from stdout line by line. A dedicated task drains stdout while the calling
//! task waits for the first of: process exit, stop sentinel, deadline.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::commit::prompt::{PromptEnvelope, STOP_SENTINEL};
use crate::config::LlamaConfig;
use crate::error::InferenceError;
use crate::llm::backend::{InferenceBackend, InferenceResult, RunState};

/// Name of the llama.cpp command-line executable.
pub const LLAMA_CLI: &str = "llama-cli";

/// Variable the dynamic loader searches for shared libraries.
#[cfg(target_os = "macos")]
pub const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(windows)]
pub const LIBRARY_PATH_VAR: &str = "PATH";
#[cfg(all(not(target_os = "macos"), not(windows)))]
pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Process backend driving a local llama.cpp executable.
#[derive(Debug, Clone)]
pub struct LlamaCppBackend {
    config: LlamaConfig,
}

impl LlamaCppBackend {
    pub fn new(config: LlamaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LlamaConfig {
        &self.config
    }
}

#[async_trait]
impl InferenceBackend for LlamaCppBackend {
    fn name(&self) -> &'static str {
        "llama.cpp"
    }

    async fn invoke(&self, prompt: &PromptEnvelope) -> Result<InferenceResult, InferenceError> {
        run_llama(&self.config, prompt).await
    }
}

/// Locate the executable.
///
/// Paths with a directory component must exist as given; bare names are
/// looked up on `PATH` with the `which` crate.
pub fn resolve_executable(path: &Path) -> Result<PathBuf, InferenceError> {
    let is_bare_name = path.components().count() == 1 && !path.is_absolute();
    if is_bare_name {
        return which::which(path)
            .map_err(|_| InferenceError::NotInstalled(path.display().to_string()));
    }

    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(InferenceError::NotInstalled(path.display().to_string()))
    }
}

/// Library search path with `dir` in front of any inherited entries.
fn library_search_path(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = env::var_os(LIBRARY_PATH_VAR) {
        paths.extend(env::split_paths(&existing));
    }
    env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_owned())
}

/// Build the llama.cpp command line for a rendered prompt.
fn build_command(config: &LlamaConfig, executable: &Path, prompt: &str) -> Command {
    let mut cmd = Command::new(executable);
    cmd.arg("-m")
        .arg(&config.model_path)
        .arg("-p")
        .arg(prompt)
        .arg("--no-display-prompt")
        .arg("--n-predict")
        .arg(config.max_tokens.to_string())
        .arg("--min-p")
        .arg(format!("{:.2}", config.min_p))
        .arg("--temp")
        .arg(format!("{:.2}", config.temperature))
        .arg("--top-p")
        .arg(format!("{:.2}", config.top_p))
        .arg("--top-k")
        .arg(config.top_k.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(if config.verbose {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    if let Some(dir) = executable.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd.env(LIBRARY_PATH_VAR, library_search_path(dir));
    }

    cmd
}

fn transition(state: &mut RunState, next: RunState) {
    debug_assert!(!state.is_terminal(), "llama.cpp run already finished");
    debug!("llama.cpp run: {} -> {}", state, next);
    *state = next;
}

/// Kill the child. A child that already exited is not an error.
async fn kill_quietly(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!("Ignoring kill failure for finished llama.cpp process: {e}");
    }
}

/// What ended the wait on the child.
enum Wake {
    Exited(io::Result<ExitStatus>),
    Sentinel,
    Deadline,
}

/// Run llama.cpp with `prompt` and collect its output.
///
/// Returns once the process exits, prints [`STOP_SENTINEL`], or exceeds
/// `config.timeout`. The sentinel and the deadline both kill the process;
/// only the deadline is an error, and that error still carries the partial
/// output.
pub async fn run_llama(
    config: &LlamaConfig,
    prompt: &PromptEnvelope,
) -> Result<InferenceResult, InferenceError> {
    let mut state = RunState::NotStarted;

    if !config.model_path.is_file() {
        transition(&mut state, RunState::FailedToStart);
        return Err(InferenceError::ModelNotFound(
            config.model_path.display().to_string(),
        ));
    }

    let executable = match resolve_executable(&config.executable_path) {
        Ok(path) => path,
        Err(e) => {
            transition(&mut state, RunState::FailedToStart);
            return Err(e);
        }
    };

    let rendered = prompt.to_chat_template();
    if config.verbose {
        debug!("llama.cpp prompt:\n{rendered}");
    }

    let mut child = match build_command(config, &executable, &rendered).spawn() {
        Ok(child) => child,
        Err(e) => {
            transition(&mut state, RunState::FailedToStart);
            return Err(InferenceError::SpawnFailed(e));
        }
    };
    transition(&mut state, RunState::Running);
    let started = Instant::now();

    let Some(stdout) = child.stdout.take() else {
        kill_quietly(&mut child).await;
        return Err(InferenceError::Io(io::Error::other("stdout was not captured")));
    };
    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("llama.cpp stderr: {line}");
            }
        })
    });

    let (sentinel_tx, mut sentinel_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut reader = tokio::spawn(drain_stdout(
        stdout,
        STOP_SENTINEL,
        config.verbose,
        sentinel_tx,
        stop_rx,
    ));

    let deadline = tokio::time::sleep(config.timeout);
    tokio::pin!(deadline);

    let wake = tokio::select! {
        status = child.wait() => Wake::Exited(status),
        Ok(()) = &mut sentinel_rx => Wake::Sentinel,
        _ = &mut deadline => Wake::Deadline,
    };

    let (next, exit_status) = match wake {
        Wake::Exited(status) => (RunState::Completed, Some(status)),
        Wake::Sentinel => {
            debug!("Stop sentinel seen, stopping llama.cpp");
            (RunState::KilledBySentinel, None)
        }
        Wake::Deadline => {
            warn!(
                "llama.cpp exceeded {}s timeout, killing it",
                config.timeout.as_secs()
            );
            (RunState::KilledByTimeout, None)
        }
    };
    if next.terminated_early() {
        kill_quietly(&mut child).await;
    }
    transition(&mut state, next);

    // The accumulator is only handed over once the reader task has finished.
    let joined = if next == RunState::Completed {
        let remaining = deadline
            .deadline()
            .saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, &mut reader).await {
            Ok(joined) => joined,
            Err(_) => {
                let _ = stop_tx.send(true);
                (&mut reader).await
            }
        }
    } else {
        let _ = stop_tx.send(true);
        (&mut reader).await
    };
    if let Some(task) = stderr_task {
        task.abort();
    }

    let text = joined.map_err(|e| InferenceError::Io(io::Error::other(e)))?;

    info!(
        "llama.cpp {} after {:.1}s ({} bytes of output)",
        state,
        started.elapsed().as_secs_f64(),
        text.len()
    );

    match state {
        RunState::KilledByTimeout => Err(InferenceError::Timeout {
            secs: config.timeout.as_secs(),
            partial: text,
        }),
        _ => {
            if let Some(status) = exit_status {
                let status = status.map_err(InferenceError::Io)?;
                if !status.success() {
                    return Err(InferenceError::NonZeroExit {
                        code: status.code().unwrap_or(-1),
                        output: text,
                    });
                }
            }
            Ok(InferenceResult { text, state })
        }
    }
}

/// Read `stdout` line by line into an owned accumulator.
///
/// Stops at end of stream, at the first line containing `sentinel` (after
/// signalling `sentinel_tx`), or when `stop_rx` changes. A partially read
/// line is kept when stopping. Invalid UTF-8 is replaced rather than
/// rejected.
async fn drain_stdout<R>(
    stdout: R,
    sentinel: &'static str,
    echo: bool,
    sentinel_tx: oneshot::Sender<()>,
    mut stop_rx: watch::Receiver<bool>,
) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut text = String::new();
    let mut buf = Vec::new();
    let mut sentinel_tx = Some(sentinel_tx);

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = stop_rx.changed() => None,
            read = reader.read_until(b'\n', &mut buf) => Some(read),
        };

        match read {
            None => {
                if !buf.is_empty() {
                    text.push_str(&String::from_utf8_lossy(&buf));
                }
                break;
            }
            Some(Ok(0)) => break,
            Some(Ok(_)) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if echo {
                    debug!("llama.cpp: {line}");
                }
                text.push_str(line);
                text.push('\n');

                if line.contains(sentinel) {
                    if let Some(tx) = sentinel_tx.take() {
                        let _ = tx.send(());
                    }
                    break;
                }
            }
            Some(Err(e)) => {
                warn!("Failed to read llama.cpp output: {e}");
                break;
            }
        }
    }

    text
}
