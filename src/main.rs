//! aimmit - CLI entry point.

use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};

use aimmit::commit::compact::{DEFAULT_BUDGET, MIN_SECTION_CHARS};
use aimmit::commit::prompt::DEFAULT_LANGUAGE;
use aimmit::config::DEFAULT_OLLAMA_URL;
use aimmit::llama::LLAMA_CLI;
use aimmit::llm::retry::MAX_ATTEMPTS;
use aimmit::{
    AssemblerOptions, CommitError, CommitMessageAssembler, DiffSummary, InferenceBackend,
    LlamaConfig, LlamaCppBackend, OllamaBackend, OllamaConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Run a local llama-cli process
    Llama,
    /// Call an Ollama server
    Ollama,
}

/// Generate a conventional commit message for a diff using a local model.
#[derive(Parser, Debug)]
#[command(name = "aimmit")]
#[command(about = "Generate a conventional commit message for a diff using a local model")]
#[command(version)]
struct Cli {
    /// Read the unified diff from this file instead of stdin
    #[arg(long)]
    diff_file: Option<PathBuf>,

    /// The diff contains only staged changes
    #[arg(long)]
    staged: bool,

    /// Inference backend
    #[arg(long, value_enum, default_value_t = Backend::Llama)]
    backend: Backend,

    /// Directory containing llama-cli and its shared libraries
    #[arg(long, env = "LLAMA_CPP_DIR")]
    llama_cpp_dir: Option<PathBuf>,

    /// Explicit path to llama-cli (overrides --llama-cpp-dir)
    #[arg(long)]
    llama_cli: Option<PathBuf>,

    /// GGUF model file for the llama backend
    #[arg(long, env = "AIMMIT_MODEL")]
    model_path: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// Ollama model name
    #[arg(long)]
    model: Option<String>,

    /// Inference timeout in seconds (defaults to AIMMIT_TIMEOUT or 120)
    #[arg(long)]
    timeout: Option<u64>,

    /// Character budget for the diff sent to the model (at least 300)
    #[arg(long, default_value_t = DEFAULT_BUDGET, value_parser = parse_budget)]
    budget: usize,

    /// Language of the generated message
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    language: String,

    /// Total inference attempts
    #[arg(long, default_value_t = MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Print the message as JSON
    #[arg(long)]
    json: bool,

    /// Print the prompt and exit without running the model
    #[arg(long)]
    only_prompt: bool,

    /// Verbose logging, including model output
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn assembler_options(&self) -> AssemblerOptions {
        AssemblerOptions {
            budget: self.budget,
            language: self.language.clone(),
            max_attempts: self.max_attempts,
        }
    }

    fn llama_executable(&self) -> PathBuf {
        match (&self.llama_cli, &self.llama_cpp_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(LLAMA_CLI),
            (None, None) => PathBuf::from(LLAMA_CLI),
        }
    }

    fn llama_config(&self) -> Result<LlamaConfig> {
        let mut config = LlamaConfig::new(
            self.model_path.clone().unwrap_or_default(),
            self.llama_executable(),
        )
        .with_verbose(self.debug);
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config.validate().context("Invalid llama.cpp configuration")?;
        Ok(config)
    }

    fn ollama_config(&self) -> OllamaConfig {
        let mut config = OllamaConfig {
            base_url: self.ollama_url.clone(),
            ..OllamaConfig::default()
        };
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(secs) = self.timeout {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// Budgets below the smallest emitted section would drop every file.
fn parse_budget(value: &str) -> Result<usize, String> {
    let budget: usize = value
        .parse()
        .map_err(|e| format!("invalid budget '{value}': {e}"))?;
    if budget < MIN_SECTION_CHARS {
        return Err(format!(
            "budget must be at least {MIN_SECTION_CHARS} characters, got {budget}"
        ));
    }
    Ok(budget)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw_diff = read_diff(&cli).context("Failed to read the diff")?;
    let diff = DiffSummary::from_unified(raw_diff, cli.staged);
    debug!(
        "Diff summary: {} file(s), +{} -{}",
        diff.files().len(),
        diff.additions(),
        diff.deletions()
    );

    match cli.backend {
        Backend::Llama => {
            let backend = LlamaCppBackend::new(cli.llama_config()?);
            run(&cli, backend, &diff).await
        }
        Backend::Ollama => {
            let backend = OllamaBackend::new(cli.ollama_config())
                .context("Failed to set up the Ollama client")?;
            run(&cli, backend, &diff).await
        }
    }
}

async fn run<B: InferenceBackend>(cli: &Cli, backend: B, diff: &DiffSummary) -> Result<()> {
    let assembler = CommitMessageAssembler::new(backend, cli.assembler_options());

    if cli.only_prompt {
        let prompt = assembler.prompt(diff);
        println!("{}", prompt.to_chat_template());
        return Ok(());
    }

    let started = Instant::now();
    let message = match assembler.generate(diff).await {
        Ok(message) => message,
        Err(CommitError::EmptyChangeset) => {
            println!("No changes found in the diff. Nothing to describe.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to generate a commit message"),
    };
    info!(
        "Commit message generated in {:.1}s",
        started.elapsed().as_secs_f64()
    );

    if cli.json {
        let json =
            serde_json::to_string_pretty(&message).context("Failed to serialize the message")?;
        println!("{json}");
    } else {
        println!("{message}");
    }

    Ok(())
}

fn read_diff(cli: &Cli) -> Result<String> {
    match &cli.diff_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Could not read the diff from stdin")?;
            Ok(buf)
        }
    }
}
