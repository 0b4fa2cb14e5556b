//! # docchat CLI
//!
//! Pick a document source, fetch it into the staging directory, index it,
//! and chat with it on stdin.
//!
//! ```bash
//! docchat zip ./handbook.zip
//! docchat s3 --bucket-name team-docs --path handbook/
//! docchat sftp --hostname files.example.com --username me --path /srv/docs
//! docchat git --repo-url https://github.com/org/repo.git --branch main --path docs
//! ```
//!
//! Secrets can come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
//! `DOCCHAT_SFTP_PASSWORD`, and `DOCCHAT_GIT_TOKEN` instead of flags.
//!
//! The source subcommand is optional; without one the chat starts unloaded.
//! In the chat loop:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/load <source args>` | Load another source, e.g. `/load s3 --bucket-name b --path docs/` |
//! | `/reload` | Re-run the current load |
//! | `/model <tier>` | Change the model tier and reload |
//! | `/temperature <t>` | Change the temperature and reload |
//! | `/system [prompt]` | Change (or clear) the system prompt and reload |
//! | `/history` | Print the conversation |
//! | `/help` | List the commands |
//! | `/quit` | Exit |
//!
//! Changing any load parameter keeps the conversation; a parameter tuple
//! that was loaded before is served from the index cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use docchat::config::{self, Config};
use docchat::error::SessionError;
use docchat::ingest::Ingestor;
use docchat::models::{ModelConfig, ModelTier, Role, SourceDescriptor, SourceKind};
use docchat::progress::ProgressMode;
use docchat::selector::{build_descriptor, read_archive};
use docchat::session::{LoadParams, Session};

/// Chat with your documents from a zip file, S3 bucket, SFTP server, or git
/// repository.
#[derive(Parser)]
#[command(name = "docchat", version)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    /// Model tier, overriding `[llm].model`.
    #[arg(long, global = true, value_enum)]
    model: Option<ModelTier>,

    /// Sampling temperature in [0.0, 1.0], overriding `[llm].temperature`.
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// System prompt, overriding `[llm].system_prompt`.
    #[arg(long, global = true)]
    system_prompt: Option<String>,

    /// Ingestion notices on stderr. Defaults to `human` on a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    source: Option<SourceCommand>,
}

/// Arguments of the `/load` chat command.
#[derive(Parser)]
#[command(name = "/load", no_binary_name = true, disable_version_flag = true)]
struct LoadCommand {
    #[command(subcommand)]
    source: SourceCommand,
}

/// Where the documents come from.
#[derive(Subcommand)]
enum SourceCommand {
    /// Extract a local zip file.
    Zip {
        /// The zip file to extract.
        file: PathBuf,
    },

    /// Download objects under a prefix from an S3 bucket.
    S3 {
        #[arg(long)]
        bucket_name: String,
        #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
        key_id: String,
        #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
        key_secret: String,
        /// Key prefix; empty means the whole bucket.
        #[arg(long, default_value = "")]
        path: String,
    },

    /// Copy the files in one directory of an SFTP server.
    Sftp {
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "DOCCHAT_SFTP_PASSWORD", hide_env_values = true)]
        password: String,
        /// Remote directory; empty means the login directory.
        #[arg(long, default_value = "")]
        path: String,
    },

    /// Clone a git repository and use the files under a sub-path.
    Git {
        #[arg(long)]
        repo_url: String,
        /// Token for private HTTPS repositories.
        #[arg(long, env = "DOCCHAT_GIT_TOKEN", hide_env_values = true, default_value = "")]
        access_token: String,
        /// Defaults to `[sources].git_default_branch`.
        #[arg(long)]
        branch: Option<String>,
        /// Sub-path inside the repository; empty means the whole tree.
        #[arg(long, default_value = "")]
        path: String,
    },
}

impl SourceCommand {
    fn into_descriptor(self) -> Result<SourceDescriptor> {
        let mut creds = BTreeMap::new();
        let descriptor = match self {
            SourceCommand::Zip { file } => {
                let bytes = read_archive(&file)?;
                build_descriptor(SourceKind::Archive, &creds, None, Some(bytes))?
            }
            SourceCommand::S3 {
                bucket_name,
                key_id,
                key_secret,
                path,
            } => {
                creds.insert("bucket_name".to_string(), bucket_name);
                creds.insert("key_id".to_string(), key_id);
                creds.insert("key_secret".to_string(), key_secret);
                build_descriptor(SourceKind::ObjectStorage, &creds, Some(&path), None)?
            }
            SourceCommand::Sftp {
                hostname,
                username,
                password,
                path,
            } => {
                creds.insert("hostname".to_string(), hostname);
                creds.insert("username".to_string(), username);
                creds.insert("password".to_string(), password);
                build_descriptor(SourceKind::RemoteFileServer, &creds, Some(&path), None)?
            }
            SourceCommand::Git {
                repo_url,
                access_token,
                branch,
                path,
            } => {
                creds.insert("repo_url".to_string(), repo_url);
                creds.insert("access_token".to_string(), access_token);
                if let Some(branch) = branch {
                    creds.insert("branch".to_string(), branch);
                }
                build_descriptor(SourceKind::VersionControl, &creds, Some(&path), None)?
            }
        };
        Ok(descriptor)
    }
}

fn init_tracing(cfg: &Config) {
    let default = if cfg.llm.verbose {
        "warn,docchat::chat=info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// One line typed into the chat loop.
enum ReplCommand<'a> {
    Quit,
    Help,
    History,
    Reload,
    Load(SourceCommand),
    Model(ModelTier),
    Temperature(f32),
    SystemPrompt(&'a str),
    Prompt(&'a str),
}

const REPL_HELP: &str = "\
/load <source args>  load another source (zip, s3, sftp, git)
/reload              re-run the current load
/model <tier>        change the model tier
/temperature <t>     change the temperature, 0.0 to 1.0
/system [prompt]     change or clear the system prompt
/history             print the conversation
/quit                exit";

/// Parse one chat-loop line. Lines not starting with `/` are prompts.
fn parse_repl_line(line: &str) -> Result<ReplCommand<'_>> {
    let line = line.trim();
    if !line.starts_with('/') {
        return Ok(ReplCommand::Prompt(line));
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let command = match name {
        "/quit" | "/exit" => ReplCommand::Quit,
        "/help" => ReplCommand::Help,
        "/history" => ReplCommand::History,
        "/reload" => ReplCommand::Reload,
        "/load" => {
            // Arguments split on whitespace; secrets with spaces go through
            // the environment variables instead.
            let parsed = LoadCommand::try_parse_from(rest.split_whitespace())?;
            ReplCommand::Load(parsed.source)
        }
        "/model" => {
            let tier = <ModelTier as ValueEnum>::from_str(rest, true)
                .map_err(|e| anyhow::anyhow!("unknown model tier '{}': {}", rest, e))?;
            ReplCommand::Model(tier)
        }
        "/temperature" => {
            let t: f32 = rest
                .parse()
                .with_context(|| format!("invalid temperature '{}'", rest))?;
            config::validate_temperature(t)?;
            ReplCommand::Temperature(t)
        }
        "/system" => ReplCommand::SystemPrompt(rest),
        other => anyhow::bail!("unknown command {} (type /help)", other),
    };
    Ok(command)
}

/// The load parameters the chat loop can change between loads.
struct LoadState {
    source: Option<SourceDescriptor>,
    model: ModelConfig,
}

impl LoadState {
    fn params(&self) -> Option<LoadParams> {
        self.source.as_ref().map(|source| LoadParams {
            source: source.clone(),
            model: self.model.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    if let Some(model) = cli.model {
        cfg.llm.model = model;
    }
    if let Some(t) = cli.temperature {
        config::validate_temperature(t)?;
        cfg.llm.temperature = t;
    }
    if let Some(prompt) = cli.system_prompt {
        cfg.llm.system_prompt = prompt;
    }

    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();
    let ingestor = Ingestor::from_config(&cfg).with_reporter(reporter);
    let mut session = Session::from_config(&cfg, ingestor)?;

    for entry in session.log() {
        println!("{}", entry.content);
    }

    let mut state = LoadState {
        source: None,
        model: cfg.llm.model_config(),
    };
    match cli.source.map(SourceCommand::into_descriptor).transpose() {
        Ok(source) => state.source = source,
        Err(e) => eprintln!("error: {:#}", e),
    }
    match state.params() {
        Some(params) => load(&mut session, &params).await,
        None => eprintln!("No documents loaded yet. Type /load <source args> or /help."),
    }

    run_repl(&mut session, &mut state).await
}

async fn load(session: &mut Session, params: &LoadParams) {
    match session.load(params).await {
        Ok(outcome) if outcome.cached => {
            eprintln!("Reusing index ({} chunks).", outcome.chunks);
        }
        Ok(outcome) => {
            eprintln!("Indexed {} chunks. Ask away.", outcome.chunks);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Fix the problem and type /reload, or /load with corrected arguments.");
        }
    }
}

/// Reload with the current parameters, if a source has been chosen.
async fn reload(session: &mut Session, state: &LoadState) {
    match state.params() {
        Some(params) => load(session, &params).await,
        None => eprintln!("No source chosen yet. Type /load <source args>."),
    }
}

async fn run_repl(session: &mut Session, state: &mut LoadState) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match parse_repl_line(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{}", REPL_HELP),
            ReplCommand::History => {
                for entry in session.log() {
                    let speaker = match entry.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                        Role::System => "system",
                    };
                    println!("[{}] {}", speaker, entry.content);
                }
            }
            ReplCommand::Reload => reload(session, state).await,
            ReplCommand::Load(source) => match source.into_descriptor() {
                Ok(descriptor) => {
                    state.source = Some(descriptor);
                    reload(session, state).await;
                }
                Err(e) => eprintln!("error: {:#}", e),
            },
            ReplCommand::Model(tier) => {
                state.model.model = tier;
                reload(session, state).await;
            }
            ReplCommand::Temperature(t) => {
                state.model.temperature = t;
                reload(session, state).await;
            }
            ReplCommand::SystemPrompt(prompt) => {
                state.model.system_prompt = prompt.to_string();
                reload(session, state).await;
            }
            ReplCommand::Prompt(prompt) => match session.submit(prompt).await {
                Ok(Some(reply)) => println!("{}", reply.response),
                Ok(None) => {}
                Err(SessionError::NotLoaded) => {
                    eprintln!("No documents loaded yet. Type /load <source args> or /reload.");
                }
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }
    Ok(())
}
