//! docchat CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use docchat::{
    commands::{
        cmd_create_session, cmd_delete_session, cmd_health, cmd_history, cmd_init,
        cmd_list_documents, cmd_list_sessions, cmd_login, cmd_logout, cmd_register,
        cmd_rename_session, cmd_send, cmd_upload, cmd_whoami, print_delete_stats,
        print_documents, print_health, print_history, print_init, print_reply, print_session,
        print_sessions, print_upload, print_user, InitOptions, UploadOptions,
    },
    config::{Config, API_BASE_URL_ENV},
    error::{Error, Result},
    progress::LogWriterFactory,
    Workspace,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docchat")]
#[command(version, about = "Chat with your PDFs through a remote RAG backend", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Backend base URL (overrides the config file)
    #[arg(long, global = true, env = API_BASE_URL_ENV)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Log in and store the access token
    Login {
        email: String,

        #[arg(long, env = "DOCCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account
    Register {
        email: String,

        #[arg(long, env = "DOCCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Invalidate and forget the stored token
    Logout,

    /// Show the logged-in account
    Whoami,

    /// Check that the backend is reachable
    Health,

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage documents of a session
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Ask questions about a session's documents
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions, newest first
    List,

    /// Create a session
    Create { name: String },

    /// Rename a session
    Rename { session_id: String, name: String },

    /// Delete a session with its documents and messages
    Delete { session_id: String },
}

#[derive(Subcommand)]
enum DocsAction {
    /// List documents and their ingestion status
    List {
        /// Session ID (defaults to the first session)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Upload a PDF
    Upload {
        /// Path to the PDF
        path: PathBuf,

        /// Session ID (defaults to the first session)
        #[arg(short, long)]
        session: Option<String>,

        /// Wait until the backend has indexed the document
        #[arg(long)]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum ChatAction {
    /// Ask a question
    Send {
        message: String,

        /// Session ID (defaults to the first session)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show the conversation so far
    History {
        /// Session ID (defaults to the first session)
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e.user_message());
        std::process::exit(1);
    }
}

fn emit<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docchat", &mut std::io::stdout());
        return Ok(());
    }

    if let Commands::Init { force } = cli.command {
        let config_path = cli.config.unwrap_or_else(Config::default_config_path);
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_base_dir);
        let report = cmd_init(InitOptions {
            base_dir,
            config_path,
            force,
            api_base_url: cli.api_url,
        })
        .await?;
        return emit(cli.json, &report, print_init);
    }

    let config = load_config(cli.config.as_deref(), cli.api_url)?;
    let workspace = Workspace::connect(&config)?;
    let json = cli.json;

    let result = match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Login { email, password } => {
            let user = cmd_login(&workspace, &email, &password).await?;
            emit(json, &user, print_user)
        }

        Commands::Register { email, password } => {
            let user = cmd_register(&workspace, &email, &password).await?;
            if !json {
                println!("Account created. Log in with 'docchat login {}'.", user.email);
            }
            emit(json, &user, print_user)
        }

        Commands::Logout => {
            cmd_logout(&workspace).await?;
            if !json {
                println!("Logged out.");
            }
            Ok(())
        }

        Commands::Whoami => {
            let user = cmd_whoami(&workspace).await?;
            emit(json, &user, print_user)
        }

        Commands::Health => {
            let report = cmd_health(&config, &workspace).await?;
            emit(json, &report, print_health)
        }

        Commands::Sessions { action } => match action {
            SessionAction::List => {
                let sessions = cmd_list_sessions(&workspace).await?;
                emit(json, &sessions, |s| print_sessions(s))
            }
            SessionAction::Create { name } => {
                let session = cmd_create_session(&workspace, &name).await?;
                emit(json, &session, print_session)
            }
            SessionAction::Rename { session_id, name } => {
                let session = cmd_rename_session(&workspace, &session_id, &name).await?;
                emit(json, &session, print_session)
            }
            SessionAction::Delete { session_id } => {
                let deleted = cmd_delete_session(&workspace, &session_id).await?;
                emit(json, &deleted, print_delete_stats)
            }
        },

        Commands::Docs { action } => match action {
            DocsAction::List { session } => {
                let list = cmd_list_documents(&workspace, session.as_deref()).await?;
                emit(json, &list, print_documents)
            }
            DocsAction::Upload {
                path,
                session,
                wait,
                timeout,
            } => {
                let report = cmd_upload(
                    &workspace,
                    UploadOptions {
                        path,
                        session_id: session,
                        wait,
                        timeout: Duration::from_secs(timeout),
                        show_progress: !json,
                    },
                )
                .await?;
                emit(json, &report, print_upload)
            }
        },

        Commands::Chat { action } => match action {
            ChatAction::Send { message, session } => {
                let reply = cmd_send(&workspace, session.as_deref(), &message).await?;
                emit(json, &reply, print_reply)
            }
            ChatAction::History { session } => {
                let history = cmd_history(&workspace, session.as_deref()).await?;
                emit(json, &history, print_history)
            }
        },
    };

    workspace.shutdown();
    result
}

/// Load the config file (defaults when there is none) and apply the URL override
fn load_config(config_path: Option<&Path>, api_url: Option<String>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::load_from(None)?,
    };

    if let Some(url) = api_url {
        config.api_base_url = url;
        config.validate().map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} (from --api-url)", msg)),
            other => other,
        })?;
    }
    Ok(config)
}
