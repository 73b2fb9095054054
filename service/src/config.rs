use clap::builder::TypedValueParser as _;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the encrypted credential store, relative to the working directory.
pub const DEFAULT_CREDENTIAL_STORE: &str = ".restkit/credentials.json";

#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "Call REST management APIs, recovering from authentication failures",
    long_about = None
)]
pub struct Config {
    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        global = true,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap_or(LevelFilter::Info)),
        )]
    pub log_level_filter: LevelFilter,

    /// Path of the encrypted JSON credential store
    #[arg(long, env, global = true, default_value = DEFAULT_CREDENTIAL_STORE)]
    pub credential_store: PathBuf,

    /// Hex-encoded 32-byte AES-256 key for the credential store. Without it credentials
    /// are kept in memory only.
    #[arg(long, env, global = true, hide_env_values = true)]
    credential_key: Option<String>,

    /// Optional JSON file that keeps retry ledger state (and lockouts) across invocations
    #[arg(long, env, global = true)]
    pub ledger_state: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, env, global = true, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Retries for transient transport failures (5xx, timeouts). Never applies to 401/403.
    #[arg(long, env, global = true, default_value_t = 0)]
    pub transient_retries: u32,

    /// JSON file of extra scheme inference rules
    #[arg(long, env, global = true)]
    pub scheme_hints: Option<PathBuf>,

    /// Never prompt. Credentials come from the options below; without one, recovery is cancelled.
    #[arg(long, env, global = true)]
    pub non_interactive: bool,

    /// Bearer token to use when the server asks for authentication (non-interactive)
    #[arg(long, env, global = true, hide_env_values = true)]
    auth_token: Option<String>,

    /// API key to use when the server asks for authentication (non-interactive)
    #[arg(long, env, global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Header that carries `--api-key` [default: X-API-Key]
    #[arg(long, env, global = true)]
    pub api_key_header: Option<String>,

    /// Basic auth username (non-interactive)
    #[arg(long, env, global = true)]
    pub basic_username: Option<String>,

    /// Basic auth password (non-interactive)
    #[arg(long, env, global = true, hide_env_values = true)]
    basic_password: Option<String>,

    /// Save a non-interactively supplied credential once the server accepts it
    #[arg(long, env, global = true)]
    pub persist_credentials: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Send one request, recovering from authentication failures
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Full request URL
        url: String,
        /// Extra request header as `Name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short = 'd', long = "data")]
        body: Option<String>,
    },
    /// Contact an endpoint without credentials and report what it wants. Never prompts.
    Diagnose {
        url: String,
    },
    /// Manage saved credentials
    #[command(subcommand)]
    Credentials(CredentialsCommand),
    /// Inspect or reset the retry ledger
    #[command(subcommand)]
    Ledger(LedgerCommand),
}

#[derive(Clone, Debug, Subcommand)]
pub enum CredentialsCommand {
    /// Contact the endpoint, prompt for a credential and save it
    Set { url: String },
    /// List saved credentials (no secrets)
    List,
    /// Delete the saved credential for an endpoint
    Delete { url: String },
    /// Print a fresh key suitable for CREDENTIAL_KEY
    GenerateKey,
}

#[derive(Clone, Debug, Subcommand)]
pub enum LedgerCommand {
    /// Show attempt counts and lockouts
    Show,
    /// Clear an endpoint's lockout (or every endpoint's, with --all)
    Reset {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        url: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn credential_key(&self) -> Option<&str> {
        self.credential_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn basic_password(&self) -> Option<&str> {
        self.basic_password.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
