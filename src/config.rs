use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{env, fmt, path::PathBuf, str::FromStr};
use uuid::Uuid;

use crate::models::upload::TransferPath;

/// Direct transfers above this size are refused before any network call.
/// Deployments may lower the limit but never raise it.
pub const DEFAULT_MAX_DIRECT_BYTES: usize = 256_000;
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 5;
pub const DEFAULT_CONTAINER: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Command-line entry point. Every flag overrides a `BLOB_UPLOAD_*`
/// environment variable, which in turn overrides the built-in default.
#[derive(Parser, Debug)]
#[command(author, version, about = "Capability-URL object store and upload client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the API server (token issuance, proxy, listing) and the store
    Serve(ServerArgs),
    /// Apply the metadata schema and exit
    Migrate(ServerArgs),
    /// Upload a file, then print the refreshed container listing
    Upload(UploadArgs),
    /// Print the current listing of a container
    List(ClientArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Host to bind to (overrides BLOB_UPLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BLOB_UPLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides BLOB_UPLOAD_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// SQLite database URL (overrides BLOB_UPLOAD_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Externally reachable base URL of the store (overrides BLOB_UPLOAD_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Secret used to sign capability URLs (overrides BLOB_UPLOAD_SIGNING_KEY)
    #[arg(long)]
    pub signing_key: Option<String>,

    /// Largest object the store accepts (overrides BLOB_UPLOAD_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    /// Base URL of the primary API server (overrides BLOB_UPLOAD_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Base URL of the proxy server (overrides BLOB_UPLOAD_PROXY_URL)
    #[arg(long)]
    pub proxy_url: Option<String>,

    /// Target container (overrides BLOB_UPLOAD_CONTAINER)
    #[arg(long)]
    pub container: Option<String>,

    /// Lifetime of issued tokens in minutes (overrides BLOB_UPLOAD_TOKEN_TTL_MINUTES)
    #[arg(long)]
    pub ttl_minutes: Option<i64>,

    /// Size limit for direct transfers (overrides BLOB_UPLOAD_MAX_DIRECT_BYTES)
    #[arg(long)]
    pub max_direct_bytes: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Direct,
    Proxied,
}

impl From<ModeArg> for TransferPath {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Direct => TransferPath::Direct,
            ModeArg::Proxied => TransferPath::Proxied,
        }
    }
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Transfer strategy
    #[arg(long, value_enum, default_value_t = ModeArg::Direct)]
    pub mode: ModeArg,

    #[command(flatten)]
    pub client: ClientArgs,
}

/// Configuration for `serve` / `migrate`.
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// `None` means "derive from the bound address".
    pub public_url: Option<String>,
    pub signing_key: String,
    pub max_upload_bytes: u64,
}

// Keeps the signing key out of logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_url", &self.public_url)
            .field("signing_key", &"<redacted>")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env_and_args(args: ServerArgs) -> Result<Self> {
        let env_host = env::var("BLOB_UPLOAD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("BLOB_UPLOAD_PORT", 3000u16)?;
        let env_storage =
            env::var("BLOB_UPLOAD_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("BLOB_UPLOAD_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/blob_upload.db".into());
        let env_public = env::var("BLOB_UPLOAD_PUBLIC_URL").ok();
        let env_key = env::var("BLOB_UPLOAD_SIGNING_KEY").ok();
        let env_max = env_parse("BLOB_UPLOAD_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        let signing_key = match args.signing_key.or(env_key) {
            Some(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!(
                    "No signing key configured; issued URLs will not survive a restart"
                );
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            }
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: args.public_url.or(env_public),
            signing_key,
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration injected into the upload orchestrator and its services.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub proxy_url: String,
    pub container: String,
    pub ttl_minutes: i64,
    pub max_direct_bytes: usize,
}

impl ClientConfig {
    /// Defaults for everything but the two server addresses.
    pub fn new(api_url: impl Into<String>, proxy_url: impl Into<String>) -> Self {
        Self {
            api_url: trim_base(api_url.into()),
            proxy_url: trim_base(proxy_url.into()),
            container: DEFAULT_CONTAINER.to_string(),
            ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            max_direct_bytes: DEFAULT_MAX_DIRECT_BYTES,
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    pub fn from_env_and_args(args: ClientArgs) -> Result<Self> {
        let env_api =
            env::var("BLOB_UPLOAD_API_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let api_url = args.api_url.unwrap_or(env_api);
        let env_proxy = env::var("BLOB_UPLOAD_PROXY_URL").unwrap_or_else(|_| api_url.clone());
        let env_container =
            env::var("BLOB_UPLOAD_CONTAINER").unwrap_or_else(|_| DEFAULT_CONTAINER.into());
        let env_ttl = env_parse("BLOB_UPLOAD_TOKEN_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES)?;
        let env_max = env_parse("BLOB_UPLOAD_MAX_DIRECT_BYTES", DEFAULT_MAX_DIRECT_BYTES)?;

        let ttl_minutes = args.ttl_minutes.unwrap_or(env_ttl);
        if ttl_minutes <= 0 {
            anyhow::bail!("token ttl must be positive, got {}", ttl_minutes);
        }

        let max_direct_bytes = args.max_direct_bytes.unwrap_or(env_max);
        if max_direct_bytes == 0 || max_direct_bytes > DEFAULT_MAX_DIRECT_BYTES {
            anyhow::bail!(
                "direct transfer limit must be between 1 and {} bytes, got {}",
                DEFAULT_MAX_DIRECT_BYTES,
                max_direct_bytes
            );
        }

        Ok(Self {
            api_url: trim_base(api_url),
            proxy_url: trim_base(args.proxy_url.unwrap_or(env_proxy)),
            container: args.container.unwrap_or(env_container),
            ttl_minutes,
            max_direct_bytes,
        })
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
