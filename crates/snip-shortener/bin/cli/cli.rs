use clap::{Parser, Subcommand, ValueEnum};
use snip_shortener::deletion::DEFAULT_WORKERS;
use snip_shortener::service::DEFAULT_BASE_URL;
use snip_shortener::{DeletionConfig, ServiceConfig};
use snip_storage::StorageConfig;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";
pub const DELETE_WORKERS_ENV: &str = "SNIP_DELETE_WORKERS";

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Shorten, resolve and delete URLs")]
pub struct CLI {
    /// Append-only JSON log to store records in.
    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// SQLite connection string, e.g. `sqlite://links.db`. Wins over the file path.
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    #[arg(short = 'b', long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Tracing filter directive, e.g. `debug` or `snip_storage=trace`.
    #[arg(short = 'l', long, env = LOG_LEVEL_ENV, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[arg(long, env = DELETE_WORKERS_ENV, default_value_t = DEFAULT_WORKERS)]
    pub delete_workers: usize,

    /// Owner the command acts on behalf of. Empty means anonymous.
    #[arg(short = 'u', long, global = true, default_value = "")]
    pub user: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a single URL.
    Shorten { url: String },
    /// Shorten several URLs at once; prints JSON with one item per URL.
    Batch {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the original URL of a short code.
    Resolve { code: String },
    /// List the URLs of the current user as JSON.
    List,
    /// Delete short codes owned by the current user.
    Delete {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Check that the storage is reachable.
    Ping,
    /// Print record and user counts as JSON.
    Stats,
}

impl CLI {
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            file_storage_path: self.file_storage_path.clone(),
            database_dsn: self.database_dsn.clone(),
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::builder()
            .base_url(self.base_url.clone())
            .deletion(
                DeletionConfig::builder()
                    .workers(self.delete_workers)
                    .build(),
            )
            .build()
    }
}
