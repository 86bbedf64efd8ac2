pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use std::fmt::Display;
use std::future::Future;

use serde::Serialize;
use tablebell_core::config::{AppConfig, LoadOptions};
use tablebell_db::{connect_with_settings, DbPool};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_SEED: u8 = 6;

/// What a command prints (one JSON line, or the doctor report) and how the
/// process exits.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'static str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let outcome =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: render(&outcome) }
    }

    pub fn failure(command: &str, failure: Failure) -> Self {
        let outcome = CommandOutcome {
            command,
            status: "error",
            error_class: Some(failure.class),
            message: failure.message,
        };
        Self { exit_code: failure.exit_code, output: render(&outcome) }
    }

    pub(crate) fn finish(command: &str, result: Result<String, Failure>) -> Self {
        match result {
            Ok(message) => Self::success(command, message),
            Err(failure) => Self::failure(command, failure),
        }
    }
}

/// A classified command failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl Failure {
    pub(crate) fn new(class: &'static str, message: impl Display, exit_code: u8) -> Self {
        Self { class, message: message.to_string(), exit_code }
    }

    pub(crate) fn database(error: impl Display) -> Self {
        Self::new("db_connectivity", error, EXIT_DATABASE)
    }

    pub(crate) fn migration(error: impl Display) -> Self {
        Self::new("migration", error, EXIT_MIGRATION)
    }
}

pub(crate) fn load_config(options: &LoadOptions) -> Result<AppConfig, Failure> {
    AppConfig::load(options.clone()).map_err(|error| {
        Failure::new("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG)
    })
}

/// Commands are synchronous; each one gets its own single-threaded runtime.
pub(crate) fn block_on<T>(future: impl Future<Output = Result<T, Failure>>) -> Result<T, Failure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| Failure::new("runtime_init", error, EXIT_RUNTIME))?
        .block_on(future)
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(Failure::database)
}

fn render(outcome: &CommandOutcome<'_>) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|error| {
        serde_json::json!({
            "command": outcome.command,
            "status": "error",
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}
