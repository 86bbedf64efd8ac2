use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub nlu: NluConfig,
    pub dialogue: DialogueConfig,
    pub availability: AvailabilityConfig,
    pub commission: CommissionConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NluConfig {
    pub provider: NluProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DialogueConfig {
    /// No-progress disambiguation turns tolerated before the conversation is
    /// handed off. The same budget bounds consecutive unproductive turns.
    pub max_disambiguation_attempts: u32,
    pub min_slot_confidence: f32,
    pub dependency_timeout_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvailabilityConfig {
    pub slot_step_minutes: u32,
    pub max_alternatives: usize,
    pub max_reserve_attempts: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommissionConfig {
    pub default_rate_pct: Decimal,
    pub tiers: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NluProvider {
    RuleBased,
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub nlu_provider: Option<NluProvider>,
    pub nlu_base_url: Option<String>,
    pub nlu_api_key: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_disambiguation_attempts: 3,
            min_slot_confidence: 0.35,
            dependency_timeout_ms: 2_000,
        }
    }
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self { slot_step_minutes: 15, max_alternatives: 3, max_reserve_attempts: 3 }
    }
}

impl Default for CommissionConfig {
    fn default() -> Self {
        let tiers = [("free", 15), ("basic", 12), ("pro", 10), ("enterprise", 8)]
            .into_iter()
            .map(|(tier, pct)| (tier.to_string(), Decimal::from(pct)))
            .collect();
        Self { default_rate_pct: Decimal::from(15), tiers }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tablebell.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            nlu: NluConfig {
                provider: NluProvider::RuleBased,
                api_key: None,
                base_url: None,
                model: "tablebell-intents".to_string(),
                timeout_secs: 5,
                max_retries: 1,
            },
            dialogue: DialogueConfig::default(),
            availability: AvailabilityConfig::default(),
            commission: CommissionConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for NluProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rule_based" | "rules" => Ok(Self::RuleBased),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported nlu provider `{other}` (expected rule_based|http)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl CommissionConfig {
    pub fn rate_for_tier(&self, tier: &str) -> Decimal {
        self.tiers.get(&tier.trim().to_ascii_lowercase()).copied().unwrap_or(self.default_rate_pct)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tablebell.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(nlu) = patch.nlu {
            if let Some(provider) = nlu.provider {
                self.nlu.provider = provider;
            }
            if let Some(nlu_api_key_value) = nlu.api_key {
                self.nlu.api_key = Some(secret_value(nlu_api_key_value));
            }
            if let Some(base_url) = nlu.base_url {
                self.nlu.base_url = Some(base_url);
            }
            if let Some(model) = nlu.model {
                self.nlu.model = model;
            }
            if let Some(timeout_secs) = nlu.timeout_secs {
                self.nlu.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = nlu.max_retries {
                self.nlu.max_retries = max_retries;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(attempts) = dialogue.max_disambiguation_attempts {
                self.dialogue.max_disambiguation_attempts = attempts;
            }
            if let Some(confidence) = dialogue.min_slot_confidence {
                self.dialogue.min_slot_confidence = confidence;
            }
            if let Some(timeout_ms) = dialogue.dependency_timeout_ms {
                self.dialogue.dependency_timeout_ms = timeout_ms;
            }
        }

        if let Some(availability) = patch.availability {
            if let Some(step) = availability.slot_step_minutes {
                self.availability.slot_step_minutes = step;
            }
            if let Some(max_alternatives) = availability.max_alternatives {
                self.availability.max_alternatives = max_alternatives;
            }
            if let Some(attempts) = availability.max_reserve_attempts {
                self.availability.max_reserve_attempts = attempts;
            }
        }

        if let Some(commission) = patch.commission {
            if let Some(default_rate_pct) = commission.default_rate_pct {
                self.commission.default_rate_pct = default_rate_pct;
            }
            if let Some(tiers) = commission.tiers {
                for (tier, rate) in tiers {
                    self.commission.tiers.insert(tier.to_ascii_lowercase(), rate);
                }
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        env_string("TABLEBELL_DATABASE_URL", &mut self.database.url);
        env_parsed("TABLEBELL_DATABASE_MAX_CONNECTIONS", &mut self.database.max_connections)?;
        env_parsed("TABLEBELL_DATABASE_TIMEOUT_SECS", &mut self.database.timeout_secs)?;

        if let Some(value) = read_env("TABLEBELL_NLU_PROVIDER") {
            self.nlu.provider = value.parse()?;
        }
        if let Some(value) = read_env("TABLEBELL_NLU_API_KEY") {
            self.nlu.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TABLEBELL_NLU_BASE_URL") {
            self.nlu.base_url = Some(value);
        }
        env_string("TABLEBELL_NLU_MODEL", &mut self.nlu.model);
        env_parsed("TABLEBELL_NLU_TIMEOUT_SECS", &mut self.nlu.timeout_secs)?;
        env_parsed("TABLEBELL_NLU_MAX_RETRIES", &mut self.nlu.max_retries)?;

        let dialogue = &mut self.dialogue;
        env_parsed(
            "TABLEBELL_DIALOGUE_MAX_DISAMBIGUATION_ATTEMPTS",
            &mut dialogue.max_disambiguation_attempts,
        )?;
        env_parsed("TABLEBELL_DIALOGUE_MIN_SLOT_CONFIDENCE", &mut dialogue.min_slot_confidence)?;
        env_parsed(
            "TABLEBELL_DIALOGUE_DEPENDENCY_TIMEOUT_MS",
            &mut dialogue.dependency_timeout_ms,
        )?;

        let availability = &mut self.availability;
        env_parsed(
            "TABLEBELL_AVAILABILITY_SLOT_STEP_MINUTES",
            &mut availability.slot_step_minutes,
        )?;
        env_parsed("TABLEBELL_AVAILABILITY_MAX_ALTERNATIVES", &mut availability.max_alternatives)?;
        env_parsed("TABLEBELL_COMMISSION_DEFAULT_RATE_PCT", &mut self.commission.default_rate_pct)?;

        env_string("TABLEBELL_SERVER_BIND_ADDRESS", &mut self.server.bind_address);
        env_parsed("TABLEBELL_SERVER_PORT", &mut self.server.port)?;
        env_parsed(
            "TABLEBELL_SERVER_GRACEFUL_SHUTDOWN_SECS",
            &mut self.server.graceful_shutdown_secs,
        )?;

        // `TABLEBELL_LOG_*` are accepted as short aliases.
        let log_level =
            read_env("TABLEBELL_LOGGING_LEVEL").or_else(|| read_env("TABLEBELL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TABLEBELL_LOGGING_FORMAT").or_else(|| read_env("TABLEBELL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(nlu_provider) = overrides.nlu_provider {
            self.nlu.provider = nlu_provider;
        }
        if let Some(nlu_base_url) = overrides.nlu_base_url {
            self.nlu.base_url = Some(nlu_base_url);
        }
        if let Some(nlu_api_key) = overrides.nlu_api_key {
            self.nlu.api_key = Some(secret_value(nlu_api_key));
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_nlu(&self.nlu)?;
        validate_dialogue(&self.dialogue)?;
        validate_availability(&self.availability)?;
        validate_commission(&self.commission)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tablebell.toml"), PathBuf::from("config/tablebell.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_nlu(nlu: &NluConfig) -> Result<(), ConfigError> {
    if nlu.timeout_secs == 0 || nlu.timeout_secs > 60 {
        return Err(ConfigError::Validation("nlu.timeout_secs must be in range 1..=60".to_string()));
    }

    if nlu.provider == NluProvider::Http {
        let base_url = nlu.base_url.as_deref().map(str::trim).unwrap_or_default();
        if base_url.is_empty() {
            return Err(ConfigError::Validation(
                "nlu.base_url is required for the http provider".to_string(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "nlu.base_url must start with http:// or https://".to_string(),
            ));
        }
        let blank_key =
            nlu.api_key.as_ref().map(|key| key.expose_secret().trim().is_empty()).unwrap_or(false);
        if blank_key {
            return Err(ConfigError::Validation(
                "nlu.api_key is set but empty; remove it or provide a key".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.max_disambiguation_attempts == 0 || dialogue.max_disambiguation_attempts > 10 {
        return Err(ConfigError::Validation(
            "dialogue.max_disambiguation_attempts must be in range 1..=10".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&dialogue.min_slot_confidence) {
        return Err(ConfigError::Validation(
            "dialogue.min_slot_confidence must be in range 0.0..=1.0".to_string(),
        ));
    }
    if dialogue.dependency_timeout_ms == 0 || dialogue.dependency_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "dialogue.dependency_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }
    Ok(())
}

fn validate_availability(availability: &AvailabilityConfig) -> Result<(), ConfigError> {
    if availability.slot_step_minutes == 0 || availability.slot_step_minutes > 120 {
        return Err(ConfigError::Validation(
            "availability.slot_step_minutes must be in range 1..=120".to_string(),
        ));
    }
    if availability.max_reserve_attempts == 0 {
        return Err(ConfigError::Validation(
            "availability.max_reserve_attempts must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_commission(commission: &CommissionConfig) -> Result<(), ConfigError> {
    let in_range = |rate: &Decimal| *rate >= Decimal::ZERO && *rate <= Decimal::ONE_HUNDRED;
    if !in_range(&commission.default_rate_pct) {
        return Err(ConfigError::Validation(
            "commission.default_rate_pct must be in range 0..=100".to_string(),
        ));
    }
    if let Some((tier, _)) = commission.tiers.iter().find(|(_, rate)| !in_range(rate)) {
        return Err(ConfigError::Validation(format!(
            "commission.tiers.{tier} must be in range 0..=100"
        )));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_string(key: &str, target: &mut String) {
    if let Some(value) = read_env(key) {
        *target = value;
    }
}

fn env_parsed<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    let Some(value) = read_env(key) else {
        return Ok(());
    };
    *target = value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.clone(),
    })?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    nlu: Option<NluPatch>,
    dialogue: Option<DialoguePatch>,
    availability: Option<AvailabilityPatch>,
    commission: Option<CommissionPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NluPatch {
    provider: Option<NluProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    max_disambiguation_attempts: Option<u32>,
    min_slot_confidence: Option<f32>,
    dependency_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AvailabilityPatch {
    slot_step_minutes: Option<u32>,
    max_alternatives: Option<usize>,
    max_reserve_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CommissionPatch {
    default_rate_pct: Option<Decimal>,
    tiers: Option<BTreeMap<String, Decimal>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, NluProvider};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.nlu.provider == NluProvider::RuleBased, "rule-based nlu by default")?;
        ensure(config.dialogue.max_disambiguation_attempts == 3, "three disambiguation retries")?;
        ensure(
            config.commission.rate_for_tier("unheard-of") == Decimal::from(15),
            "unknown tiers fall back to 15%",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_NLU_API_KEY", "nlu-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tablebell.toml");
            fs::write(
                &path,
                r#"
[nlu]
provider = "http"
base_url = "http://localhost:9000"
api_key = "${TEST_NLU_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.nlu.provider == NluProvider::Http, "provider should come from file")?;
            ensure(
                config.nlu.api_key.as_ref().map(|key| key.expose_secret() == "nlu-key-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_NLU_API_KEY"]);
        result
    }

    #[test]
    fn commission_tiers_from_file_extend_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("tablebell.toml");
        fs::write(
            &path,
            r#"
[commission]
default_rate_pct = "14"

[commission.tiers]
Premium = "7.5"
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.commission.rate_for_tier("premium") == Decimal::new(75, 1), "premium tier")?;
        ensure(config.commission.rate_for_tier("PRO") == Decimal::from(10), "default pro tier")?;
        ensure(config.commission.rate_for_tier("other") == Decimal::from(14), "file default")
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBELL_LOG_LEVEL", "warn");
        env::set_var("TABLEBELL_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["TABLEBELL_LOG_LEVEL", "TABLEBELL_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBELL_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TABLEBELL_SERVER_PORT", "9191");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tablebell.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7000

[dialogue]
max_disambiguation_attempts = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9191, "env port should win over file")?;
            ensure(
                config.dialogue.max_disambiguation_attempts == 5,
                "file dialogue budget should win over default",
            )
        })();

        clear_vars(&["TABLEBELL_DATABASE_URL", "TABLEBELL_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBELL_NLU_PROVIDER", "http");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("nlu.base_url")
            );
            ensure(has_message, "validation failure should mention nlu.base_url")
        })();

        clear_vars(&["TABLEBELL_NLU_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBELL_DIALOGUE_DEPENDENCY_TIMEOUT_MS", "soon");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "TABLEBELL_DIALOGUE_DEPENDENCY_TIMEOUT_MS",
                "error should name the offending variable",
            ),
            _ => Err("expected invalid env override error".to_string()),
        };

        clear_vars(&["TABLEBELL_DIALOGUE_DEPENDENCY_TIMEOUT_MS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBELL_NLU_API_KEY", "nlu-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("nlu-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["TABLEBELL_NLU_API_KEY"]);
        result
    }
}
