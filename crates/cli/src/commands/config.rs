use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use loadquote_core::config::{AppConfig, LoadOptions};
use loadquote_core::ApplicationError;
use toml::Value;

use crate::commands::CommandResult;

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::from_error("config", &ApplicationError::from(error)),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];

    lines.push(render_line(
        "pricing.base_currency",
        &config.pricing.base_currency,
        source("pricing.base_currency", &["LOADQUOTE_PRICING_BASE_CURRENCY"]),
    ));
    lines.push(render_line(
        "pricing.default_unit",
        &config.pricing.default_unit,
        source("pricing.default_unit", &["LOADQUOTE_PRICING_DEFAULT_UNIT"]),
    ));

    if config.rates.table.is_empty() {
        lines.push(render_line("rates.table", "<empty>", "default".to_string()));
    }
    for (code, rate) in &config.rates.table {
        let env_key = format!("LOADQUOTE_RATE_{code}");
        lines.push(render_line(
            &format!("rates.table.{code}"),
            &rate.to_string(),
            source(&format!("rates.table.{code}"), &[env_key.as_str()]),
        ));
    }

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["LOADQUOTE_LOGGING_LEVEL", "LOADQUOTE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["LOADQUOTE_LOGGING_FORMAT", "LOADQUOTE_LOG_FORMAT"]),
    ));

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("loadquote.toml"), PathBuf::from("config/loadquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

/// Rate codes are normalized to upper case on load, so table keys match
/// case-insensitively.
fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let next = match current.as_table() {
            Some(table) => table
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
                .map(|(_, value)| value),
            None => None,
        };
        let Some(next) = next else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
