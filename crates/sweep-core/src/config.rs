use std::{env, fs, path::Path, time::Duration};

use crate::{
    actions::ActionSettings,
    decision::Thresholds,
    errors::Error,
    formatting::{DEFAULT_ARCHIVE_TEMPLATE, DEFAULT_WARNING_TEMPLATE},
    orchestrator::SweepSettings,
    prefilter::{ExclusionRules, DEFAULT_KEEP_MARKER},
    throttle::{LimiterConfig, RetryPolicy},
    Result,
};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_WARNING_MARKER: &str = "flagged as inactive";
/// Upper bound for day-valued settings; keeps `chrono::Duration::days` in range.
pub const MAX_DAYS: i64 = 36_500;

/// Typed configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Slack
    pub slack_bot_token: String,
    pub slack_api_base: String,
    pub request_timeout: Duration,

    // Lifecycle
    pub warn_after_days: i64,
    pub archive_grace_days: i64,
    pub exclude_channels: Vec<String>,
    pub exclude_prefixes: Vec<String>,
    pub keep_marker: Option<String>,
    pub dry_run: bool,

    // Rate limiting
    pub min_request_interval: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
    pub sweep_timeout: Duration,

    // Messages
    pub warning_marker: String,
    pub warning_template: String,
    pub archive_template: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `load` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let slack_bot_token = get("SLACK_BOT_TOKEN").unwrap_or_default();
        if slack_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "SLACK_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let slack_api_base = get("SLACK_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let request_timeout =
            Duration::from_millis(parse_num(&get, "REQUEST_TIMEOUT_MS")?.unwrap_or(15_000));

        let warn_after_days = parse_num::<i64>(&get, "WARN_AFTER_DAYS")?.unwrap_or(30);
        let archive_grace_days = parse_num::<i64>(&get, "ARCHIVE_GRACE_DAYS")?.unwrap_or(7);
        if !(1..=MAX_DAYS).contains(&warn_after_days)
            || !(0..=MAX_DAYS).contains(&archive_grace_days)
        {
            return Err(Error::Config(format!(
                "WARN_AFTER_DAYS must be in 1..={MAX_DAYS} and ARCHIVE_GRACE_DAYS \
                 in 0..={MAX_DAYS} (got {warn_after_days} and {archive_grace_days})"
            )));
        }

        let exclude_channels = get("EXCLUDE_CHANNELS")
            .map(|v| parse_csv_lower(&v))
            .unwrap_or_else(|| ExclusionRules::default().names);
        let exclude_prefixes = get("EXCLUDE_PREFIXES")
            .map(|v| parse_csv_lower(&v))
            .unwrap_or_else(|| ExclusionRules::default().prefixes);
        // An explicitly empty KEEP_MARKER disables it.
        let keep_marker = match lookup("KEEP_MARKER") {
            Some(v) => non_empty(v),
            None => Some(DEFAULT_KEEP_MARKER.to_string()),
        };
        let dry_run = parse_bool(&get, "DRY_RUN")?.unwrap_or(true);

        let min_request_interval =
            Duration::from_millis(parse_num(&get, "MIN_REQUEST_INTERVAL_MS")?.unwrap_or(1200));
        let max_backoff = Duration::from_secs(parse_num(&get, "MAX_BACKOFF_SECS")?.unwrap_or(60));
        let max_attempts = parse_num::<u32>(&get, "MAX_ATTEMPTS")?.unwrap_or(3).max(1);
        let sweep_timeout =
            Duration::from_secs(parse_num(&get, "SWEEP_TIMEOUT_SECS")?.unwrap_or(3600));

        let warning_marker =
            get("WARNING_MARKER").unwrap_or_else(|| DEFAULT_WARNING_MARKER.to_string());
        let warning_template =
            get("WARNING_TEMPLATE").unwrap_or_else(|| DEFAULT_WARNING_TEMPLATE.to_string());
        let archive_template =
            get("ARCHIVE_TEMPLATE").unwrap_or_else(|| DEFAULT_ARCHIVE_TEMPLATE.to_string());

        // Otherwise our own warnings would never be recognised on the next run.
        if !warning_template
            .to_lowercase()
            .contains(&warning_marker.to_lowercase())
        {
            return Err(Error::Config(format!(
                "WARNING_TEMPLATE must contain the warning marker {warning_marker:?}"
            )));
        }

        Ok(Self {
            slack_bot_token,
            slack_api_base,
            request_timeout,
            warn_after_days,
            archive_grace_days,
            exclude_channels,
            exclude_prefixes,
            keep_marker,
            dry_run,
            min_request_interval,
            max_backoff,
            max_attempts,
            sweep_timeout,
            warning_marker,
            warning_template,
            archive_template,
        })
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warn_after: chrono::Duration::days(self.warn_after_days),
            archive_grace: chrono::Duration::days(self.archive_grace_days),
        }
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            thresholds: self.thresholds(),
            exclusions: ExclusionRules {
                names: self.exclude_channels.clone(),
                prefixes: self.exclude_prefixes.clone(),
                keep_marker: self.keep_marker.clone(),
            },
            warning_marker: self.warning_marker.clone(),
        }
    }

    pub fn action_settings(&self) -> ActionSettings {
        ActionSettings {
            dry_run: self.dry_run,
            warning_template: self.warning_template.clone(),
            archive_template: self.archive_template.clone(),
            thresholds: self.thresholds(),
        }
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            min_interval: self.min_request_interval,
            max_backoff: self.max_backoff,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_attempts)
    }
}

fn non_empty(v: String) -> Option<String> {
    if v.trim().is_empty() {
        None
    } else {
        Some(v)
    }
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    get(key)
        .map(|s| {
            s.trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{key} must be a number (got {s:?})")))
        })
        .transpose()
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    get(key)
        .map(|s| match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("{key} must be a boolean (got {s:?})"))),
        })
        .transpose()
}

fn parse_csv_lower(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().trim_start_matches('#').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }
        out.push((key.to_string(), val));
    }
    out
}
