use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `NIGHTSHIFT_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("NIGHTSHIFT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            schedule: ScheduleConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  aws:       region={}, endpoint={}, static_credentials={}",
            self.aws.region,
            self.aws.endpoint_url.as_deref().unwrap_or("(default)"),
            self.aws.has_static_credentials()
        );
        tracing::info!(
            "  schedule:  tag={}={}, alarm_concurrency={}",
            self.schedule.tag_key,
            self.schedule.tag_value,
            self.schedule.alarm_concurrency
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
                "static_credentials": self.aws.has_static_credentials(),
            },
            "schedule": {
                "tag_key": self.schedule.tag_key,
                "tag_value": self.schedule.tag_value,
                "alarm_concurrency": self.schedule.alarm_concurrency,
            },
        })
    }
}

// ── AWS ───────────────────────────────────────────────────────

/// Region and credentials for the provider clients. Every client built from
/// one `AwsConfig` talks to exactly one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    #[serde(skip_serializing)]
    pub session_token: Option<String>,
    /// Endpoint override (LocalStack and friends).
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_opt(p, "AWS_REGION")
                .or_else(|| profiled_env_opt(p, "AWS_DEFAULT_REGION"))
                .unwrap_or_else(|| "eu-west-1".to_string()),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── Schedule defaults ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub tag_key: String,
    pub tag_value: String,
    /// Upper bound on instances whose alarms are processed at once.
    pub alarm_concurrency: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tag_key: "tostop".to_string(),
            tag_value: "true".to_string(),
            alarm_concurrency: 8,
        }
    }
}

impl ScheduleConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            tag_key: profiled_env_or(p, "NIGHTSHIFT_TAG_KEY", &defaults.tag_key),
            tag_value: profiled_env_or(p, "NIGHTSHIFT_TAG_VALUE", &defaults.tag_value),
            alarm_concurrency: profiled_env_usize(
                p,
                "NIGHTSHIFT_ALARM_CONCURRENCY",
                defaults.alarm_concurrency,
            ),
        }
    }
}
