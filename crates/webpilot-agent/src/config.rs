//! Pilot configuration, loaded from YAML. Every field has a default, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use webpilot_script::BrowserConfig;

use crate::resolver::ResolverConfig;
use crate::{Error, Result};

/// Names a config file for the MCP server and CLI.
pub const CONFIG_ENV: &str = "WEBPILOT_CONFIG";
/// `1`/`true` forces headless, `0`/`false` forces headed.
pub const HEADLESS_ENV: &str = "WEBPILOT_HEADLESS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub browser: BrowserConfig,
    pub agent: AgentConfig,
    pub resolver: ResolverConfig,
    pub timing: TimingConfig,
    pub planner: PlannerConfig,
}

/// Limits for one goal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
    /// Re-plan attempts after a failed step
    pub max_retries: usize,
    /// Proposals remembered for loop detection
    pub loop_window: usize,
    /// Identical proposals in the window that force a finish
    pub loop_threshold: usize,
    pub planner_timeout_secs: u64,
    /// Wait used when the planner fails or times out
    pub planner_fallback_wait_ms: u64,
    /// Largest catalog handed to the planner
    pub max_catalog: usize,
    /// Send a screenshot with every planning request
    pub screenshot: bool,
    /// History entries included in planning requests
    pub history_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_retries: 2,
            loop_window: 6,
            loop_threshold: 3,
            planner_timeout_secs: 30,
            planner_fallback_wait_ms: 1000,
            max_catalog: 150,
            screenshot: true,
            history_window: 10,
        }
    }
}

/// Settle intervals and timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub settle_ms: u64,
    pub dropdown_settle_ms: u64,
    pub navigation_timeout_ms: u64,
    pub network_idle_ms: u64,
    pub network_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 400,
            dropdown_settle_ms: 300,
            navigation_timeout_ms: 30_000,
            network_idle_ms: 200,
            network_timeout_ms: 2_000,
        }
    }
}

/// HTTP planner endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub model: Option<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "WEBPILOT_PLANNER_KEY".into(),
            model: None,
        }
    }
}

impl PilotConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: PilotConfig = if yaml.trim().is_empty() {
            PilotConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// `$WEBPILOT_CONFIG` if set, else defaults; then env overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => {
                debug!("loading config from {}", path);
                Self::load(path)?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `WEBPILOT_HEADLESS`.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(HEADLESS_ENV) {
            if let Some(headless) = parse_flag(&v) {
                self.browser.headless = headless;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.agent;
        if a.max_steps == 0 {
            return Err(Error::Config("agent.max_steps must be at least 1".into()));
        }
        if a.loop_threshold < 2 {
            return Err(Error::Config("agent.loop_threshold must be at least 2".into()));
        }
        if a.loop_window < a.loop_threshold {
            return Err(Error::Config(format!(
                "agent.loop_window ({}) must be at least agent.loop_threshold ({})",
                a.loop_window, a.loop_threshold
            )));
        }
        if a.planner_timeout_secs == 0 {
            return Err(Error::Config("agent.planner_timeout_secs must be positive".into()));
        }
        if a.max_catalog == 0 {
            return Err(Error::Config("agent.max_catalog must be at least 1".into()));
        }
        if self.resolver.ambiguity_band < 0 {
            return Err(Error::Config("resolver.ambiguity_band must not be negative".into()));
        }
        if let Some(ref endpoint) = self.planner.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "planner.endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
