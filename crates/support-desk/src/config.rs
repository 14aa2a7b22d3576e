use anyhow::{bail, Context, Result};
use escalation::escalation::{EscalationConfig, DEFAULT_EXTRA_DELAY};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment; selects the logging profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    /// Developer machine: debug level, pretty stdout.
    #[default]
    Local,
    Dev,
    Prod,
}

impl FromStr for DeployEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => bail!("unknown environment '{other}' (expected local, dev or prod)"),
        }
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Dev => write!(f, "dev"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

/// Workflow service endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub base_url: String,
    /// Per-call timeout. No retries are made on top of it.
    pub timeout_secs: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/api/v1".into(),
            timeout_secs: 10,
        }
    }
}

impl WorkflowSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationSettings {
    /// Seconds between the fire deadline and the assign deadline.
    pub extra_delay_secs: u64,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            extra_delay_secs: DEFAULT_EXTRA_DELAY.as_secs(),
        }
    }
}

/// Top-level support desk configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub env: DeployEnv,
    /// Log file for dev/prod. `None` logs to stdout.
    pub logs_path: Option<PathBuf>,
    /// Tenant identity attached to every workflow call.
    pub app_id: i32,
    /// Classification endpoint (receives `{"message": ...}`).
    pub classifier_url: String,
    /// Per-call classifier timeout.
    pub classifier_timeout_secs: u64,
    pub workflow: WorkflowSettings,
    pub escalation: EscalationSettings,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            env: DeployEnv::Local,
            logs_path: None,
            app_id: 1,
            classifier_url: "http://localhost:5000/cluster".into(),
            classifier_timeout_secs: 30,
            workflow: WorkflowSettings::default(),
            escalation: EscalationSettings::default(),
        }
    }
}

impl DeskConfig {
    /// Load from an optional TOML file, then apply `SUPPORT_DESK_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid support desk TOML")
    }

    /// Apply environment overrides through `lookup` (`std::env::var` in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("SUPPORT_DESK_ENV") {
            self.env = env.parse()?;
        }
        if let Some(app_id) = lookup("SUPPORT_DESK_APP_ID") {
            self.app_id = app_id
                .trim()
                .parse()
                .with_context(|| format!("SUPPORT_DESK_APP_ID is not an integer: {app_id}"))?;
        }
        if let Some(url) = lookup("SUPPORT_DESK_CLASSIFIER_URL") {
            self.classifier_url = url;
        }
        if let Some(url) = lookup("SUPPORT_DESK_WORKFLOW_URL") {
            self.workflow.base_url = url;
        }
        if let Some(path) = lookup("SUPPORT_DESK_LOGS_PATH") {
            self.logs_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.classifier_url.trim().is_empty() {
            bail!("classifier_url must not be empty");
        }
        if self.workflow.base_url.trim().is_empty() {
            bail!("workflow.base_url must not be empty");
        }
        if self.workflow.timeout_secs == 0 {
            bail!("workflow.timeout_secs must be greater than zero");
        }
        if self.classifier_timeout_secs == 0 {
            bail!("classifier_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }

    pub fn escalation_config(&self) -> EscalationConfig {
        EscalationConfig {
            extra_delay: Duration::from_secs(self.escalation.extra_delay_secs),
        }
    }
}
