//! Runner configuration
//!
//! Defines the workspace mounted into job containers, the podman binary,
//! the overall run deadline and the completion poll policy.

use anyhow::Context;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::poll::PollPolicy;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Host directory bound at each job's mount path
    pub workspace: PathBuf,

    /// Podman executable name or path
    pub podman_bin: String,

    /// Limit for a whole group run; `None` waits indefinitely
    pub deadline: Option<Duration>,

    /// Wait policy while awaiting job completion
    pub poll: PollPolicy,
}

impl RunnerConfig {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            podman_bin: "podman".to_string(),
            deadline: None,
            poll: PollPolicy::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised variables (all optional):
    /// - CONVOY_WORKSPACE (default: current directory)
    /// - CONVOY_PODMAN_BIN (default: podman)
    /// - CONVOY_DEADLINE (seconds)
    /// - CONVOY_POLL_STRATEGY (fixed | exponential, default: fixed)
    /// - CONVOY_POLL_INITIAL_DELAY_MS (default: 1000)
    /// - CONVOY_POLL_INTERVAL_MS (default: 1000)
    /// - CONVOY_POLL_MAX_INTERVAL_MS (exponential only, default: 30000)
    ///
    /// The poll settings only apply to backends that poll for completion.
    /// [`crate::PodmanBackend`] waits on its executor's completion signal and
    /// ignores them.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RunnerConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace = match lookup("CONVOY_WORKSPACE") {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir().context("Failed to resolve current directory")?,
        };

        let podman_bin = lookup("CONVOY_PODMAN_BIN").unwrap_or_else(|| "podman".to_string());

        let deadline = parse_var::<u64, _>(&lookup, "CONVOY_DEADLINE")?.map(Duration::from_secs);

        let initial_delay = parse_var::<u64, _>(&lookup, "CONVOY_POLL_INITIAL_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(1));
        let interval = parse_var::<u64, _>(&lookup, "CONVOY_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(1));
        let max_interval = parse_var::<u64, _>(&lookup, "CONVOY_POLL_MAX_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(30));

        let poll = match lookup("CONVOY_POLL_STRATEGY").as_deref() {
            None | Some("fixed") => PollPolicy::fixed(initial_delay, interval),
            Some("exponential") => PollPolicy::exponential(initial_delay, interval, max_interval),
            Some(other) => anyhow::bail!(
                "CONVOY_POLL_STRATEGY must be 'fixed' or 'exponential', got '{}'",
                other
            ),
        };

        Ok(Self {
            workspace,
            podman_bin,
            deadline,
            poll,
        })
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.podman_bin.is_empty() {
            anyhow::bail!("podman_bin cannot be empty");
        }

        if self.workspace.as_os_str().is_empty() {
            anyhow::bail!("workspace cannot be empty");
        }

        if self.deadline == Some(Duration::ZERO) {
            anyhow::bail!("deadline must be greater than 0");
        }

        match &self.poll {
            PollPolicy::Fixed { interval, .. } if interval.is_zero() => {
                anyhow::bail!("poll interval must be greater than 0")
            }
            PollPolicy::Exponential {
                initial_interval,
                max_interval,
                ..
            } => {
                if initial_interval.is_zero() {
                    anyhow::bail!("poll interval must be greater than 0");
                }
                if max_interval < initial_interval {
                    anyhow::bail!("poll max interval must not be below the initial interval");
                }
            }
            _ => {}
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, key, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.podman_bin, "podman");
        assert_eq!(config.deadline, None);
        assert_eq!(config.poll, PollPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = RunnerConfig::from_lookup(lookup_from(&[
            ("CONVOY_WORKSPACE", "/srv/build"),
            ("CONVOY_DEADLINE", "600"),
            ("CONVOY_POLL_STRATEGY", "exponential"),
            ("CONVOY_POLL_INITIAL_DELAY_MS", "250"),
            ("CONVOY_POLL_INTERVAL_MS", "100"),
            ("CONVOY_POLL_MAX_INTERVAL_MS", "5000"),
        ]))
        .unwrap();

        assert_eq!(config.workspace, PathBuf::from("/srv/build"));
        assert_eq!(config.deadline, Some(Duration::from_secs(600)));
        assert_eq!(
            config.poll,
            PollPolicy::exponential(
                Duration::from_millis(250),
                Duration::from_millis(100),
                Duration::from_millis(5000)
            )
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = RunnerConfig::from_lookup(lookup_from(&[("CONVOY_DEADLINE", "soon")]));
        assert!(err.unwrap_err().to_string().contains("CONVOY_DEADLINE"));

        let err = RunnerConfig::from_lookup(lookup_from(&[("CONVOY_POLL_STRATEGY", "eager")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RunnerConfig::default();
        assert!(config.validate().is_ok());

        config.podman_bin = String::new();
        assert!(config.validate().is_err());
        config.podman_bin = "podman".to_string();

        config.deadline = Some(Duration::ZERO);
        assert!(config.validate().is_err());
        config.deadline = None;

        config.poll = PollPolicy::fixed(Duration::ZERO, Duration::ZERO);
        assert!(config.validate().is_err());

        config.poll = PollPolicy::exponential(
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(1),
        );
        assert!(config.validate().is_err());
    }
}
