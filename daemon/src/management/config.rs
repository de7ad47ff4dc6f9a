use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Program + arguments, run inside the worker folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new<P: Into<String>>(program: P, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How the end of an install process is detected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExitWatch {
    /// OS wait primitive
    Wait,
    /// `try_wait` every `interval_ms`
    Poll { interval_ms: u64 },
}

impl Default for ExitWatch {
    fn default() -> Self {
        ExitWatch::Poll { interval_ms: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// must exist in the worker folder before `install`
    pub manifest_file: String,
    pub install: LaunchSpec,
    pub launch: LaunchSpec,
    pub watch: ExitWatch,
    pub install_timeout_secs: Option<u64>,
    /// when set, `start` fails if the worker exits within this window
    pub start_grace_ms: Option<u64>,
    /// 0 disables the liveness monitor
    pub liveness_interval_ms: u64,
}

impl SupervisorConfig {
    pub fn install_timeout(&self) -> Option<Duration> {
        self.install_timeout_secs.map(Duration::from_secs)
    }

    pub fn start_grace(&self) -> Option<Duration> {
        self.start_grace_ms.map(Duration::from_millis)
    }

    pub fn liveness_interval(&self) -> Option<Duration> {
        (self.liveness_interval_ms > 0).then(|| Duration::from_millis(self.liveness_interval_ms))
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let npm = if cfg!(windows) { "npm.cmd" } else { "npm" };
        Self {
            manifest_file: "package.json".to_owned(),
            install: LaunchSpec::new(npm, &["install"]),
            launch: LaunchSpec::new("node", &["index.js"]),
            watch: ExitWatch::default(),
            install_timeout_secs: None,
            start_grace_ms: None,
            liveness_interval_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: SupervisorConfig = serde_json::from_str(
            r#"{ "watch": { "mode": "wait" }, "install_timeout_secs": 600 }"#,
        )
        .unwrap();
        assert_eq!(config.watch, ExitWatch::Wait);
        assert_eq!(config.install_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.manifest_file, "package.json");
        assert_eq!(config.launch.to_string(), "node index.js");
        assert_eq!(config.liveness_interval(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn default_watch_polls_every_500ms() {
        assert_eq!(
            serde_json::to_value(ExitWatch::default()).unwrap(),
            serde_json::json!({ "mode": "poll", "interval_ms": 500 })
        );
    }
}
