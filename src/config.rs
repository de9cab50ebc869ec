//! Externally loaded engine configuration.
//!
//! Intervals, database URL, topology, and the tracked parameter list all
//! arrive from a configuration file, are validated once at startup, and
//! are fixed for the process lifetime. Anything malformed here is fatal
//! before the engine starts serving - never a poll-time surprise.

use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use hvwatch_types::{
    ParamKind, Parameter, ParameterError, ParameterSet, Topology, TopologyError,
};
use serde::Deserialize;

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_commit_interval_ms() -> u64 {
    30_000
}

fn default_shutdown_wait_ms() -> u64 {
    5_000
}

fn default_database_url() -> String {
    "sqlite://hvwatch.db?mode=rwc".to_string()
}

/// One board entry in the configured crate map.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotConfig {
    pub slot: u16,
    pub model: String,
    pub channels: u16,
}

/// One tracked parameter entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    pub column: String,
    pub kind: ParamKind,
}

/// The engine's startup configuration.
///
/// ```toml
/// poll_interval_ms = 1000
/// commit_interval_ms = 30000
/// database_url = "sqlite://hvwatch.db?mode=rwc"
///
/// [[slots]]
/// slot = 1
/// model = "A7030P"
/// channels = 48
///
/// [[slots]]
/// slot = 4
/// model = "A7435SN"
/// channels = 24
/// ```
///
/// When no `[[parameters]]` entries are given, the standard seven-
/// parameter set is tracked.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,

    /// Upper bound on worker teardown and the final flush at shutdown.
    #[serde(default = "default_shutdown_wait_ms")]
    pub shutdown_wait_ms: u64,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    pub slots: Vec<SlotConfig>,

    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: EngineConfig = cfg
            .try_deserialize()
            .with_context(|| format!("malformed config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be non-zero");
        ensure!(
            self.commit_interval_ms > 0,
            "commit_interval_ms must be non-zero"
        );
        ensure!(
            self.shutdown_wait_ms > 0,
            "shutdown_wait_ms must be non-zero"
        );
        // Surface topology/parameter faults at load time too.
        self.topology()?;
        self.parameter_set()?;
        Ok(())
    }

    /// The validated crate topology.
    pub fn topology(&self) -> Result<Topology, TopologyError> {
        Topology::from_entries(
            self.slots
                .iter()
                .map(|s| (s.slot, s.model.clone(), s.channels)),
        )
    }

    /// The validated parameter set; the standard set when none is
    /// configured.
    pub fn parameter_set(&self) -> Result<ParameterSet, ParameterError> {
        if self.parameters.is_empty() {
            return Ok(ParameterSet::default_set());
        }
        ParameterSet::new(
            self.parameters
                .iter()
                .map(|p| match p.kind {
                    ParamKind::Analog => Parameter::analog(&p.name, &p.column),
                    ParamKind::Flag => Parameter::flag(&p.name, &p.column),
                })
                .collect(),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(toml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_a_full_config() {
        let file = write_config(
            r#"
            poll_interval_ms = 500
            commit_interval_ms = 15000
            database_url = "sqlite:///var/lib/hvwatch/data.db?mode=rwc"

            [[slots]]
            slot = 1
            model = "A7030P"
            channels = 48

            [[slots]]
            slot = 4
            model = "A7435SN"
            channels = 24

            [[parameters]]
            name = "Pw"
            column = "power"
            kind = "flag"

            [[parameters]]
            name = "VMon"
            column = "vmon"
            kind = "analog"
            "#,
        );

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.commit_interval(), Duration::from_millis(15_000));
        assert_eq!(config.shutdown_wait(), Duration::from_millis(5_000));

        let topology = config.topology().unwrap();
        assert_eq!(topology.channels(1), Some(48));

        let params = config.parameter_set().unwrap();
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let file = write_config(
            r#"
            [[slots]]
            slot = 8
            model = "A7435SN"
            channels = 24
            "#,
        );

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.commit_interval(), Duration::from_secs(30));
        assert_eq!(config.database_url, "sqlite://hvwatch.db?mode=rwc");
        assert_eq!(config.parameter_set().unwrap().len(), 7);
    }

    #[test]
    fn zero_interval_is_fatal() {
        let file = write_config(
            r#"
            poll_interval_ms = 0

            [[slots]]
            slot = 1
            model = "A7030P"
            channels = 48
            "#,
        );

        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn malformed_topology_is_fatal() {
        let file = write_config(
            r#"
            [[slots]]
            slot = 1
            model = "A7030P"
            channels = 0
            "#,
        );

        assert!(EngineConfig::load(file.path()).is_err());
    }

    #[test]
    fn duplicate_slots_are_fatal() {
        let file = write_config(
            r#"
            [[slots]]
            slot = 4
            model = "A7435SN"
            channels = 24

            [[slots]]
            slot = 4
            model = "A7435SN"
            channels = 24
            "#,
        );

        assert!(EngineConfig::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = EngineConfig::load(Path::new("/no/such/hvwatch.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read config file"));
    }
}
