//! `IntegrityConfig`: hashing and anchoring settings loaded from TOML.
//!
//! Lookup order: an explicit path, then `.vcp/config.toml` under the working
//! directory, then `<config dir>/vcp/config.toml`, then built-in defaults.
//! Every field has a default, so an empty file is a valid config.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result, bail};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorPolicy, AnchorTarget, Backoff, FileLedgerTarget, SchedulerConfig};
use crate::chain::HashChainState;
use crate::hash::{HashFunction, HashRegistry};

const PROJECT_CONFIG: &str = ".vcp/config.toml";

/// Longest accepted anchoring interval: 100 years.
pub const MAX_INTERVAL_SECS: u64 = 100 * 365 * 86_400;

/// Longest accepted retry backoff ceiling and per-target timeout: one day.
pub const MAX_WAIT_MS: u64 = 86_400_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityConfig {
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub anchor: AnchorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_true")]
    pub chain: bool,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            chain: default_true(),
        }
    }
}

/// Service tier; sets the default anchoring interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Every 24 hours.
    Silver,
    /// Every hour.
    #[default]
    Gold,
    /// Every 10 minutes.
    Platinum,
}

impl Tier {
    #[must_use]
    pub const fn interval_secs(self) -> u64 {
        match self {
            Self::Silver => 86_400,
            Self::Gold => 3_600,
            Self::Platinum => 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    #[serde(default)]
    pub tier: Tier,
    /// Overrides the tier interval when set.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_target_timeout_ms")]
    pub target_timeout_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Ordered: the first entry is the primary.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            tier: Tier::default(),
            interval_secs: None,
            max_retries: default_max_retries(),
            target_timeout_ms: default_target_timeout_ms(),
            tick_ms: default_tick_ms(),
            backoff: Backoff::default(),
            state_path: default_state_path(),
            targets: Vec::new(),
        }
    }
}

/// One configured anchor target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetConfig {
    File {
        #[serde(default)]
        name: Option<String>,
        path: PathBuf,
    },
}

fn default_true() -> bool {
    true
}

fn default_algorithm() -> String {
    "sha256".to_string()
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_target_timeout_ms() -> u64 {
    30_000
}

const fn default_tick_ms() -> u64 {
    1_000
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".vcp/anchor-state.json")
}

impl IntegrityConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Fails on TOML syntax errors, unknown hash algorithms, and an interval,
    /// timeout or backoff that is zero or out of range.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid vcp config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        HashRegistry::with_builtins()
            .resolve(&self.hashing.algorithm)
            .context("invalid [hashing] algorithm")?;
        if let Some(secs) = self.anchor.interval_secs
            && !(1..=MAX_INTERVAL_SECS).contains(&secs)
        {
            bail!("[anchor] interval_secs must be between 1 and {MAX_INTERVAL_SECS}, got {secs}");
        }
        let timeout = self.anchor.target_timeout_ms;
        if !(1..=MAX_WAIT_MS).contains(&timeout) {
            bail!("[anchor] target_timeout_ms must be between 1 and {MAX_WAIT_MS}, got {timeout}");
        }
        let backoff = &self.anchor.backoff;
        if backoff.max_ms > MAX_WAIT_MS {
            bail!(
                "[anchor.backoff] max_ms must be at most {MAX_WAIT_MS}, got {}",
                backoff.max_ms
            );
        }
        Ok(())
    }

    /// Resolve the configured hash function.
    ///
    /// # Errors
    ///
    /// Fails if the algorithm is not in `registry`.
    pub fn hasher(&self, registry: &HashRegistry) -> Result<Arc<dyn HashFunction>> {
        registry
            .resolve(&self.hashing.algorithm)
            .with_context(|| format!("hash algorithm {:?}", self.hashing.algorithm))
    }

    /// Starting chain state for a new stream.
    #[must_use]
    pub const fn chain_state(&self) -> HashChainState {
        if self.hashing.chain {
            HashChainState::genesis()
        } else {
            HashChainState::unchained()
        }
    }

    #[must_use]
    pub fn interval_secs(&self) -> u64 {
        self.anchor
            .interval_secs
            .unwrap_or_else(|| self.anchor.tier.interval_secs())
    }

    #[must_use]
    pub fn anchor_policy(&self) -> AnchorPolicy {
        AnchorPolicy {
            interval: i64::try_from(self.interval_secs())
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            max_retries: self.anchor.max_retries,
            target_timeout: StdDuration::from_millis(self.anchor.target_timeout_ms),
        }
    }

    #[must_use]
    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_ms: self.anchor.tick_ms,
            backoff: self.anchor.backoff,
        }
    }

    /// Build the configured targets, resolving relative paths against `base`.
    #[must_use]
    pub fn build_targets(&self, base: &Path) -> Vec<Arc<dyn AnchorTarget>> {
        self.anchor
            .targets
            .iter()
            .enumerate()
            .map(|(i, target)| match target {
                TargetConfig::File { name, path } => {
                    let name = name.clone().unwrap_or_else(|| format!("file-{i}"));
                    Arc::new(FileLedgerTarget::new(name, base.join(path))) as Arc<dyn AnchorTarget>
                }
            })
            .collect()
    }

    /// State file path, resolved against `base`.
    #[must_use]
    pub fn state_path(&self, base: &Path) -> PathBuf {
        base.join(&self.anchor.state_path)
    }
}

/// Where a config was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

/// Find and load the effective config.
///
/// # Errors
///
/// Fails if an explicit path is missing, or any found file cannot be read
/// or parsed.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<(IntegrityConfig, ConfigSource)> {
    if let Some(path) = explicit {
        return load_file(path).map(|c| (c, ConfigSource::File(path.to_path_buf())));
    }

    let project = cwd.join(PROJECT_CONFIG);
    if project.exists() {
        return load_file(&project).map(|c| (c, ConfigSource::File(project)));
    }

    if let Some(user) = dirs::config_dir().map(|d| d.join("vcp/config.toml"))
        && user.exists()
    {
        return load_file(&user).map(|c| (c, ConfigSource::File(user)));
    }

    Ok((IntegrityConfig::default(), ConfigSource::Defaults))
}

fn load_file(path: &Path) -> Result<IntegrityConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    IntegrityConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = IntegrityConfig::from_toml_str("").expect("parse");
        assert_eq!(config, IntegrityConfig::default());
        assert_eq!(config.hashing.algorithm, "sha256");
        assert!(config.hashing.chain);
        assert_eq!(config.interval_secs(), 3_600);
        assert_eq!(config.anchor.max_retries, 5);
    }

    #[test]
    fn tiers_set_intervals_and_override_wins() {
        let silver = IntegrityConfig::from_toml_str("[anchor]\ntier = \"silver\"").expect("silver");
        assert_eq!(silver.interval_secs(), 86_400);
        let platinum =
            IntegrityConfig::from_toml_str("[anchor]\ntier = \"platinum\"").expect("platinum");
        assert_eq!(platinum.anchor_policy().interval, Duration::minutes(10));
        let custom =
            IntegrityConfig::from_toml_str("[anchor]\ntier = \"silver\"\ninterval_secs = 42")
                .expect("custom");
        assert_eq!(custom.interval_secs(), 42);
    }

    #[test]
    fn full_document_parses() {
        let raw = r#"
[hashing]
algorithm = "blake3"
chain = false

[anchor]
tier = "gold"
max_retries = 2
target_timeout_ms = 500

[anchor.backoff]
base_ms = 10
max_ms = 100
jitter = false

[[anchor.targets]]
kind = "file"
name = "primary"
path = "anchors/primary.jsonl"

[[anchor.targets]]
kind = "file"
path = "anchors/fallback.jsonl"
"#;
        let config = IntegrityConfig::from_toml_str(raw).expect("parse");
        assert_eq!(config.chain_state(), HashChainState::unchained());
        assert_eq!(config.anchor.backoff.max_ms, 100);
        assert_eq!(
            config.anchor_policy().target_timeout,
            StdDuration::from_millis(500)
        );
        let targets = config.build_targets(Path::new("/srv/vcp"));
        let names: Vec<&str> = targets.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["primary", "file-1"]);
        let hasher = config.hasher(&HashRegistry::with_builtins()).expect("hasher");
        assert_eq!(hasher.name(), "blake3");
    }

    #[test]
    fn unknown_algorithm_fails_at_load() {
        let err = IntegrityConfig::from_toml_str("[hashing]\nalgorithm = \"md5\"")
            .expect_err("unknown");
        assert!(format!("{err:#}").contains("md5"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(IntegrityConfig::from_toml_str("[anchor]\ntarget_timeout_ms = 0").is_err());
    }

    #[test]
    fn out_of_range_interval_is_rejected() {
        for secs in ["10000000000000", "9223372036854775807", "0"] {
            let raw = format!("[anchor]\ninterval_secs = {secs}");
            let err = IntegrityConfig::from_toml_str(&raw).expect_err(secs);
            assert!(format!("{err:#}").contains("interval_secs"), "{err:#}");
        }
        let edge = format!("[anchor]\ninterval_secs = {MAX_INTERVAL_SECS}");
        let config = IntegrityConfig::from_toml_str(&edge).expect("100 years");
        assert_eq!(
            config.anchor_policy().interval,
            Duration::seconds(i64::try_from(MAX_INTERVAL_SECS).expect("fits"))
        );
    }

    #[test]
    fn out_of_range_backoff_and_timeout_are_rejected() {
        let backoff =
            "[anchor.backoff]\nbase_ms = 9223372036854775807\nmax_ms = 9223372036854775807";
        let err = IntegrityConfig::from_toml_str(backoff).expect_err("backoff");
        assert!(format!("{err:#}").contains("max_ms"), "{err:#}");
        assert!(IntegrityConfig::from_toml_str("[anchor]\ntarget_timeout_ms = 86400001").is_err());
    }

    #[test]
    fn unvalidated_interval_saturates_instead_of_panicking() {
        let mut config = IntegrityConfig::default();
        config.anchor.interval_secs = Some(u64::MAX);
        assert_eq!(config.anchor_policy().interval, Duration::MAX);
    }

    #[test]
    fn explicit_then_project_then_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let explicit = dir.path().join("custom.toml");
        std::fs::write(&explicit, "[anchor]\nmax_retries = 9").expect("write");
        let (config, source) = load_config(Some(&explicit), dir.path()).expect("explicit");
        assert_eq!(config.anchor.max_retries, 9);
        assert_eq!(source, ConfigSource::File(explicit));

        std::fs::create_dir_all(dir.path().join(".vcp")).expect("mkdir");
        std::fs::write(dir.path().join(PROJECT_CONFIG), "[anchor]\nmax_retries = 1")
            .expect("write");
        let (config, _) = load_config(None, dir.path()).expect("project");
        assert_eq!(config.anchor.max_retries, 1);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        assert!(load_config(Some(&dir.path().join("absent.toml")), dir.path()).is_err());
    }
}
