pub mod anchor;
pub mod config;
pub mod hash;
pub mod proof;
pub mod seal;
pub mod verify;

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use vcp_core::config::{ConfigSource, IntegrityConfig, load_config};
use vcp_core::{HashFunction, HashRegistry};

use crate::output::OutputMode;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub cwd: PathBuf,
    pub config: IntegrityConfig,
    pub source: ConfigSource,
    pub output: OutputMode,
    pub registry: HashRegistry,
}

impl Context {
    pub fn load(explicit: Option<&Path>, cwd: PathBuf, output: OutputMode) -> Result<Self> {
        let (config, source) = load_config(explicit, &cwd)?;
        Ok(Self {
            cwd,
            config,
            source,
            output,
            registry: HashRegistry::with_builtins(),
        })
    }

    /// `--algorithm` if given, else the configured one.
    pub fn hasher(&self, algorithm: Option<&str>) -> Result<Arc<dyn HashFunction>> {
        match algorithm {
            Some(name) => self
                .registry
                .resolve(name)
                .with_context(|| format!("hash algorithm {name:?}")),
            None => self.config.hasher(&self.registry),
        }
    }

    /// Resolve a user-supplied path against the working directory.
    pub fn path(&self, path: &Path) -> PathBuf {
        self.cwd.join(path)
    }

    /// `--state` if given, else the configured state file.
    pub fn state_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(|| self.config.state_path(&self.cwd), |p| self.path(p))
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read one JSON value per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut items = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), line_no + 1))?;
        items.push(item);
    }
    Ok(items)
}

pub fn write_jsonl<'a, T: Serialize + 'a>(
    path: &Path,
    items: impl IntoIterator<Item = &'a T>,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file =
        fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
