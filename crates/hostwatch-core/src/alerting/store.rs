//! Persisted rule definitions
//!
//! The rules file is a JSON array of definitions. A missing or unreadable file
//! is replaced by the built-in defaults, which are written back immediately,
//! except through [`ConfigStore::open`], which leaves the file alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{default_rules, RuleDefinition};

/// How the last `load` obtained its rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Parsed from the file
    Loaded,
    /// File was absent; defaults written
    CreatedDefault,
    /// File did not parse; defaults written over it
    RecoveredDefault,
}

/// Rule definitions backed by a JSON file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    rules: Vec<RuleDefinition>,
    outcome: LoadOutcome,
}

impl ConfigStore {
    /// Load definitions from `path`, self-healing to the defaults
    ///
    /// Never fails: if the defaults cannot be written back the in-memory list
    /// is still usable and the write error is logged.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let (rules, outcome) = match read_rules(&path) {
            Ok(rules) => {
                info!(path = %path.display(), count = rules.len(), "Rules loaded");
                (rules, LoadOutcome::Loaded)
            }
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Rules file not found, creating defaults");
                (default_rules(), LoadOutcome::CreatedDefault)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read rules, restoring defaults");
                (default_rules(), LoadOutcome::RecoveredDefault)
            }
        };

        let store = Self {
            path,
            rules,
            outcome,
        };

        if outcome != LoadOutcome::Loaded {
            if let Err(e) = store.save() {
                error!(path = %store.path.display(), error = %e, "Failed to persist default rules");
            }
        }

        store
    }

    /// Read definitions from `path` without touching the file on failure
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rules = read_rules(&path)?;
        debug!(path = %path.display(), count = rules.len(), "Rules opened");

        Ok(Self {
            path,
            rules,
            outcome: LoadOutcome::Loaded,
        })
    }

    /// Write the in-memory definitions back to the rules file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut json = serde_json::to_string_pretty(&self.rules)?;
        json.push('\n');
        fs::write(&self.path, json)?;

        info!(path = %self.path.display(), count = self.rules.len(), "Rules saved");
        Ok(())
    }

    /// Path of the rules file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the definitions were obtained
    pub fn outcome(&self) -> LoadOutcome {
        self.outcome
    }

    /// Current definitions
    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    /// Mutable definitions for editors; changes apply after `save` and a reload
    pub fn rules_mut(&mut self) -> &mut Vec<RuleDefinition> {
        &mut self.rules
    }

    /// Look up a definition by name
    pub fn get(&self, name: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Append a validated definition with a unique name
    pub fn add(&mut self, def: RuleDefinition) -> Result<()> {
        def.validate()?;
        if self.get(&def.name).is_some() {
            return Err(Error::validation(format!("rule `{}` already exists", def.name)));
        }
        if !def.is_known_metric() {
            warn!(rule = %def.name, metric = %def.metric, "Rule uses a metric no built-in source provides");
        }
        self.rules.push(def);
        Ok(())
    }

    /// Remove a definition by name
    pub fn remove(&mut self, name: &str) -> Result<RuleDefinition> {
        let index = self
            .rules
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| Error::not_found("rule", name))?;
        Ok(self.rules.remove(index))
    }

    /// Enable or disable a definition by name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::not_found("rule", name))?;
        rule.enabled = enabled;
        Ok(())
    }

    /// Replace every definition with the built-in defaults
    pub fn reset_to_defaults(&mut self) {
        self.rules = default_rules();
    }
}

fn read_rules(path: &Path) -> Result<Vec<RuleDefinition>> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
}
