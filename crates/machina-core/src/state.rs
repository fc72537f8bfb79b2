//! Durable convergence state.
//!
//! The state store is a YAML sidecar next to the topology file (same base
//! name, `state` extension) keyed by machine name. It exists on disk only
//! after a run actually executed work; a present-but-unreadable file is
//! fatal, because treating it as "no state" would silently re-provision
//! machines that already exist.

use crate::error::{CoreError, Result};
use crate::topology::machine::MachineNode;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Root key of the sidecar document.
const ROOT_KEY: &str = "machina";
/// Machines section under the root key.
const MACHINES_KEY: &str = "machines";
/// Sidecar file extension.
const STATE_EXTENSION: &str = "state";

/// Reader and writer of the sidecar state file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    persisted: bool,
    records: BTreeMap<String, Mapping>,
}

impl StateStore {
    /// Derives the sidecar path for a topology file.
    #[must_use]
    pub fn sidecar_path(topology_path: &Path) -> PathBuf {
        topology_path.with_extension(STATE_EXTENSION)
    }

    /// Loads the sidecar for the given topology file.
    ///
    /// A missing file is a normal empty store. A present file that is empty
    /// or unparsable is a malformed-state error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be read and a
    /// malformed-state error when it cannot be interpreted.
    pub fn load_for(topology_path: &Path) -> Result<Self> {
        let path = Self::sidecar_path(topology_path);
        if !path.exists() {
            debug!(path = %path.display(), "no state file, starting fresh");
            return Ok(Self {
                path,
                persisted: false,
                records: BTreeMap::new(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Err(CoreError::malformed_state(format!(
                "{} is empty",
                path.display()
            )));
        }
        let doc: Value = serde_yaml::from_str(&content)
            .map_err(|e| CoreError::malformed_state(format!("{}: {e}", path.display())))?;

        let records = parse_records(&doc)
            .ok_or_else(|| CoreError::malformed_state(format!("{}", path.display())))?;

        info!(path = %path.display(), machines = records.len(), "loaded state");
        Ok(Self {
            path,
            persisted: true,
            records,
        })
    }

    /// True when the sidecar file existed at load time.
    #[must_use]
    pub fn persisted(&self) -> bool {
        self.persisted
    }

    /// The sidecar path this store reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored field map for a machine, empty when unknown.
    ///
    /// Callers treat "no entry" and "entry with no fields" identically: the
    /// merge into raw configuration is a no-op either way.
    #[must_use]
    pub fn machine_record(&self, name: &str) -> Mapping {
        self.records.get(name).cloned().unwrap_or_default()
    }

    /// Snapshots the machines' persisted attributes to the sidecar.
    ///
    /// Machines with an empty state dictionary are skipped. When every
    /// machine is empty nothing is written, and a stale file from an earlier
    /// run is removed, so absence of the file always means "nothing
    /// provisioned".
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be written, and a
    /// malformed-state error when serialization fails.
    pub fn save(&self, machines: &[MachineNode]) -> Result<()> {
        let mut entries: Vec<Value> = Vec::new();
        for machine in machines {
            let dict = machine.state_dict();
            if dict.is_empty() {
                continue;
            }
            let mut entry = Mapping::new();
            entry.insert(
                Value::String("name".to_string()),
                Value::String(machine.name()),
            );
            entry.extend(dict);
            entries.push(Value::Mapping(entry));
        }

        if entries.is_empty() {
            if self.path.exists() {
                info!(path = %self.path.display(), "removing state file");
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        let mut machines_map = Mapping::new();
        machines_map.insert(
            Value::String(MACHINES_KEY.to_string()),
            Value::Sequence(entries),
        );
        let mut root = Mapping::new();
        root.insert(
            Value::String(ROOT_KEY.to_string()),
            Value::Mapping(machines_map),
        );

        let serialized = serde_yaml::to_string(&Value::Mapping(root))
            .map_err(|e| CoreError::malformed_state(e.to_string()))?;
        std::fs::write(&self.path, serialized)?;
        info!(path = %self.path.display(), "saved state");
        Ok(())
    }
}

fn parse_records(doc: &Value) -> Option<BTreeMap<String, Mapping>> {
    let root = doc.as_mapping()?.get(Value::String(ROOT_KEY.to_string()))?;
    let machines = root
        .as_mapping()?
        .get(Value::String(MACHINES_KEY.to_string()))?;

    let mut records = BTreeMap::new();
    for entry in machines.as_sequence()? {
        let map = entry.as_mapping()?;
        let name = map
            .get(Value::String("name".to_string()))?
            .as_str()?
            .to_string();
        let mut fields = map.clone();
        fields.remove(Value::String("name".to_string()));
        records.insert(name, fields);
    }
    Some(records)
}
