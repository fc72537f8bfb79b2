//! The root aggregate: document decode, state merge, machine construction.

use crate::boxes::BoxStorage;
use crate::command::Command;
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::registry::Registry;
use crate::scheduler::TaskEdge;
use crate::state::StateStore;
use crate::topology::attr::{resolve_all, yaml_get};
use crate::topology::machine::{MachineNode, TaskContext};
use crate::topology::network;
use crate::topology::node::{Node, NodeFamily, NodeRef};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Root key of the topology document.
const ROOT_KEY: &str = "machina";

/// One topology document, loaded and resolved.
///
/// Machines are never removed from the list during a run; a destroyed
/// machine is represented by its cleared state, not by absence.
#[derive(Debug)]
pub struct Topology {
    path: PathBuf,
    global: NodeRef,
    networks: Vec<NodeRef>,
    machines: Vec<MachineNode>,
    state: StateStore,
    boxes: BoxStorage,
}

impl Topology {
    /// Loads and resolves a topology file.
    ///
    /// The persisted sidecar (if any) is loaded first and merged into each
    /// machine's raw fields before construction, so previously provisioned
    /// machines keep their durable identifiers. Built-in default networks
    /// are inserted ahead of user-declared ones; entries with colliding
    /// names are all kept.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed documents, corrupt sidecar state,
    /// and unknown provider classes, all before any scheduling.
    pub fn load(path: &Path, registry: &Registry, config: &Config) -> Result<Self> {
        let state = StateStore::load_for(path)?;

        let content = std::fs::read_to_string(path)?;
        let doc: Value = serde_yaml::from_str(&content)
            .map_err(|e| CoreError::configuration(format!("{}: {e}", path.display())))?;
        let root = doc
            .as_mapping()
            .and_then(|m| yaml_get(m, ROOT_KEY))
            .and_then(Value::as_mapping)
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "{} has no \"{ROOT_KEY}\" root mapping",
                    path.display()
                ))
            })?;

        let global = build_global(root, registry)?;
        let networks = build_networks(root, &global, registry)?;
        let machines = build_machines(root, &global, &state, registry, config)?;

        // Mark each box present or missing so task generation knows
        // whether a fetch must precede the import.
        let boxes = BoxStorage::new(config.boxes_dir());
        for machine in &machines {
            if let Some(bx) = machine.box_node() {
                boxes.refresh(&bx);
            }
        }

        info!(
            path = %path.display(),
            machines = machines.len(),
            networks = networks.len(),
            "topology loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            global,
            networks,
            machines,
            state,
            boxes,
        })
    }

    /// The source document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The anonymous global defaults node.
    #[must_use]
    pub fn global(&self) -> &NodeRef {
        &self.global
    }

    /// Topology-level networks, built-ins first.
    #[must_use]
    pub fn networks(&self) -> &[NodeRef] {
        &self.networks
    }

    /// The machines, in declaration order.
    #[must_use]
    pub fn machines(&self) -> &[MachineNode] {
        &self.machines
    }

    /// The sidecar state store.
    #[must_use]
    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    /// Collects every machine's task edges for a command.
    ///
    /// # Errors
    ///
    /// Propagates task-generation failures (unknown plugin classes,
    /// dangling network references) before anything is scheduled.
    pub fn tasks(&self, command: Command, registry: &Registry) -> Result<Vec<TaskEdge>> {
        let ctx = TaskContext {
            registry,
            networks: &self.networks,
            boxes: &self.boxes,
        };
        let mut edges = Vec::new();
        for machine in &self.machines {
            edges.extend(machine.tasks_for(command, &ctx)?);
        }
        debug!(command = %command, edges = edges.len(), "collected task edges");
        Ok(edges)
    }

    /// Persists the machines' durable state to the sidecar.
    ///
    /// # Errors
    ///
    /// Propagates state store failures.
    pub fn save_state(&self) -> Result<()> {
        self.state.save(&self.machines)
    }
}

/// Built-in default network entries, inserted ahead of user declarations.
fn builtin_networks() -> Vec<Mapping> {
    let mut nat = Mapping::new();
    nat.insert(
        Value::String("name".to_string()),
        Value::String("machina-nat".to_string()),
    );
    nat.insert(
        Value::String("scope".to_string()),
        Value::String(network::SCOPE_NAT.to_string()),
    );
    vec![nat]
}

/// Built-in default interface, giving every machine a NAT adapter.
fn builtin_nat_interface() -> Mapping {
    let mut iface = Mapping::new();
    iface.insert(
        Value::String("name".to_string()),
        Value::String("nat0".to_string()),
    );
    iface.insert(
        Value::String("network".to_string()),
        Value::String("machina-nat".to_string()),
    );
    iface
}

fn build_global(root: &Mapping, registry: &Registry) -> Result<NodeRef> {
    let mut raw = yaml_get(root, "default")
        .and_then(Value::as_mapping)
        .cloned()
        .unwrap_or_default();

    // Built-in interface first; user declarations follow, duplicates kept.
    let mut interfaces = vec![Value::Mapping(builtin_nat_interface())];
    if let Some(seq) = yaml_get(&raw, "interfaces").and_then(Value::as_sequence) {
        interfaces.extend(seq.iter().cloned());
    }
    raw.insert(
        Value::String("interfaces".to_string()),
        Value::Sequence(interfaces),
    );

    let global = Node::new(
        NodeFamily::Machine,
        crate::topology::schema_for(NodeFamily::Machine),
    );
    resolve_all(&global, &raw, registry)?;
    Ok(global)
}

fn build_networks(root: &Mapping, global: &NodeRef, registry: &Registry) -> Result<Vec<NodeRef>> {
    let mut raws = builtin_networks();
    if let Some(seq) = yaml_get(root, "networks").and_then(Value::as_sequence) {
        for entry in seq {
            let map = entry.as_mapping().ok_or_else(|| {
                CoreError::configuration("every networks entry must be a mapping")
            })?;
            raws.push(map.clone());
        }
    }

    // Duplicate names are deliberately all kept: the built-in entry stays
    // even when a user entry collides with it.
    let mut networks = Vec::with_capacity(raws.len());
    for raw in &raws {
        let net = registry.build_child(NodeFamily::Network, raw, global)?;
        network::validate(&net)?;
        let ordinal = global.next_ordinal(NodeFamily::Network);
        network::expand_ordinal(&net, ordinal);
        networks.push(net);
    }
    Ok(networks)
}

fn build_machines(
    root: &Mapping,
    global: &NodeRef,
    state: &StateStore,
    registry: &Registry,
    config: &Config,
) -> Result<Vec<MachineNode>> {
    let Some(seq) = yaml_get(root, "machines").and_then(Value::as_sequence) else {
        return Ok(Vec::new());
    };

    let mut machines = Vec::with_capacity(seq.len());
    for entry in seq {
        let mut raw = entry
            .as_mapping()
            .cloned()
            .ok_or_else(|| CoreError::configuration("every machines entry must be a mapping"))?;
        let name = yaml_get(&raw, "name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::configuration("machine without a name"))?;

        merge_persisted(&mut raw, &name, state);

        let class = yaml_get(&raw, "class")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map_or_else(|| config.default_provider.clone(), str::to_string);
        raw.insert(
            Value::String("class".to_string()),
            Value::String(class.clone()),
        );

        let plugin = registry.provider(&class)?;
        let node = Node::new(NodeFamily::Machine, plugin.schema(NodeFamily::Machine));
        node.set_parent(Some(global));
        resolve_all(&node, &raw, registry)?;
        machines.push(MachineNode::new(node, plugin));
    }
    Ok(machines)
}

/// Merges a machine's persisted record into its raw fields.
///
/// Only records carrying a non-empty `uuid` are merged; the persisted
/// fields win over declared ones, so the provider recognizes the machine
/// as already provisioned.
fn merge_persisted(raw: &mut Mapping, name: &str, state: &StateStore) {
    let record = state.machine_record(name);
    let has_uuid = yaml_get(&record, "uuid")
        .and_then(Value::as_str)
        .is_some_and(|u| !u.is_empty());
    if !has_uuid {
        return;
    }
    debug!(machine = name, "merging persisted state");
    for (key, value) in record {
        raw.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::topology::machine::MachineState;

    fn write_topology(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("topology.yaml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn load(path: &Path) -> Topology {
        let registry = Registry::with_builtins();
        Topology::load(path, &registry, &Config::default()).unwrap()
    }

    const MINIMAL: &str = "\
machina:
  machines:
    - name: vm1
";

    #[test]
    fn test_minimal_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(&dir, MINIMAL);
        let topology = load(&path);

        assert_eq!(topology.machines().len(), 1);
        let m = &topology.machines()[0];
        assert_eq!(m.name(), "vm1");
        // Default provider class filled in.
        assert_eq!(m.class_name(), "noop");
        assert!(m.uuid().is_empty());
        assert_eq!(m.state(), MachineState::Unknown);
    }

    #[test]
    fn test_missing_root_key_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(&dir, "something_else: {}\n");
        let registry = Registry::with_builtins();

        let err = Topology::load(&path, &registry, &Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn test_global_defaults_are_inherited_by_machines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(
            &dir,
            "\
machina:
  default:
    memory: 4096
  machines:
    - name: vm1
    - name: vm2
      memory: 512
",
        );
        let topology = load(&path);

        assert_eq!(topology.machines()[0].node().get_int("memory"), Some(4096));
        assert_eq!(topology.machines()[1].node().get_int("memory"), Some(512));
    }

    #[test]
    fn test_builtin_network_precedes_user_entries_without_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(
            &dir,
            "\
machina:
  networks:
    - name: machina-nat
      scope: nat
    - name: lan0
  machines: []
",
        );
        let topology = load(&path);

        let names: Vec<String> = topology.networks().iter().map(|n| n.name()).collect();
        // Built-in first, the colliding user entry kept as well.
        assert_eq!(names, ["machina-nat", "machina-nat", "lan0"]);
    }

    #[test]
    fn test_network_ordinals_expand_templates_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(
            &dir,
            "\
machina:
  networks:
    - name: lan0
    - name: lan1
  machines: []
",
        );
        let topology = load(&path);

        // Ordinals 1 and 2; ordinal 0 went to the built-in NAT network.
        assert_eq!(
            topology.networks()[1].get_str("ip").as_deref(),
            Some("192.168.1.1")
        );
        assert_eq!(
            topology.networks()[2].get_str("ip").as_deref(),
            Some("192.168.2.1")
        );
    }

    #[test]
    fn test_unknown_provider_class_fails_before_scheduling() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(
            &dir,
            "\
machina:
  machines:
    - name: vm1
      class: unknown-provider
",
        );
        let registry = Registry::with_builtins();

        let err = Topology::load(&path, &registry, &Config::default()).unwrap_err();
        assert!(err.is_component_not_found());
    }

    #[test]
    fn test_state_merge_makes_reruns_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(&dir, MINIMAL);
        let registry = Registry::with_builtins();
        let config = Config::default();

        // First convergence: create, NAT network, its interface, power-up.
        let topology = Topology::load(&path, &registry, &config).unwrap();
        let mut sched = Scheduler::new();
        sched.append(topology.tasks(Command::Up, &registry).unwrap());
        sched.run(true).unwrap();
        assert_eq!(sched.num_completed(), 4);
        topology.save_state().unwrap();

        let uuid = topology.machines()[0].uuid();
        assert!(!uuid.is_empty());

        // A reload sees the same identity: no further create or power-up,
        // only the idempotent network work remains.
        let reloaded = Topology::load(&path, &registry, &config).unwrap();
        let m = &reloaded.machines()[0];
        assert_eq!(m.uuid(), uuid);
        assert_eq!(m.state(), MachineState::Running);
        let labels: Vec<String> = reloaded
            .tasks(Command::Up, &registry)
            .unwrap()
            .iter()
            .map(|e| e.task.label().to_string())
            .collect();
        assert!(labels.iter().all(|l| !l.starts_with("create ")));
        assert!(labels.iter().all(|l| !l.starts_with("power-up ")));

        // Loading a third time is stable too.
        let again = Topology::load(&path, &registry, &config).unwrap();
        assert_eq!(again.machines()[0].uuid(), uuid);
    }

    #[test]
    fn test_destroy_clears_state_and_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(&dir, MINIMAL);
        let registry = Registry::with_builtins();
        let config = Config::default();

        let topology = Topology::load(&path, &registry, &config).unwrap();
        let mut sched = Scheduler::new();
        sched.append(topology.tasks(Command::Up, &registry).unwrap());
        sched.run(true).unwrap();
        topology.save_state().unwrap();
        assert!(StateStore::sidecar_path(&path).exists());

        let reloaded = Topology::load(&path, &registry, &config).unwrap();
        let mut sched = Scheduler::new();
        sched.append(reloaded.tasks(Command::Destroy, &registry).unwrap());
        sched.run(true).unwrap();
        reloaded.save_state().unwrap();

        assert!(reloaded.machines()[0].uuid().is_empty());
        assert!(!StateStore::sidecar_path(&path).exists());
    }

    #[test]
    fn test_declared_box_is_fetched_into_storage_on_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("debian.img");
        std::fs::write(&source, b"archive-bytes").unwrap();
        let path = write_topology(
            &dir,
            &format!(
                "\
machina:
  machines:
    - name: vm1
      box:
        name: debian
        url: {}
",
                source.display()
            ),
        );
        let registry = Registry::with_builtins();
        let mut config = Config::default();
        config.data_dir = dir.path().join("data");

        let topology = Topology::load(&path, &registry, &config).unwrap();
        let labels: Vec<String> = topology
            .tasks(Command::Up, &registry)
            .unwrap()
            .iter()
            .map(|e| e.task.label().to_string())
            .collect();
        assert_eq!(labels[0], "fetch debian (vm1)");

        let mut sched = Scheduler::new();
        sched.append(topology.tasks(Command::Up, &registry).unwrap());
        sched.run(true).unwrap();
        topology.save_state().unwrap();
        assert!(config.boxes_dir().join("debian").join("box.img").is_file());

        // The next load sees the cached archive and schedules no fetch.
        let reloaded = Topology::load(&path, &registry, &config).unwrap();
        let labels: Vec<String> = reloaded
            .tasks(Command::Up, &registry)
            .unwrap()
            .iter()
            .map(|e| e.task.label().to_string())
            .collect();
        assert!(labels.iter().all(|l| !l.starts_with("fetch ")));
    }

    #[test]
    fn test_machine_interfaces_append_to_global_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_topology(
            &dir,
            "\
machina:
  default:
    interfaces:
      - name: eth0
        network: machina-nat
  machines:
    - name: vm1
      interfaces:
        - name: eth1
          network: lan0
  networks:
    - name: lan0
",
        );
        let topology = load(&path);

        let ifaces = topology.machines()[0].interfaces();
        let names: Vec<String> = ifaces.iter().map(|i| i.name()).collect();
        // Built-in NAT adapter, then the global default, then the machine's
        // own interface.
        assert_eq!(names, ["nat0", "eth0", "eth1"]);
    }
}
