//! End-to-end convergence behavior through the public API.

use machina_core::provider::{NoopDriver, ProviderDriver, ProviderPlugin};
use machina_core::topology::node::NodeRef;
use machina_core::{
    Command, Config, CoreError, MachineNode, MachineState, Registry, Scheduler, StateStore,
    Topology,
};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Provider whose machines never manage to power up.
#[derive(Debug)]
struct FlakyProvider;

impl ProviderPlugin for FlakyProvider {
    fn driver(&self) -> Rc<dyn ProviderDriver> {
        Rc::new(FlakyDriver)
    }
}

struct FlakyDriver;

impl ProviderDriver for FlakyDriver {
    fn power_up(&self, _machine: &MachineNode) -> machina_core::Result<()> {
        Err(CoreError::provider("hypervisor offline"))
    }

    fn power_down(&self, machine: &MachineNode) -> machina_core::Result<()> {
        NoopDriver.power_down(machine)
    }

    fn pause(&self, machine: &MachineNode) -> machina_core::Result<()> {
        NoopDriver.pause(machine)
    }

    fn destroy(&self, machine: &MachineNode) -> machina_core::Result<()> {
        NoopDriver.destroy(machine)
    }

    fn query_state(&self, machine: &MachineNode) -> machina_core::Result<MachineState> {
        NoopDriver.query_state(machine)
    }

    fn import_appliance(
        &self,
        box_node: Option<&NodeRef>,
        machine: &MachineNode,
    ) -> machina_core::Result<()> {
        NoopDriver.import_appliance(box_node, machine)
    }

    fn create_network(&self, machine: &MachineNode, network: &NodeRef) -> machina_core::Result<()> {
        NoopDriver.create_network(machine, network)
    }

    fn setup_interface(
        &self,
        machine: &MachineNode,
        interface: &NodeRef,
    ) -> machina_core::Result<()> {
        NoopDriver.setup_interface(machine, interface)
    }
}

fn write_topology(dir: &tempfile::TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("machina.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

fn converge(path: &Path, registry: &Registry, command: Command) -> (Topology, Scheduler, machina_core::Result<()>) {
    let topology = Topology::load(path, registry, &Config::default()).unwrap();
    let mut scheduler = Scheduler::new();
    scheduler
        .append(topology.tasks(command, registry).unwrap());
    let outcome = scheduler.run(true);
    if scheduler.num_completed() > 0 {
        topology.save_state().unwrap();
    }
    (topology, scheduler, outcome)
}

const TWO_MACHINES: &str = "\
machina:
  default:
    memory: 2048
    interfaces:
      - name: eth0
        network: machina-nat
  networks:
    - name: lan0
  machines:
    - name: web
      interfaces:
        - name: eth1
          network: lan0
    - name: db
";

#[test]
fn test_up_converges_and_reruns_do_less() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_topology(&dir, TWO_MACHINES);
    let registry = Registry::with_builtins();

    let (topology, scheduler, outcome) = converge(&path, &registry, Command::Up);
    outcome.unwrap();

    // web: create, then network/interface pairs for nat0 (built-in), eth0,
    // and eth1, then power-up. db: the same minus eth1.
    assert_eq!(scheduler.num_completed(), 14);
    for machine in topology.machines() {
        assert!(!machine.uuid().is_empty());
        assert_eq!(machine.state(), MachineState::Running);
    }
    assert!(StateStore::sidecar_path(&path).exists());

    // A second run keeps identities and contributes neither create nor
    // power-up actions; the interface work stays (it is idempotent).
    let reloaded = Topology::load(&path, &registry, &Config::default()).unwrap();
    let labels: Vec<String> = reloaded
        .tasks(Command::Up, &registry)
        .unwrap()
        .iter()
        .map(|e| e.task.label().to_string())
        .collect();
    assert!(labels.iter().all(|l| !l.starts_with("create ")));
    assert!(labels.iter().all(|l| !l.starts_with("power-up ")));
}

#[test]
fn test_down_then_up_power_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_topology(&dir, TWO_MACHINES);
    let registry = Registry::with_builtins();

    converge(&path, &registry, Command::Up).2.unwrap();

    let (topology, scheduler, outcome) = converge(&path, &registry, Command::Down);
    outcome.unwrap();
    assert_eq!(scheduler.num_completed(), 2);
    for machine in topology.machines() {
        assert_eq!(machine.state(), MachineState::PowerDown);
    }

    // Down again is a no-op with nothing to persist.
    let (_, scheduler, outcome) = converge(&path, &registry, Command::Down);
    outcome.unwrap();
    assert_eq!(scheduler.num_completed(), 0);
}

#[test]
fn test_partial_failure_keeps_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_topology(
        &dir,
        "\
machina:
  machines:
    - name: web
      class: flaky
",
    );
    let mut registry = Registry::with_builtins();
    registry.register_provider("flaky", Rc::new(FlakyProvider));

    let (topology, scheduler, outcome) = converge(&path, &registry, Command::Up);
    let err = outcome.unwrap_err();
    assert!(matches!(err, CoreError::Task { .. }));

    // Everything up to the failing power-up completed (create plus the
    // built-in NAT network and interface), and the identifier was persisted
    // even though the run failed.
    assert_eq!(scheduler.num_completed(), 3);
    let uuid = topology.machines()[0].uuid();
    assert!(!uuid.is_empty());
    assert!(StateStore::sidecar_path(&path).exists());

    // The retry resumes from the persisted identity: no second create, and
    // the power-up is attempted again.
    let reloaded = Topology::load(&path, &registry, &Config::default()).unwrap();
    assert_eq!(reloaded.machines()[0].uuid(), uuid);
    let labels: Vec<String> = reloaded
        .tasks(Command::Up, &registry)
        .unwrap()
        .iter()
        .map(|e| e.task.label().to_string())
        .collect();
    assert!(labels.iter().all(|l| !l.starts_with("create ")));
    assert_eq!(labels.last().map(String::as_str), Some("power-up web"));
}

#[test]
fn test_destroy_returns_to_a_clean_slate() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_topology(&dir, TWO_MACHINES);
    let registry = Registry::with_builtins();

    converge(&path, &registry, Command::Up).2.unwrap();
    converge(&path, &registry, Command::Destroy).2.unwrap();
    assert!(!StateStore::sidecar_path(&path).exists());

    // The next load starts from scratch.
    let fresh = Topology::load(&path, &registry, &Config::default()).unwrap();
    for machine in fresh.machines() {
        assert!(machine.uuid().is_empty());
        assert_eq!(machine.state(), MachineState::Unknown);
    }
}
