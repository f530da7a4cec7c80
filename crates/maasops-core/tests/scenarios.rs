use maasops_client::{MaasApi, NodeStatus, PowerState};
use maasops_core::{
    reconcile, resolve_by_hostname_or_id, resolve_by_hostname_or_power_address, set_hostname,
    CancelToken, CoreError, DesiredState, Query, ReconcileOptions, SimMachine, SimulatedMaas,
    TransitionOutcome,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn quick() -> ReconcileOptions {
    ReconcileOptions {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
    }
}

fn rack() -> SimulatedMaas {
    SimulatedMaas::new(vec![
        SimMachine::new("y3b3x3", "server1")
            .with_status(NodeStatus::Deployed)
            .with_power(PowerState::On)
            .with_power_address("10.20.0.11"),
        SimMachine::new("k8p2a1", "server2")
            .with_status(NodeStatus::Deployed)
            .with_power(PowerState::Off)
            .with_power_address("10.20.0.12"),
        SimMachine::new("n0n3w1", "fresh").with_status(NodeStatus::New),
    ])
    .with_settle_reads(2)
}

// Resolve by BMC address, release, then power back on.
#[test]
fn release_then_power_on_pipeline() {
    let sim = rack();
    let target = resolve_by_hostname_or_power_address(
        &sim,
        &Query::new().power_address("10.20.0.11"),
    )
    .unwrap();
    assert_eq!(target.system_id, "y3b3x3");

    let released = reconcile(&sim, &target, DesiredState::Ready, &quick(), &CancelToken::new())
        .unwrap();
    assert!(released.changed);
    assert_eq!(released.state.status, NodeStatus::Ready);
    assert_eq!(released.state.power, PowerState::Off);

    let on = reconcile(&sim, &target, DesiredState::PowerOn, &quick(), &CancelToken::new())
        .unwrap();
    assert!(on.changed);
    assert_eq!(on.state.power, PowerState::On);
    assert_eq!(sim.mutation_count(), 2);
}

#[test]
fn repeated_reconcile_is_idempotent() {
    let sim = rack();
    let target = resolve_by_hostname_or_id(&sim, &Query::new().hostname("server2")).unwrap();
    let first = reconcile(&sim, &target, DesiredState::PowerOn, &quick(), &CancelToken::new())
        .unwrap();
    assert!(first.changed);
    let mutations = sim.mutation_count();

    for _ in 0..3 {
        let again = reconcile(&sim, &target, DesiredState::PowerOn, &quick(), &CancelToken::new())
            .unwrap();
        assert!(!again.changed);
    }
    assert_eq!(sim.mutation_count(), mutations);
}

#[test]
fn new_machine_cannot_be_released() {
    let sim = rack();
    let target = resolve_by_hostname_or_id(&sim, &Query::new().hostname("fresh")).unwrap();
    let err = reconcile(&sim, &target, DesiredState::Ready, &quick(), &CancelToken::new())
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_state_transition");
    assert!(!err.is_retriable());
    assert_eq!(sim.mutation_count(), 0);
}

#[test]
fn rename_by_system_id() {
    let sim = rack();
    let target = resolve_by_hostname_or_id(&sim, &Query::new().system_id("k8p2a1")).unwrap();
    let change = set_hostname(&sim, &target, "db01").unwrap();
    assert!(change.changed);
    assert_eq!(change.original_hostname, "server2");

    let renamed = resolve_by_hostname_or_id(&sim, &Query::new().hostname("db01")).unwrap();
    assert_eq!(renamed.system_id, "k8p2a1");
    assert!(matches!(
        resolve_by_hostname_or_id(&sim, &Query::new().hostname("server2")),
        Err(CoreError::NotFound(_))
    ));
}

#[test]
fn timeout_is_retriable_and_keeps_last_state() {
    let sim = rack().with_outcome(TransitionOutcome::Never);
    let target = resolve_by_hostname_or_id(&sim, &Query::new().hostname("server1")).unwrap();
    let opts = ReconcileOptions {
        timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(10),
    };
    let err = reconcile(&sim, &target, DesiredState::Ready, &opts, &CancelToken::new())
        .unwrap_err();
    assert!(err.is_retriable());
    match err {
        CoreError::ReconciliationTimeout { last, .. } => {
            assert_eq!(last.status, NodeStatus::Releasing);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

// Independent invocations share one remote without interfering.
#[test]
fn concurrent_reconciles_on_distinct_machines() {
    let sim = Arc::new(rack());
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [("server1", DesiredState::PowerOff), ("server2", DesiredState::PowerOn)]
        .into_iter()
        .map(|(hostname, desired)| {
            let sim = Arc::clone(&sim);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let api: &dyn MaasApi = sim.as_ref();
                let target =
                    resolve_by_hostname_or_id(api, &Query::new().hostname(hostname)).unwrap();
                barrier.wait();
                reconcile(api, &target, desired, &quick(), &CancelToken::new()).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().changed);
    }
    assert_eq!(sim.machine("y3b3x3").unwrap().power, PowerState::Off);
    assert_eq!(sim.machine("k8p2a1").unwrap().power, PowerState::On);
    assert_eq!(sim.mutation_count(), 2);
}
