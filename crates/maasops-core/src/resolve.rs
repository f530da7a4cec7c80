use crate::query::{MachineRef, Query};
use crate::CoreError;
use maasops_client::{ClientError, MaasApi, MachineFilter, MachineSummary};
use tracing::debug;

/// Resolve a query carrying a system ID or a hostname.
///
/// `system_id` takes precedence: it is a point lookup and unique by
/// construction. Hostnames are not unique on the remote, so a hostname
/// matching several machines is reported as ambiguous.
pub fn resolve_by_hostname_or_id(api: &dyn MaasApi, query: &Query) -> Result<MachineRef, CoreError> {
    if let Some(ref system_id) = query.system_id {
        debug!("resolving system_id {system_id}");
        return match api.get_machine(system_id) {
            Ok(summary) => Ok(MachineRef::from_summary(&summary)),
            Err(ClientError::NotFound(_)) => {
                Err(CoreError::NotFound(format!("system_id '{system_id}'")))
            }
            Err(e) => Err(e.into()),
        };
    }
    if let Some(ref hostname) = query.hostname {
        return resolve_hostname(api, hostname);
    }
    Err(CoreError::InvalidQuery(
        "one of system_id or hostname is required".to_owned(),
    ))
}

/// Resolve a query carrying a hostname or a power (BMC) address.
///
/// The hostname wins if both are present. Power addresses are compared as
/// exact strings; two machines sharing a BMC entry are reported as ambiguous.
pub fn resolve_by_hostname_or_power_address(
    api: &dyn MaasApi,
    query: &Query,
) -> Result<MachineRef, CoreError> {
    if let Some(ref hostname) = query.hostname {
        return resolve_hostname(api, hostname);
    }
    if let Some(ref address) = query.power_address {
        debug!("resolving power address {address}");
        let candidates = api.list_machines(&MachineFilter::by_power_address(address))?;
        let mut machine = exactly_one(&format!("power_address '{address}'"), &candidates)?;
        machine.power_address = Some(address.clone());
        return Ok(machine);
    }
    Err(CoreError::InvalidQuery(
        "one of power_address or hostname is required".to_owned(),
    ))
}

fn resolve_hostname(api: &dyn MaasApi, hostname: &str) -> Result<MachineRef, CoreError> {
    debug!("resolving hostname {hostname}");
    let candidates = api.list_machines(&MachineFilter::by_hostname(hostname))?;
    exactly_one(&format!("hostname '{hostname}'"), &candidates)
}

fn exactly_one(what: &str, candidates: &[MachineSummary]) -> Result<MachineRef, CoreError> {
    match candidates {
        [] => Err(CoreError::NotFound(what.to_owned())),
        [only] => Ok(MachineRef::from_summary(only)),
        many => Err(CoreError::Ambiguous {
            query: what.to_owned(),
            candidates: many.iter().map(MachineRef::from_summary).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{SimMachine, SimulatedMaas};
    use maasops_client::{NodeStatus, PowerState};

    fn inventory() -> SimulatedMaas {
        SimulatedMaas::new(vec![
            SimMachine::new("y3b3x3", "server1")
                .with_status(NodeStatus::Deployed)
                .with_power(PowerState::On)
                .with_power_address("10.0.0.1"),
            SimMachine::new("k8p2a1", "server2").with_power_address("10.0.0.2"),
            SimMachine::new("dup001", "twin").with_power_address("10.0.0.9"),
            SimMachine::new("dup002", "twin").with_power_address("10.0.0.9"),
            SimMachine::new("dup003", "twin"),
        ])
    }

    #[test]
    fn empty_query_is_invalid() {
        let sim = inventory();
        assert!(matches!(
            resolve_by_hostname_or_id(&sim, &Query::new()),
            Err(CoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            resolve_by_hostname_or_power_address(&sim, &Query::new()),
            Err(CoreError::InvalidQuery(_))
        ));
        assert_eq!(sim.read_count(), 0);
    }

    #[test]
    fn wrong_fields_are_invalid() {
        let sim = inventory();
        let q = Query::new().power_address("10.0.0.1");
        assert!(matches!(
            resolve_by_hostname_or_id(&sim, &q),
            Err(CoreError::InvalidQuery(_))
        ));
        let q = Query::new().system_id("y3b3x3");
        assert!(matches!(
            resolve_by_hostname_or_power_address(&sim, &q),
            Err(CoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn resolves_unique_hostname() {
        let sim = inventory();
        let r = resolve_by_hostname_or_id(&sim, &Query::new().hostname("server1")).unwrap();
        assert_eq!(r.system_id, "y3b3x3");
        assert_eq!(r.hostname, "server1");
        assert_eq!(r.state.status, NodeStatus::Deployed);
    }

    #[test]
    fn resolves_system_id() {
        let sim = inventory();
        let r = resolve_by_hostname_or_id(&sim, &Query::new().system_id("k8p2a1")).unwrap();
        assert_eq!(r.hostname, "server2");
    }

    #[test]
    fn system_id_takes_precedence() {
        let sim = inventory();
        let q = Query::new().system_id("k8p2a1").hostname("server1");
        let r = resolve_by_hostname_or_id(&sim, &q).unwrap();
        assert_eq!(r.system_id, "k8p2a1");
    }

    #[test]
    fn unknown_system_id_is_not_found() {
        let sim = inventory();
        let err = resolve_by_hostname_or_id(&sim, &Query::new().system_id("nope")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(ref what) if what.contains("nope")));
    }

    #[test]
    fn unknown_hostname_is_not_found() {
        let sim = inventory();
        assert!(matches!(
            resolve_by_hostname_or_id(&sim, &Query::new().hostname("server")),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_hostname_is_ambiguous_with_all_candidates() {
        let sim = inventory();
        let err = resolve_by_hostname_or_id(&sim, &Query::new().hostname("twin")).unwrap_err();
        match err {
            CoreError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 3);
                let ids: Vec<_> = candidates.iter().map(|c| c.system_id.as_str()).collect();
                assert_eq!(ids, ["dup001", "dup002", "dup003"]);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn resolves_power_address() {
        let sim = inventory();
        let q = Query::new().power_address("10.0.0.2");
        let r = resolve_by_hostname_or_power_address(&sim, &q).unwrap();
        assert_eq!(r.system_id, "k8p2a1");
        assert_eq!(r.power_address.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn power_address_is_exact() {
        let sim = inventory();
        let q = Query::new().power_address("10.0.0.");
        assert!(matches!(
            resolve_by_hostname_or_power_address(&sim, &q),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn shared_bmc_is_ambiguous() {
        let sim = inventory();
        let q = Query::new().power_address("10.0.0.9");
        match resolve_by_hostname_or_power_address(&sim, &q) {
            Err(CoreError::Ambiguous { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn hostname_wins_over_power_address() {
        let sim = inventory();
        let q = Query::new().hostname("server1").power_address("10.0.0.2");
        let r = resolve_by_hostname_or_power_address(&sim, &q).unwrap();
        assert_eq!(r.system_id, "y3b3x3");
    }

    #[test]
    fn resolution_never_mutates() {
        let sim = inventory();
        let _ = resolve_by_hostname_or_id(&sim, &Query::new().hostname("twin"));
        let _ = resolve_by_hostname_or_power_address(&sim, &Query::new().power_address("10.0.0.1"));
        assert_eq!(sim.mutation_count(), 0);
    }

    #[test]
    fn n_matches_report_n_candidates() {
        for n in 2..6 {
            let machines = (0..n)
                .map(|i| SimMachine::new(&format!("id{i:03}"), "dup"))
                .collect();
            let sim = SimulatedMaas::new(machines);
            match resolve_by_hostname_or_id(&sim, &Query::new().hostname("dup")) {
                Err(CoreError::Ambiguous { candidates, .. }) => assert_eq!(candidates.len(), n),
                other => panic!("expected Ambiguous, got {other:?}"),
            }
        }
    }
}
