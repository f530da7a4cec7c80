//! In-memory MAAS used by tests and by the simulator server.
//!
//! Transitions are asynchronous like on a real MAAS: a request is accepted
//! immediately and the machine reaches its target state only after a
//! configurable number of `get_machine` reads.

use maasops_client::{
    ClientError, Domain, MaasApi, MachineFilter, MachineSummary, NodeStatus, PowerParameters,
    PowerState, Verb,
};
use crate::lifecycle::is_releasable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

fn default_domain() -> Domain {
    Domain {
        id: 0,
        name: "maas".to_owned(),
    }
}

fn default_status() -> NodeStatus {
    NodeStatus::Ready
}

fn default_power() -> PowerState {
    PowerState::Off
}

fn default_power_type() -> String {
    "ipmi".to_owned()
}

/// One simulated machine, as seeded into the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimMachine {
    pub system_id: String,
    pub hostname: String,
    #[serde(default = "default_domain")]
    pub domain: Domain,
    #[serde(default = "default_status")]
    pub status: NodeStatus,
    #[serde(default = "default_power")]
    pub power: PowerState,
    #[serde(default = "default_power_type")]
    pub power_type: String,
    #[serde(default)]
    pub power_address: Option<String>,
}

impl SimMachine {
    pub fn new(system_id: &str, hostname: &str) -> Self {
        Self {
            system_id: system_id.to_owned(),
            hostname: hostname.to_owned(),
            domain: default_domain(),
            status: default_status(),
            power: default_power(),
            power_type: default_power_type(),
            power_address: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_power(mut self, power: PowerState) -> Self {
        self.power = power;
        self
    }

    #[must_use]
    pub fn with_power_address(mut self, address: &str) -> Self {
        self.power_address = Some(address.to_owned());
        self
    }

    /// The machine document as MAAS would return it.
    pub fn to_summary(&self) -> MachineSummary {
        let raw = serde_json::json!({
            "system_id": self.system_id,
            "hostname": self.hostname,
            "fqdn": format!("{}.{}", self.hostname, self.domain.name),
            "domain": {"id": self.domain.id, "name": self.domain.name},
            "status": self.status.code(),
            "status_name": self.status.name(),
            "power_state": self.power.to_string(),
            "power_type": self.power_type,
            "resource_uri": format!("/MAAS/api/2.0/machines/{}/", self.system_id),
        });
        MachineSummary {
            system_id: self.system_id.clone(),
            hostname: self.hostname.clone(),
            fqdn: format!("{}.{}", self.hostname, self.domain.name),
            domain: Some(self.domain.clone()),
            status: self.status,
            status_name: self.status.name().to_owned(),
            power_state: self.power,
            power_type: self.power_type.clone(),
            power_address: None,
            raw,
        }
    }
}

/// How the simulated remote completes accepted transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Reach the verb's target after the configured number of reads.
    Converge,
    /// Stay in the pre-transition state forever.
    Never,
    /// Release ends in the given status; power verbs end in power `error`.
    Fail(NodeStatus),
    /// Refuse every transition request.
    Reject,
}

#[derive(Debug)]
struct Pending {
    verb: Verb,
    remaining: u32,
}

#[derive(Debug)]
struct Inner {
    machines: BTreeMap<String, SimMachine>,
    domains: Vec<Domain>,
    pending: HashMap<String, Pending>,
    outcome: TransitionOutcome,
    settle_reads: u32,
    reads: usize,
    mutations: usize,
    transitions: Vec<(String, Verb)>,
}

/// A thread-safe in-memory [`MaasApi`].
#[derive(Debug)]
pub struct SimulatedMaas {
    inner: Mutex<Inner>,
}

impl SimulatedMaas {
    pub fn new(machines: Vec<SimMachine>) -> Self {
        let machines = machines
            .into_iter()
            .map(|m| (m.system_id.clone(), m))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                machines,
                domains: vec![default_domain()],
                pending: HashMap::new(),
                outcome: TransitionOutcome::Converge,
                settle_reads: 1,
                reads: 0,
                mutations: 0,
                transitions: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the inventory from the others.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_domains(self, domains: Vec<Domain>) -> Self {
        self.lock().domains = domains;
        self
    }

    /// Accepted transitions complete on the `reads`-th `get_machine` call.
    /// Zero completes them synchronously.
    #[must_use]
    pub fn with_settle_reads(self, reads: u32) -> Self {
        self.lock().settle_reads = reads;
        self
    }

    #[must_use]
    pub fn with_outcome(self, outcome: TransitionOutcome) -> Self {
        self.set_outcome(outcome);
        self
    }

    pub fn set_outcome(&self, outcome: TransitionOutcome) {
        self.lock().outcome = outcome;
    }

    pub fn machine(&self, system_id: &str) -> Option<SimMachine> {
        self.lock().machines.get(system_id).cloned()
    }

    /// Number of read calls served.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Number of mutating calls accepted.
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    /// Accepted transitions, in order.
    pub fn transitions(&self) -> Vec<(String, Verb)> {
        self.lock().transitions.clone()
    }

    fn not_found(system_id: &str) -> ClientError {
        ClientError::NotFound(format!("machine {system_id}"))
    }
}

impl Inner {
    fn settle(&mut self, system_id: &str, verb: Verb) {
        let outcome = self.outcome;
        let Some(machine) = self.machines.get_mut(system_id) else {
            return;
        };
        match (outcome, verb) {
            (TransitionOutcome::Converge, Verb::PowerOn) => machine.power = PowerState::On,
            (TransitionOutcome::Converge, Verb::PowerOff) => machine.power = PowerState::Off,
            (TransitionOutcome::Converge, Verb::Release) => {
                machine.status = NodeStatus::Ready;
                machine.power = PowerState::Off;
            }
            (TransitionOutcome::Fail(status), Verb::Release) => machine.status = status,
            (TransitionOutcome::Fail(_), _) => machine.power = PowerState::Error,
            (TransitionOutcome::Never | TransitionOutcome::Reject, _) => {}
        }
    }

    fn advance(&mut self, system_id: &str) {
        if self.outcome == TransitionOutcome::Never {
            return;
        }
        let done = match self.pending.get_mut(system_id) {
            Some(p) => {
                p.remaining = p.remaining.saturating_sub(1);
                (p.remaining == 0).then_some(p.verb)
            }
            None => None,
        };
        if let Some(verb) = done {
            self.pending.remove(system_id);
            self.settle(system_id, verb);
        }
    }
}

impl MaasApi for SimulatedMaas {
    fn list_machines(&self, filter: &MachineFilter) -> Result<Vec<MachineSummary>, ClientError> {
        let mut inner = self.lock();
        inner.reads += 1;
        Ok(inner
            .machines
            .values()
            .filter(|m| filter.matches(&m.to_summary(), m.power_address.as_deref()))
            .map(|m| {
                let mut summary = m.to_summary();
                summary.power_address.clone_from(&m.power_address);
                summary
            })
            .collect())
    }

    fn get_machine(&self, system_id: &str) -> Result<MachineSummary, ClientError> {
        let mut inner = self.lock();
        inner.reads += 1;
        inner.advance(system_id);
        inner
            .machines
            .get(system_id)
            .map(SimMachine::to_summary)
            .ok_or_else(|| Self::not_found(system_id))
    }

    fn power_parameters(&self, system_id: &str) -> Result<PowerParameters, ClientError> {
        let mut inner = self.lock();
        inner.reads += 1;
        let machine = inner
            .machines
            .get(system_id)
            .ok_or_else(|| Self::not_found(system_id))?;
        let mut params = PowerParameters::new().with("power_user", "admin");
        if let Some(ref address) = machine.power_address {
            params = params.with("power_address", address.as_str());
        }
        Ok(params)
    }

    fn request_transition(&self, system_id: &str, verb: Verb) -> Result<(), ClientError> {
        let mut inner = self.lock();
        let status = inner
            .machines
            .get(system_id)
            .ok_or_else(|| Self::not_found(system_id))?
            .status;
        if inner.outcome == TransitionOutcome::Reject {
            return Err(ClientError::Rejected(format!(
                "{verb} refused for machine {system_id}"
            )));
        }
        if verb == Verb::Release && !is_releasable(status) {
            return Err(ClientError::Rejected(format!(
                "machine {system_id} cannot be released from {status}"
            )));
        }

        inner.mutations += 1;
        inner.transitions.push((system_id.to_owned(), verb));
        if verb == Verb::Release {
            if let Some(m) = inner.machines.get_mut(system_id) {
                m.status = NodeStatus::Releasing;
            }
        }
        let remaining = inner.settle_reads;
        if remaining == 0 {
            inner.settle(system_id, verb);
        } else {
            inner
                .pending
                .insert(system_id.to_owned(), Pending { verb, remaining });
        }
        Ok(())
    }

    fn set_hostname(&self, system_id: &str, hostname: &str) -> Result<(), ClientError> {
        let mut inner = self.lock();
        let machine = inner
            .machines
            .get_mut(system_id)
            .ok_or_else(|| Self::not_found(system_id))?;
        hostname.clone_into(&mut machine.hostname);
        inner.mutations += 1;
        Ok(())
    }

    fn list_domains(&self) -> Result<Vec<Domain>, ClientError> {
        let mut inner = self.lock();
        inner.reads += 1;
        Ok(inner.domains.clone())
    }

    fn set_domain(&self, system_id: &str, domain_id: u64) -> Result<(), ClientError> {
        let mut inner = self.lock();
        let domain = inner
            .domains
            .iter()
            .find(|d| d.id == domain_id)
            .cloned()
            .ok_or_else(|| ClientError::Rejected(format!("unknown domain id {domain_id}")))?;
        let machine = inner
            .machines
            .get_mut(system_id)
            .ok_or_else(|| Self::not_found(system_id))?;
        machine.domain = domain;
        inner.mutations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> SimulatedMaas {
        SimulatedMaas::new(vec![SimMachine::new("y3b3x3", "server1")
            .with_status(NodeStatus::Deployed)
            .with_power(PowerState::On)
            .with_power_address("10.0.0.1")])
    }

    #[test]
    fn summary_document_shape() {
        let s = SimMachine::new("abc", "node").to_summary();
        assert_eq!(s.raw["status"], 4);
        assert_eq!(s.raw["status_name"], "READY");
        assert_eq!(s.raw["power_state"], "off");
        assert_eq!(s.fqdn, "node.maas");
        assert_eq!(MachineSummary::from_value(s.raw.clone()).unwrap().system_id, "abc");
    }

    #[test]
    fn transition_settles_after_configured_reads() {
        let sim = sim().with_settle_reads(3);
        sim.request_transition("y3b3x3", Verb::PowerOff).unwrap();
        assert_eq!(sim.get_machine("y3b3x3").unwrap().power_state, PowerState::On);
        assert_eq!(sim.get_machine("y3b3x3").unwrap().power_state, PowerState::On);
        assert_eq!(sim.get_machine("y3b3x3").unwrap().power_state, PowerState::Off);
        assert_eq!(sim.mutation_count(), 1);
    }

    #[test]
    fn release_passes_through_releasing() {
        let sim = sim().with_settle_reads(2);
        sim.request_transition("y3b3x3", Verb::Release).unwrap();
        assert_eq!(sim.get_machine("y3b3x3").unwrap().status, NodeStatus::Releasing);
        let done = sim.get_machine("y3b3x3").unwrap();
        assert_eq!(done.status, NodeStatus::Ready);
        assert_eq!(done.power_state, PowerState::Off);
    }

    #[test]
    fn zero_settle_is_synchronous() {
        let sim = sim().with_settle_reads(0);
        sim.request_transition("y3b3x3", Verb::PowerOff).unwrap();
        assert_eq!(sim.machine("y3b3x3").unwrap().power, PowerState::Off);
    }

    #[test]
    fn never_outcome_keeps_state() {
        let sim = sim().with_outcome(TransitionOutcome::Never);
        sim.request_transition("y3b3x3", Verb::PowerOff).unwrap();
        for _ in 0..5 {
            assert_eq!(sim.get_machine("y3b3x3").unwrap().power_state, PowerState::On);
        }
    }

    #[test]
    fn fail_outcome() {
        let sim = sim().with_outcome(TransitionOutcome::Fail(NodeStatus::FailedReleasing));
        sim.request_transition("y3b3x3", Verb::Release).unwrap();
        assert_eq!(
            sim.get_machine("y3b3x3").unwrap().status,
            NodeStatus::FailedReleasing
        );
    }

    #[test]
    fn reject_outcome_does_not_mutate() {
        let sim = sim().with_outcome(TransitionOutcome::Reject);
        assert!(matches!(
            sim.request_transition("y3b3x3", Verb::PowerOff),
            Err(ClientError::Rejected(_))
        ));
        assert_eq!(sim.mutation_count(), 0);
    }

    #[test]
    fn release_from_new_is_rejected_remotely() {
        let sim = SimulatedMaas::new(vec![SimMachine::new("n1", "fresh").with_status(NodeStatus::New)]);
        assert!(matches!(
            sim.request_transition("n1", Verb::Release),
            Err(ClientError::Rejected(_))
        ));
    }

    #[test]
    fn unknown_machine_is_not_found() {
        let sim = sim();
        assert!(matches!(sim.get_machine("zzz"), Err(ClientError::NotFound(_))));
        assert!(matches!(
            sim.request_transition("zzz", Verb::PowerOn),
            Err(ClientError::NotFound(_))
        ));
        assert!(matches!(sim.set_hostname("zzz", "x"), Err(ClientError::NotFound(_))));
    }

    #[test]
    fn power_parameters_report_address() {
        let sim = sim();
        let params = sim.power_parameters("y3b3x3").unwrap();
        assert_eq!(params.power_address(), Some("10.0.0.1"));
    }

    #[test]
    fn set_domain_requires_known_domain() {
        let sim = sim().with_domains(vec![
            default_domain(),
            Domain {
                id: 3,
                name: "lab".to_owned(),
            },
        ]);
        assert!(sim.set_domain("y3b3x3", 9).is_err());
        sim.set_domain("y3b3x3", 3).unwrap();
        assert_eq!(sim.machine("y3b3x3").unwrap().domain.name, "lab");
    }

    #[test]
    fn inventory_deserializes_with_defaults() {
        let m: SimMachine =
            serde_json::from_str(r#"{"system_id":"a1","hostname":"h","status":6,"power":"on"}"#)
                .unwrap();
        assert_eq!(m.status, NodeStatus::Deployed);
        assert_eq!(m.power, PowerState::On);
        assert_eq!(m.domain.name, "maas");
        assert!(m.power_address.is_none());
    }
}
