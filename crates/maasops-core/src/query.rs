use maasops_client::{MachineState, MachineSummary};
use serde::Serialize;

/// Identifying information supplied by the caller.
///
/// Empty or whitespace-only values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub hostname: Option<String>,
    pub system_id: Option<String>,
    pub power_address: Option<String>,
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from optional front-end parameters.
    pub fn from_parts(
        hostname: Option<&str>,
        system_id: Option<&str>,
        power_address: Option<&str>,
    ) -> Self {
        Self {
            hostname: present(hostname),
            system_id: present(system_id),
            power_address: present(power_address),
        }
    }

    #[must_use]
    pub fn hostname(mut self, hostname: &str) -> Self {
        self.hostname = present(Some(hostname));
        self
    }

    #[must_use]
    pub fn system_id(mut self, system_id: &str) -> Self {
        self.system_id = present(Some(system_id));
        self
    }

    #[must_use]
    pub fn power_address(mut self, address: &str) -> Self {
        self.power_address = present(Some(address));
        self
    }
}

/// A resolved machine: its system identifier plus what was observed at
/// resolution time. Lives for one invocation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineRef {
    pub system_id: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_address: Option<String>,
    pub state: MachineState,
}

impl MachineRef {
    pub fn new(system_id: &str, hostname: &str, state: MachineState) -> Self {
        Self {
            system_id: system_id.to_owned(),
            hostname: hostname.to_owned(),
            power_address: None,
            state,
        }
    }

    pub fn from_summary(summary: &MachineSummary) -> Self {
        Self {
            system_id: summary.system_id.clone(),
            hostname: summary.hostname.clone(),
            power_address: summary.power_address.clone(),
            state: summary.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maasops_client::{NodeStatus, PowerState};

    #[test]
    fn blank_fields_are_absent() {
        let q = Query::from_parts(Some(""), Some("   "), None);
        assert_eq!(q, Query::new());
        let q = Query::new().hostname(" server1 ");
        assert_eq!(q.hostname.as_deref(), Some("server1"));
    }

    #[test]
    fn builder_sets_fields() {
        let q = Query::new().system_id("y3b3x3").power_address("10.0.0.1");
        assert_eq!(q.system_id.as_deref(), Some("y3b3x3"));
        assert_eq!(q.power_address.as_deref(), Some("10.0.0.1"));
        assert!(q.hostname.is_none());
    }

    #[test]
    fn machine_ref_from_summary() {
        let summary = MachineSummary::from_value(serde_json::json!({
            "system_id": "y3b3x3",
            "hostname": "server1",
            "status": 6,
            "power_state": "on"
        }))
        .unwrap();
        let r = MachineRef::from_summary(&summary);
        assert_eq!(r.system_id, "y3b3x3");
        assert_eq!(r.hostname, "server1");
        assert_eq!(
            r.state,
            MachineState {
                status: NodeStatus::Deployed,
                power: PowerState::On
            }
        );
    }
}
