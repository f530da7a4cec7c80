use crate::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// MAAS node status, carried on the wire as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum NodeStatus {
    New,
    Commissioning,
    FailedCommissioning,
    Missing,
    Ready,
    Reserved,
    Deployed,
    Retired,
    Broken,
    Deploying,
    Allocated,
    FailedDeployment,
    Releasing,
    FailedReleasing,
    DiskErasing,
    FailedDiskErasing,
    RescueMode,
    EnteringRescueMode,
    FailedEnteringRescueMode,
    ExitingRescueMode,
    FailedExitingRescueMode,
    Testing,
    FailedTesting,
    Unknown(i64),
}

impl NodeStatus {
    pub fn code(self) -> i64 {
        match self {
            NodeStatus::New => 0,
            NodeStatus::Commissioning => 1,
            NodeStatus::FailedCommissioning => 2,
            NodeStatus::Missing => 3,
            NodeStatus::Ready => 4,
            NodeStatus::Reserved => 5,
            NodeStatus::Deployed => 6,
            NodeStatus::Retired => 7,
            NodeStatus::Broken => 8,
            NodeStatus::Deploying => 9,
            NodeStatus::Allocated => 10,
            NodeStatus::FailedDeployment => 11,
            NodeStatus::Releasing => 12,
            NodeStatus::FailedReleasing => 13,
            NodeStatus::DiskErasing => 14,
            NodeStatus::FailedDiskErasing => 15,
            NodeStatus::RescueMode => 16,
            NodeStatus::EnteringRescueMode => 17,
            NodeStatus::FailedEnteringRescueMode => 18,
            NodeStatus::ExitingRescueMode => 19,
            NodeStatus::FailedExitingRescueMode => 20,
            NodeStatus::Testing => 21,
            NodeStatus::FailedTesting => 22,
            NodeStatus::Unknown(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeStatus::New => "NEW",
            NodeStatus::Commissioning => "COMMISSIONING",
            NodeStatus::FailedCommissioning => "FAILED_COMMISSIONING",
            NodeStatus::Missing => "MISSING",
            NodeStatus::Ready => "READY",
            NodeStatus::Reserved => "RESERVED",
            NodeStatus::Deployed => "DEPLOYED",
            NodeStatus::Retired => "RETIRED",
            NodeStatus::Broken => "BROKEN",
            NodeStatus::Deploying => "DEPLOYING",
            NodeStatus::Allocated => "ALLOCATED",
            NodeStatus::FailedDeployment => "FAILED_DEPLOYMENT",
            NodeStatus::Releasing => "RELEASING",
            NodeStatus::FailedReleasing => "FAILED_RELEASING",
            NodeStatus::DiskErasing => "DISK_ERASING",
            NodeStatus::FailedDiskErasing => "FAILED_DISK_ERASING",
            NodeStatus::RescueMode => "RESCUE_MODE",
            NodeStatus::EnteringRescueMode => "ENTERING_RESCUE_MODE",
            NodeStatus::FailedEnteringRescueMode => "FAILED_ENTERING_RESCUE_MODE",
            NodeStatus::ExitingRescueMode => "EXITING_RESCUE_MODE",
            NodeStatus::FailedExitingRescueMode => "FAILED_EXITING_RESCUE_MODE",
            NodeStatus::Testing => "TESTING",
            NodeStatus::FailedTesting => "FAILED_TESTING",
            NodeStatus::Unknown(_) => "UNKNOWN",
        }
    }

    /// One of the `FAILED_*` statuses MAAS enters when an action aborts.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            NodeStatus::FailedCommissioning
                | NodeStatus::FailedDeployment
                | NodeStatus::FailedReleasing
                | NodeStatus::FailedDiskErasing
                | NodeStatus::FailedEnteringRescueMode
                | NodeStatus::FailedExitingRescueMode
                | NodeStatus::FailedTesting
        )
    }
}

impl From<i64> for NodeStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => NodeStatus::New,
            1 => NodeStatus::Commissioning,
            2 => NodeStatus::FailedCommissioning,
            3 => NodeStatus::Missing,
            4 => NodeStatus::Ready,
            5 => NodeStatus::Reserved,
            6 => NodeStatus::Deployed,
            7 => NodeStatus::Retired,
            8 => NodeStatus::Broken,
            9 => NodeStatus::Deploying,
            10 => NodeStatus::Allocated,
            11 => NodeStatus::FailedDeployment,
            12 => NodeStatus::Releasing,
            13 => NodeStatus::FailedReleasing,
            14 => NodeStatus::DiskErasing,
            15 => NodeStatus::FailedDiskErasing,
            16 => NodeStatus::RescueMode,
            17 => NodeStatus::EnteringRescueMode,
            18 => NodeStatus::FailedEnteringRescueMode,
            19 => NodeStatus::ExitingRescueMode,
            20 => NodeStatus::FailedExitingRescueMode,
            21 => NodeStatus::Testing,
            22 => NodeStatus::FailedTesting,
            other => NodeStatus::Unknown(other),
        }
    }
}

impl From<NodeStatus> for i64 {
    fn from(status: NodeStatus) -> Self {
        status.code()
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Power state as reported in a machine's `power_state` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    On,
    Off,
    #[default]
    Unknown,
    Error,
}

impl From<String> for PowerState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "on" => PowerState::On,
            "off" => PowerState::Off,
            "error" => PowerState::Error,
            _ => PowerState::Unknown,
        }
    }
}

impl From<PowerState> for String {
    fn from(state: PowerState) -> Self {
        state.to_string()
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Unknown => write!(f, "unknown"),
            PowerState::Error => write!(f, "error"),
        }
    }
}

/// Observed state of a machine: lifecycle status plus power sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub status: NodeStatus,
    pub power: PowerState,
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (power {})", self.status, self.power)
    }
}

/// Transition verbs exposed by the remote as machine `op=` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    PowerOn,
    PowerOff,
    Release,
}

impl Verb {
    pub fn op(self) -> &'static str {
        match self {
            Verb::PowerOn => "power_on",
            Verb::PowerOff => "power_off",
            Verb::Release => "release",
        }
    }

    pub fn from_op(op: &str) -> Option<Self> {
        match op {
            "power_on" => Some(Verb::PowerOn),
            "power_off" => Some(Verb::PowerOff),
            "release" => Some(Verb::Release),
            _ => None,
        }
    }

    pub fn is_power(self) -> bool {
        matches!(self, Verb::PowerOn | Verb::PowerOff)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.op())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: u64,
    pub name: String,
}

/// The subset of a MAAS machine document the workspace reasons about.
///
/// `raw` keeps the full document as returned by the remote so read-only
/// operations can hand it back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSummary {
    pub system_id: String,
    pub hostname: String,
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub domain: Option<Domain>,
    pub status: NodeStatus,
    #[serde(default)]
    pub status_name: String,
    #[serde(default)]
    pub power_state: PowerState,
    #[serde(default)]
    pub power_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_address: Option<String>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl MachineSummary {
    /// Parse a machine document, keeping the original JSON in `raw`.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ClientError> {
        let mut summary: MachineSummary = serde_json::from_value(value.clone())
            .map_err(|e| ClientError::Serialization(format!("invalid machine document: {e}")))?;
        summary.raw = value;
        Ok(summary)
    }

    pub fn state(&self) -> MachineState {
        MachineState {
            status: self.status,
            power: self.power_state,
        }
    }

    pub fn domain_name(&self) -> Option<&str> {
        self.domain.as_ref().map(|d| d.name.as_str())
    }
}

/// Power driver parameters, keyed as MAAS reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerParameters(pub BTreeMap<String, serde_json::Value>);

impl PowerParameters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    /// The BMC address. Drivers name the key differently (`power_address`,
    /// `power_address_ipmi`, ...), so the exact key wins and otherwise the
    /// first key containing `power_address` is used.
    pub fn power_address(&self) -> Option<&str> {
        if let Some(addr) = self.0.get("power_address").and_then(serde_json::Value::as_str) {
            return Some(addr);
        }
        self.0
            .iter()
            .filter(|(k, _)| k.contains("power_address"))
            .find_map(|(_, v)| v.as_str())
    }
}

/// Filter for [`MaasApi::list_machines`](crate::MaasApi::list_machines).
/// All set fields must match exactly; an empty filter lists every machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineFilter {
    pub hostname: Option<String>,
    pub power_address: Option<String>,
}

impl MachineFilter {
    pub fn by_hostname(hostname: &str) -> Self {
        Self {
            hostname: Some(hostname.to_owned()),
            power_address: None,
        }
    }

    pub fn by_power_address(address: &str) -> Self {
        Self {
            hostname: None,
            power_address: Some(address.to_owned()),
        }
    }

    /// Exact-string match of `summary` (and its BMC address, if known) against the filter.
    pub fn matches(&self, summary: &MachineSummary, power_address: Option<&str>) -> bool {
        if let Some(ref hostname) = self.hostname {
            if summary.hostname != *hostname {
                return false;
            }
        }
        if let Some(ref address) = self.power_address {
            if power_address != Some(address.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_json() -> serde_json::Value {
        serde_json::json!({
            "system_id": "y3b3x3",
            "hostname": "server1",
            "fqdn": "server1.maas",
            "domain": {"id": 0, "name": "maas", "authoritative": true},
            "status": 6,
            "status_name": "Deployed",
            "power_state": "on",
            "power_type": "ipmi",
            "cpu_count": 48
        })
    }

    #[test]
    fn node_status_codes_roundtrip() {
        for code in 0..=22 {
            assert_eq!(NodeStatus::from(code).code(), code);
        }
        assert_eq!(NodeStatus::from(6), NodeStatus::Deployed);
        assert_eq!(NodeStatus::from(99), NodeStatus::Unknown(99));
    }

    #[test]
    fn node_status_names() {
        assert_eq!(NodeStatus::Ready.to_string(), "READY");
        assert_eq!(
            NodeStatus::FailedCommissioning.to_string(),
            "FAILED_COMMISSIONING"
        );
        assert_eq!(NodeStatus::Unknown(42).to_string(), "UNKNOWN");
    }

    #[test]
    fn failed_statuses() {
        assert!(NodeStatus::FailedDeployment.is_failed());
        assert!(NodeStatus::FailedTesting.is_failed());
        assert!(!NodeStatus::Broken.is_failed());
        assert!(!NodeStatus::Deployed.is_failed());
    }

    #[test]
    fn power_state_parses_unknown_strings() {
        assert_eq!(PowerState::from("on".to_owned()), PowerState::On);
        assert_eq!(PowerState::from("off".to_owned()), PowerState::Off);
        assert_eq!(PowerState::from("error".to_owned()), PowerState::Error);
        assert_eq!(PowerState::from("bogus".to_owned()), PowerState::Unknown);
    }

    #[test]
    fn summary_from_value_keeps_raw() {
        let summary = MachineSummary::from_value(machine_json()).unwrap();
        assert_eq!(summary.system_id, "y3b3x3");
        assert_eq!(summary.status, NodeStatus::Deployed);
        assert_eq!(summary.power_state, PowerState::On);
        assert_eq!(summary.domain_name(), Some("maas"));
        assert_eq!(summary.raw["cpu_count"], 48);
        assert_eq!(
            summary.state(),
            MachineState {
                status: NodeStatus::Deployed,
                power: PowerState::On
            }
        );
    }

    #[test]
    fn summary_missing_optional_fields() {
        let summary = MachineSummary::from_value(serde_json::json!({
            "system_id": "abc",
            "hostname": "h",
            "status": 4
        }))
        .unwrap();
        assert_eq!(summary.power_state, PowerState::Unknown);
        assert!(summary.domain.is_none());
    }

    #[test]
    fn summary_rejects_missing_system_id() {
        let result = MachineSummary::from_value(serde_json::json!({"hostname": "h", "status": 4}));
        assert!(matches!(result, Err(ClientError::Serialization(_))));
    }

    #[test]
    fn power_address_prefers_exact_key() {
        let params = PowerParameters::new()
            .with("power_address_alt", "10.0.0.9")
            .with("power_address", "10.0.0.1");
        assert_eq!(params.power_address(), Some("10.0.0.1"));

        let params = PowerParameters::new().with("power_address_ipmi", "10.0.0.2");
        assert_eq!(params.power_address(), Some("10.0.0.2"));

        assert_eq!(PowerParameters::new().power_address(), None);
    }

    #[test]
    fn filter_matches_exactly() {
        let summary = MachineSummary::from_value(machine_json()).unwrap();
        assert!(MachineFilter::by_hostname("server1").matches(&summary, None));
        assert!(!MachineFilter::by_hostname("server").matches(&summary, None));
        assert!(MachineFilter::by_power_address("10.0.0.1").matches(&summary, Some("10.0.0.1")));
        assert!(!MachineFilter::by_power_address("10.0.0.1").matches(&summary, Some("10.0.0.10")));
        assert!(MachineFilter::default().matches(&summary, None));
    }

    #[test]
    fn verb_ops() {
        assert_eq!(Verb::PowerOn.op(), "power_on");
        assert_eq!(Verb::from_op("release"), Some(Verb::Release));
        assert_eq!(Verb::from_op("deploy"), None);
        assert!(Verb::PowerOff.is_power());
        assert!(!Verb::Release.is_power());
    }
}
