use crate::CoreError;
use maasops_client::{MachineState, NodeStatus, PowerState, Verb};
use serde::Serialize;
use std::str::FromStr;

/// Target of a reconciliation request.
///
/// `Commissioned` and `Deployed` are recognized so callers get a precise
/// error, but no single verb reaches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DesiredState {
    PowerOn,
    PowerOff,
    Ready,
    Commissioned,
    Deployed,
}

impl DesiredState {
    pub fn is_satisfied_by(self, state: &MachineState) -> bool {
        match self {
            DesiredState::PowerOn => state.power == PowerState::On,
            DesiredState::PowerOff => state.power == PowerState::Off,
            DesiredState::Ready => state.status == NodeStatus::Ready,
            DesiredState::Deployed => state.status == NodeStatus::Deployed,
            // READY is also where a machine sits after release, so it does not
            // prove a commissioning run happened.
            DesiredState::Commissioned => false,
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesiredState::PowerOn => write!(f, "power-on"),
            DesiredState::PowerOff => write!(f, "power-off"),
            DesiredState::Ready => write!(f, "ready"),
            DesiredState::Commissioned => write!(f, "commissioned"),
            DesiredState::Deployed => write!(f, "deployed"),
        }
    }
}

impl FromStr for DesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "power-on" | "on" => Ok(DesiredState::PowerOn),
            "power-off" | "off" => Ok(DesiredState::PowerOff),
            "ready" => Ok(DesiredState::Ready),
            "commissioned" => Ok(DesiredState::Commissioned),
            "deployed" => Ok(DesiredState::Deployed),
            other => Err(format!(
                "unknown state '{other}' (expected power-on, power-off, ready, commissioned, deployed)"
            )),
        }
    }
}

/// The verb whose target is `desired`, if one exists.
pub fn verb_for(desired: DesiredState) -> Option<Verb> {
    match desired {
        DesiredState::PowerOn => Some(Verb::PowerOn),
        DesiredState::PowerOff => Some(Verb::PowerOff),
        DesiredState::Ready => Some(Verb::Release),
        DesiredState::Commissioned | DesiredState::Deployed => None,
    }
}

/// Statuses MAAS accepts a release from.
pub fn is_releasable(status: NodeStatus) -> bool {
    matches!(
        status,
        NodeStatus::Deployed | NodeStatus::Allocated | NodeStatus::Deploying
    ) || status.is_failed()
}

/// Check the verb's source-state precondition against the observed state.
pub fn validate_transition(
    verb: Verb,
    from: &MachineState,
    to: DesiredState,
) -> Result<(), CoreError> {
    let valid = match verb {
        Verb::PowerOn => matches!(from.power, PowerState::Off | PowerState::Unknown),
        Verb::PowerOff => from.power == PowerState::On,
        Verb::Release => is_releasable(from.status),
    };

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidStateTransition {
            verb,
            from: *from,
            to,
        })
    }
}

/// Whether `observed` means the transition started from `initial` has failed
/// for good. Statuses the machine was already in do not count, so releasing a
/// `FAILED_DEPLOYMENT` machine is not aborted on the first poll.
pub fn is_terminal_failure(verb: Verb, initial: &MachineState, observed: &MachineState) -> bool {
    if verb.is_power() && observed.power == PowerState::Error {
        return true;
    }
    let entered = observed.status != initial.status;
    entered && (observed.status == NodeStatus::Broken || observed.status.is_failed())
}
