use crate::concurrency::CancelToken;
use crate::lifecycle::{is_terminal_failure, validate_transition, verb_for, DesiredState};
use crate::query::MachineRef;
use crate::CoreError;
use maasops_client::{MaasApi, MachineState, Verb};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Upper bound on the wait after the transition was requested.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciled {
    pub changed: bool,
    pub system_id: String,
    pub desired: DesiredState,
    pub original: MachineState,
    pub state: MachineState,
    pub polls: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// What reconciling a machine would do, computed from a fresh read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub system_id: String,
    pub desired: DesiredState,
    pub original: MachineState,
    /// `None` when the machine is already in the desired state.
    pub verb: Option<Verb>,
}

impl Plan {
    pub fn changes(&self) -> bool {
        self.verb.is_some()
    }
}

/// Read the machine and decide which verb, if any, reaches `desired`.
/// Never mutates the remote.
pub fn plan(
    api: &dyn MaasApi,
    machine: &MachineRef,
    desired: DesiredState,
) -> Result<Plan, CoreError> {
    let system_id = machine.system_id.as_str();
    let original = api.get_machine(system_id)?.state();

    let verb = if desired.is_satisfied_by(&original) {
        debug!("machine {system_id} already {desired} ({original})");
        None
    } else {
        let verb = verb_for(desired).ok_or(CoreError::UnsupportedTransition(desired))?;
        validate_transition(verb, &original, desired)?;
        Some(verb)
    };

    Ok(Plan {
        system_id: system_id.to_owned(),
        desired,
        original,
        verb,
    })
}

/// Drive `machine` to `desired`.
///
/// The current state is always re-read; the state carried by `machine` is
/// only what resolution saw. At most one transition request is issued, after
/// which the machine is polled until it converges, fails, the deadline
/// passes, or `cancel` is tripped.
pub fn reconcile(
    api: &dyn MaasApi,
    machine: &MachineRef,
    desired: DesiredState,
    options: &ReconcileOptions,
    cancel: &CancelToken,
) -> Result<Reconciled, CoreError> {
    let Plan {
        system_id,
        original,
        verb,
        ..
    } = plan(api, machine, desired)?;
    let system_id = system_id.as_str();

    let Some(verb) = verb else {
        return Ok(Reconciled {
            changed: false,
            system_id: system_id.to_owned(),
            desired,
            original,
            state: original,
            polls: 0,
            elapsed: Duration::ZERO,
        });
    };

    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled {
            system_id: system_id.to_owned(),
            last: original,
        });
    }

    info!("requesting {verb} on machine {system_id} ({original})");
    api.request_transition(system_id, verb)?;

    let start = Instant::now();
    let mut last = original;
    let mut polls = 0u32;
    loop {
        let elapsed = start.elapsed();
        if elapsed >= options.timeout {
            warn!("machine {system_id} did not reach {desired} in time (last {last})");
            return Err(CoreError::ReconciliationTimeout {
                system_id: system_id.to_owned(),
                desired,
                last,
                elapsed,
            });
        }

        if !cancel.sleep(options.poll_interval.min(options.timeout - elapsed)) {
            return Err(CoreError::Cancelled {
                system_id: system_id.to_owned(),
                last,
            });
        }

        polls += 1;
        last = api.get_machine(system_id)?.state();
        debug!("poll {polls}: machine {system_id} is {last}");

        if desired.is_satisfied_by(&last) {
            info!("machine {system_id} reached {desired} after {polls} polls");
            return Ok(Reconciled {
                changed: true,
                system_id: system_id.to_owned(),
                desired,
                original,
                state: last,
                polls,
                elapsed: start.elapsed(),
            });
        }
        if is_terminal_failure(verb, &original, &last) {
            warn!("machine {system_id} failed {verb}: {last}");
            return Err(CoreError::RemoteTransitionFailed {
                system_id: system_id.to_owned(),
                state: last,
            });
        }
    }
}
