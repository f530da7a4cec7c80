//! Machine identity resolution and state reconciliation for MAAS.
//!
//! This crate turns loosely-specified machine queries (hostname, system ID,
//! BMC address) into exactly one remote machine, and drives that machine to a
//! desired state by issuing a transition and polling until the remote reports
//! convergence, a terminal failure, or the deadline passes. It also provides
//! cooperative cancellation for the polling loop and an in-memory simulated
//! MAAS for tests.

pub mod concurrency;
pub mod hostname;
pub mod lifecycle;
pub mod query;
pub mod reconcile;
pub mod resolve;
pub mod simulate;

pub use concurrency::{install_signal_handler, process_token, CancelToken};
pub use hostname::{plan_hostname_change, set_hostname, set_hostname_and_domain, HostnameChange};
pub use lifecycle::{validate_transition, verb_for, DesiredState};
pub use query::{MachineRef, Query};
pub use reconcile::{plan, reconcile, Plan, ReconcileOptions, Reconciled};
pub use resolve::{resolve_by_hostname_or_id, resolve_by_hostname_or_power_address};
pub use simulate::{SimMachine, SimulatedMaas, TransitionOutcome};

use maasops_client::{ClientError, MachineState, Verb};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("no machine matching {0}")]
    NotFound(String),
    #[error("{query} is ambiguous: matches {count} machines ({ids})", count = .candidates.len(), ids = join_ids(.candidates))]
    Ambiguous {
        query: String,
        candidates: Vec<MachineRef>,
    },
    #[error("no transition verb reaches '{0}' directly")]
    UnsupportedTransition(DesiredState),
    #[error("cannot {verb} towards '{to}' from {from}")]
    InvalidStateTransition {
        verb: Verb,
        from: MachineState,
        to: DesiredState,
    },
    #[error("machine {system_id} entered {state} during transition")]
    RemoteTransitionFailed {
        system_id: String,
        state: MachineState,
    },
    #[error("machine {system_id} did not reach '{desired}' within {}s (last observed {last})", .elapsed.as_secs())]
    ReconciliationTimeout {
        system_id: String,
        desired: DesiredState,
        last: MachineState,
        elapsed: Duration,
    },
    #[error("cancelled while waiting for machine {system_id} (last observed {last})")]
    Cancelled {
        system_id: String,
        last: MachineState,
    },
    #[error("request rejected by remote: {0}")]
    Rejected(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(#[source] ClientError),
}

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(what) => CoreError::NotFound(what),
            ClientError::Rejected(reason) => CoreError::Rejected(reason),
            ClientError::Config(msg) => CoreError::Config(msg),
            other => CoreError::Transport(other),
        }
    }
}

impl CoreError {
    /// Stable snake_case classification for callers and structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidQuery(_) => "invalid_query",
            CoreError::NotFound(_) => "not_found",
            CoreError::Ambiguous { .. } => "ambiguous",
            CoreError::UnsupportedTransition(_) => "unsupported_transition",
            CoreError::InvalidStateTransition { .. } => "invalid_state_transition",
            CoreError::RemoteTransitionFailed { .. } => "remote_transition_failed",
            CoreError::ReconciliationTimeout { .. } => "reconciliation_timeout",
            CoreError::Cancelled { .. } => "cancelled",
            CoreError::Rejected(_) => "rejected",
            CoreError::Config(_) => "config",
            CoreError::Transport(_) => "transport",
        }
    }

    /// Whether repeating the same call unchanged could succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CoreError::ReconciliationTimeout { .. }
                | CoreError::Cancelled { .. }
                | CoreError::Transport(_)
        )
    }
}

fn join_ids(candidates: &[MachineRef]) -> String {
    candidates
        .iter()
        .map(|c| c.system_id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
