//! Client-side model and transport for the MAAS machine API.
//!
//! This crate provides the wire types of MAAS machines (status codes, power
//! state, power parameters), the [`MaasApi`] trait describing the handful of
//! remote calls the rest of the workspace needs, configuration of the service
//! endpoint and API key, and [`HttpClient`], a blocking implementation of the
//! trait against the MAAS 2.0 REST API.

pub mod auth;
pub mod config;
pub mod http;
pub mod types;

pub use auth::ApiKey;
pub use config::MaasConfig;
pub use http::HttpClient;
pub use types::{
    Domain, MachineFilter, MachineState, MachineSummary, NodeStatus, PowerParameters, PowerState,
    Verb,
};

/// Path prefix of the MAAS 2.0 API, relative to the service URL.
pub const API_PREFIX: &str = "api/2.0";

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("config error: {0}")]
    Config(String),
}

/// The remote operations used to resolve and drive machines.
///
/// Every call is a single stateless request; implementations must not cache
/// machine state between calls.
pub trait MaasApi: Send + Sync {
    /// List machines matching every field set in `filter`.
    fn list_machines(&self, filter: &MachineFilter) -> Result<Vec<MachineSummary>, ClientError>;

    /// Point lookup by system identifier. Returns `ClientError::NotFound` if absent.
    fn get_machine(&self, system_id: &str) -> Result<MachineSummary, ClientError>;

    /// Power driver parameters (BMC address, credentials, driver options).
    fn power_parameters(&self, system_id: &str) -> Result<PowerParameters, ClientError>;

    /// Ask the remote to start a transition. Acceptance does not mean completion.
    fn request_transition(&self, system_id: &str, verb: Verb) -> Result<(), ClientError>;

    fn set_hostname(&self, system_id: &str, hostname: &str) -> Result<(), ClientError>;

    fn list_domains(&self) -> Result<Vec<Domain>, ClientError>;

    fn set_domain(&self, system_id: &str, domain_id: u64) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_prefix_is_v2() {
        assert_eq!(API_PREFIX, "api/2.0");
    }

    #[test]
    fn client_error_messages() {
        assert_eq!(
            ClientError::NotFound("machine abc".to_owned()).to_string(),
            "not found: machine abc"
        );
        assert_eq!(
            ClientError::Rejected("HTTP 409".to_owned()).to_string(),
            "request rejected: HTTP 409"
        );
    }
}
