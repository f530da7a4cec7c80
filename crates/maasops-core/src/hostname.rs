use crate::query::MachineRef;
use crate::CoreError;
use maasops_client::MaasApi;
use serde::Serialize;
use tracing::info;

/// Before/after record of a hostname (and optionally domain) update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostnameChange {
    pub changed: bool,
    pub system_id: String,
    pub original_hostname: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Set the machine's hostname. No remote call is made when it already has it.
pub fn set_hostname(
    api: &dyn MaasApi,
    machine: &MachineRef,
    hostname: &str,
) -> Result<HostnameChange, CoreError> {
    set_hostname_and_domain(api, machine, hostname, None)
}

/// Compute the change [`set_hostname_and_domain`] would make, without writing.
pub fn plan_hostname_change(
    api: &dyn MaasApi,
    machine: &MachineRef,
    hostname: &str,
    domain: Option<&str>,
) -> Result<HostnameChange, CoreError> {
    plan(api, machine, hostname, domain).map(|(change, _)| change)
}

/// Set hostname and, if given, DNS domain. The domain must already exist on
/// the remote. Each field is only written when it differs.
pub fn set_hostname_and_domain(
    api: &dyn MaasApi,
    machine: &MachineRef,
    hostname: &str,
    domain: Option<&str>,
) -> Result<HostnameChange, CoreError> {
    let (change, domain_id) = plan(api, machine, hostname, domain)?;
    let system_id = change.system_id.as_str();

    if let Some(id) = domain_id {
        info!(
            "moving machine {system_id} to domain {}",
            change.domain.as_deref().unwrap_or_default()
        );
        api.set_domain(system_id, id)?;
    }
    if change.hostname != change.original_hostname {
        info!(
            "renaming machine {system_id}: {} -> {}",
            change.original_hostname, change.hostname
        );
        api.set_hostname(system_id, &change.hostname)?;
    }
    Ok(change)
}

/// The change plus the id of the domain to move to, if it differs.
fn plan(
    api: &dyn MaasApi,
    machine: &MachineRef,
    hostname: &str,
    domain: Option<&str>,
) -> Result<(HostnameChange, Option<u64>), CoreError> {
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return Err(CoreError::InvalidQuery("hostname must not be empty".to_owned()));
    }
    let domain = domain.map(str::trim).filter(|d| !d.is_empty());

    let current = api.get_machine(&machine.system_id)?;
    let original_domain = current.domain_name().map(str::to_owned);

    let domain_id = match domain {
        Some(wanted) if original_domain.as_deref() != Some(wanted) => {
            let target = api
                .list_domains()?
                .into_iter()
                .find(|d| d.name == wanted)
                .ok_or_else(|| CoreError::NotFound(format!("domain '{wanted}'")))?;
            Some(target.id)
        }
        _ => None,
    };

    let change = HostnameChange {
        changed: domain_id.is_some() || current.hostname != hostname,
        system_id: machine.system_id.clone(),
        original_hostname: current.hostname,
        hostname: hostname.to_owned(),
        domain: domain.map(str::to_owned).or_else(|| original_domain.clone()),
        original_domain,
    };
    Ok((change, domain_id))
}
