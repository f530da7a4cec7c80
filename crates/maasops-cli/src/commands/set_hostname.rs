use super::{json_pretty, Failure, EXIT_SUCCESS};
use maasops_client::MaasApi;
use maasops_core::{plan_hostname_change, resolve_by_hostname_or_id, set_hostname_and_domain, Query};

pub fn run(
    api: &dyn MaasApi,
    system_id: &str,
    hostname: &str,
    domain: Option<&str>,
    check: bool,
    json: bool,
) -> Result<u8, Failure> {
    let machine = resolve_by_hostname_or_id(api, &Query::new().system_id(system_id))?;
    let change = if check {
        plan_hostname_change(api, &machine, hostname, domain)?
    } else {
        set_hostname_and_domain(api, &machine, hostname, domain)?
    };

    if json {
        println!("{}", json_pretty(&change)?);
        return Ok(EXIT_SUCCESS);
    }

    let fqdn = |host: &str, domain: Option<&str>| match domain {
        Some(d) => format!("{host}.{d}"),
        None => host.to_owned(),
    };
    let before = fqdn(&change.original_hostname, change.original_domain.as_deref());
    let after = fqdn(&change.hostname, change.domain.as_deref());
    match (change.changed, check) {
        (false, _) => println!("{}: unchanged ({before})", change.system_id),
        (true, true) => println!("{}: would rename {before} -> {after}", change.system_id),
        (true, false) => println!("{}: renamed {before} -> {after}", change.system_id),
    }
    Ok(EXIT_SUCCESS)
}
