use super::{colorize_power, colorize_status, json_pretty, Failure, EXIT_SUCCESS};
use maasops_client::MaasApi;
use maasops_core::{resolve_by_hostname_or_id, Query};

pub fn run(api: &dyn MaasApi, query: &Query, json: bool) -> Result<u8, Failure> {
    let machine = resolve_by_hostname_or_id(api, query)?;
    let summary = api.get_machine(&machine.system_id)?;
    let power = api.power_parameters(&machine.system_id)?;

    if json {
        let payload = serde_json::json!({
            "changed": false,
            "data": summary.raw,
            "power_data": { machine.system_id.clone(): power },
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("system_id:     {}", summary.system_id);
        println!("hostname:      {}", summary.hostname);
        println!("fqdn:          {}", summary.fqdn);
        println!("domain:        {}", summary.domain_name().unwrap_or("(none)"));
        println!("status:        {}", colorize_status(summary.status.name()));
        println!("power_state:   {}", colorize_power(summary.power_state));
        println!("power_type:    {}", summary.power_type);
        println!(
            "power_address: {}",
            power.power_address().unwrap_or("(none)")
        );
    }
    Ok(EXIT_SUCCESS)
}
