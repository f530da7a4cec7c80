use super::{colorize_power, colorize_status, json_pretty, Failure, EXIT_SUCCESS};
use maasops_client::MaasApi;
use maasops_core::{resolve_by_hostname_or_id, Query};

pub fn run(api: &dyn MaasApi, query: &Query, json: bool) -> Result<u8, Failure> {
    let machine = resolve_by_hostname_or_id(api, query)?;
    let state = api.get_machine(&machine.system_id)?.state();

    if json {
        let payload = serde_json::json!({
            "changed": false,
            "system_id": machine.system_id,
            "status": state.status.name(),
            "status_id": state.status.code(),
            "power_state": state.power.to_string(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{} ({}): {}, power {}",
            machine.hostname,
            machine.system_id,
            colorize_status(state.status.name()),
            colorize_power(state.power)
        );
    }
    Ok(EXIT_SUCCESS)
}
