use super::{json_pretty, Failure, EXIT_SUCCESS};
use maasops_client::MaasApi;
use maasops_core::{resolve_by_hostname_or_power_address, Query};

pub fn run(api: &dyn MaasApi, query: &Query, json: bool) -> Result<u8, Failure> {
    let machine = resolve_by_hostname_or_power_address(api, query)?;
    if json {
        let payload = serde_json::json!({
            "changed": false,
            "system_id": machine.system_id,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", machine.system_id);
    }
    Ok(EXIT_SUCCESS)
}
