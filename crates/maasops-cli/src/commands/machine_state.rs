use super::{
    colorize_power, colorize_status, json_pretty, spin_fail, spin_ok, spinner, state_json,
    Failure, EXIT_SUCCESS,
};
use maasops_client::{MaasApi, MachineState};
use maasops_core::{
    plan, reconcile, resolve_by_hostname_or_id, CancelToken, DesiredState, Query,
    ReconcileOptions,
};

fn describe(state: &MachineState) -> String {
    format!(
        "{} (power {})",
        colorize_status(state.status.name()),
        colorize_power(state.power)
    )
}

pub fn run(
    api: &dyn MaasApi,
    query: &Query,
    desired: DesiredState,
    options: &ReconcileOptions,
    cancel: &CancelToken,
    check: bool,
    json: bool,
) -> Result<u8, Failure> {
    let machine = resolve_by_hostname_or_id(api, query)?;

    if check {
        let plan = plan(api, &machine, desired)?;
        if json {
            let payload = serde_json::json!({
                "changed": plan.changes(),
                "check": true,
                "system_id": plan.system_id,
                "desired": desired,
                "verb": plan.verb.map(|v| v.op()),
                "original_state": state_json(&plan.original),
                "state": state_json(&plan.original),
            });
            println!("{}", json_pretty(&payload)?);
        } else {
            match plan.verb {
                Some(verb) => println!(
                    "would {verb} {} ({}), currently {}",
                    machine.hostname,
                    machine.system_id,
                    describe(&plan.original)
                ),
                None => println!(
                    "{} ({}) is already {desired}",
                    machine.hostname, machine.system_id
                ),
            }
        }
        return Ok(EXIT_SUCCESS);
    }

    let pb = (!json).then(|| {
        spinner(&format!(
            "bringing {} ({}) to {desired}…",
            machine.hostname, machine.system_id
        ))
    });
    let outcome = match reconcile(api, &machine, desired, options, cancel) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{} did not reach {desired}", machine.hostname));
            }
            return Err(e.into());
        }
    };
    if let Some(ref pb) = pb {
        if outcome.changed {
            spin_ok(
                pb,
                &format!(
                    "{} reached {desired} after {} polls ({:.1}s)",
                    machine.hostname,
                    outcome.polls,
                    outcome.elapsed.as_secs_f64()
                ),
            );
        } else {
            spin_ok(pb, &format!("{} already {desired}", machine.hostname));
        }
    }

    if json {
        let payload = serde_json::json!({
            "changed": outcome.changed,
            "system_id": outcome.system_id,
            "hostname": machine.hostname,
            "desired": desired,
            "original_state": state_json(&outcome.original),
            "state": state_json(&outcome.state),
            "polls": outcome.polls,
            "elapsed_ms": outcome.elapsed.as_millis() as u64,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{}: {} -> {}",
            machine.system_id,
            describe(&outcome.original),
            describe(&outcome.state)
        );
    }
    Ok(EXIT_SUCCESS)
}
