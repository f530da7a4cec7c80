pub mod completions;
pub mod machine_info;
pub mod machine_state;
pub mod set_hostname;
pub mod state_info;
pub mod system_id;

use indicatif::{ProgressBar, ProgressStyle};
use maasops_client::{ClientError, HttpClient, MaasConfig, MachineState, PowerState};
use maasops_core::{CoreError, MachineRef};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INVALID: u8 = 2;
pub const EXIT_NOT_FOUND: u8 = 3;
pub const EXIT_TRANSITION: u8 = 4;
pub const EXIT_TIMEOUT: u8 = 5;
pub const EXIT_REMOTE_FAILURE: u8 = 6;
pub const EXIT_TRANSPORT: u8 = 7;

/// A failed command: its kind, a human message, and structured context for
/// `--json` output.
#[derive(Debug)]
pub struct Failure {
    pub kind: &'static str,
    pub msg: String,
    pub detail: Map<String, Value>,
}

impl Failure {
    pub fn new(kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            detail: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.detail.insert(key.to_owned(), value);
        self
    }

    pub fn exit_code(&self) -> u8 {
        match self.kind {
            "invalid_query" | "config" => EXIT_INVALID,
            "not_found" | "ambiguous" => EXIT_NOT_FOUND,
            "unsupported_transition" | "invalid_state_transition" | "rejected" => {
                EXIT_TRANSITION
            }
            "reconciliation_timeout" | "cancelled" => EXIT_TIMEOUT,
            "remote_transition_failed" => EXIT_REMOTE_FAILURE,
            "transport" => EXIT_TRANSPORT,
            _ => EXIT_FAILURE,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = self.detail.clone();
        obj.insert("failed".to_owned(), Value::Bool(true));
        obj.insert("kind".to_owned(), Value::from(self.kind));
        obj.insert("msg".to_owned(), Value::from(self.msg.as_str()));
        Value::Object(obj)
    }
}

impl From<CoreError> for Failure {
    fn from(err: CoreError) -> Self {
        let retriable = err.is_retriable();
        let failure = Failure::new(err.kind(), err.to_string());
        let failure = match err {
            CoreError::Ambiguous { candidates, .. } => failure.with(
                "candidates",
                Value::Array(candidates.iter().map(ref_json).collect()),
            ),
            CoreError::InvalidStateTransition { verb, from, to } => failure
                .with("verb", Value::from(verb.op()))
                .with("original_state", state_json(&from))
                .with("desired", Value::from(to.to_string())),
            CoreError::RemoteTransitionFailed { system_id, state } => failure
                .with("system_id", Value::from(system_id))
                .with("state", state_json(&state)),
            CoreError::ReconciliationTimeout {
                system_id,
                last,
                elapsed,
                ..
            } => failure
                .with("system_id", Value::from(system_id))
                .with("state", state_json(&last))
                .with("elapsed_ms", Value::from(elapsed.as_millis() as u64)),
            CoreError::Cancelled { system_id, last } => failure
                .with("system_id", Value::from(system_id))
                .with("state", state_json(&last)),
            _ => failure,
        };
        failure.with("retriable", Value::Bool(retriable))
    }
}

impl From<ClientError> for Failure {
    fn from(err: ClientError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<String> for Failure {
    fn from(msg: String) -> Self {
        Failure::new("error", msg)
    }
}

/// Service connection settings gathered from global flags.
#[derive(Debug, Default)]
pub struct Connection<'a> {
    pub url: Option<&'a str>,
    pub api_key: Option<&'a str>,
    pub config: Option<&'a Path>,
    pub request_timeout: Option<u64>,
}

pub fn make_client(conn: &Connection<'_>) -> Result<HttpClient, Failure> {
    let mut config = MaasConfig::resolve(conn.url, conn.api_key, conn.config)
        .map_err(|e| Failure::new("config", e.to_string()))?;
    if let Some(secs) = conn.request_timeout {
        config.request_timeout_secs = secs;
    }
    debug!(
        "using {} ({})",
        config.url,
        if config.api_key.is_some() {
            "authenticated"
        } else {
            "anonymous"
        }
    );
    HttpClient::new(config).map_err(|e| Failure::new("config", e.to_string()))
}

/// Parse `500ms`, `30s`, `10m`, `1h`; a bare number means seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{s}'"))?;
    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(n)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("invalid duration unit in '{s}' (use ms, s, m or h)")),
    };
    n.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{s}'"))
}

pub fn state_json(state: &MachineState) -> Value {
    json!({
        "status": state.status.name(),
        "status_id": state.status.code(),
        "power_state": state.power.to_string(),
    })
}

pub fn ref_json(machine: &MachineRef) -> Value {
    json!({
        "system_id": machine.system_id,
        "hostname": machine.hostname,
        "status": machine.state.status.name(),
        "power_state": machine.state.power.to_string(),
    })
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        style("{spinner:.cyan} {msg} {elapsed:.dim}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Color a MAAS status name by how settled it is.
pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "READY" | "DEPLOYED" => Style::new().green().apply_to(status).to_string(),
        "BROKEN" => Style::new().red().bold().apply_to(status).to_string(),
        s if s.starts_with("FAILED") => Style::new().red().apply_to(status).to_string(),
        s if s.ends_with("ING") => Style::new().yellow().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

pub fn colorize_power(power: PowerState) -> String {
    use console::Style;
    let text = power.to_string();
    match power {
        PowerState::On => Style::new().green().apply_to(text).to_string(),
        PowerState::Off => Style::new().dim().apply_to(text).to_string(),
        PowerState::Error => Style::new().red().apply_to(text).to_string(),
        PowerState::Unknown => text,
    }
}
