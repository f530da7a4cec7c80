use crate::{
    ApiKey, ClientError, Domain, MaasApi, MaasConfig, MachineFilter, MachineSummary,
    PowerParameters, Verb,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

type HttpResult = Result<ureq::http::Response<ureq::Body>, ureq::Error>;

/// Blocking MAAS 2.0 API client.
///
/// Routes used:
/// - `GET  machines/?hostname=<h>`          list machines by hostname
/// - `GET  machines/?op=power_parameters`   power parameters of all machines
/// - `GET  machines/<id>/`                  machine document
/// - `GET  machines/<id>/?op=power_parameters`
/// - `POST machines/<id>/?op=<verb>`        power_on, power_off, release
/// - `PUT  machines/<id>/`                  form-encoded `hostname` / `domain`
/// - `GET  domains/`
pub struct HttpClient {
    config: MaasConfig,
    key: Option<ApiKey>,
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(config: MaasConfig) -> Result<Self, ClientError> {
        let key = config.api_key.as_deref().map(ApiKey::parse).transpose()?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.request_timeout_secs)))
            .build()
            .into();
        Ok(Self { config, key, agent })
    }

    fn authorize<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let req = req.header("Accept", "application/json");
        match self.key {
            Some(ref key) => req.header("Authorization", &key.authorization_header()),
            None => req,
        }
    }

    fn finish(method: &str, url: &str, result: HttpResult) -> Result<Vec<u8>, ClientError> {
        let resp = match result {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(ClientError::NotFound(url.to_owned()));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(ClientError::Http(format!("HTTP {code} for {method} {url}")));
            }
            Err(e) => {
                return Err(ClientError::Http(format!("{method} {url}: {e}")));
            }
        };

        let code = resp.status().as_u16();
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| ClientError::Http(e.to_string()))?;

        match code {
            200..=299 => Ok(body),
            404 => Err(ClientError::NotFound(url.to_owned())),
            401 | 403 => Err(ClientError::Config(format!(
                "HTTP {code} for {method} {url}: check the MAAS API key"
            ))),
            400 | 409 if method != "GET" => {
                let reason = String::from_utf8_lossy(&body);
                Err(ClientError::Rejected(format!(
                    "HTTP {code} for {method} {url}: {}",
                    reason.trim()
                )))
            }
            _ => Err(ClientError::Http(format!("HTTP {code} for {method} {url}"))),
        }
    }

    fn do_get(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, ClientError> {
        tracing::debug!("GET {url} {query:?}");
        let mut req = self.authorize(self.agent.get(url));
        for (k, v) in query {
            req = req.query(*k, *v);
        }
        Self::finish("GET", url, req.call())
    }

    fn do_post_op(&self, url: &str, op: &str) -> Result<(), ClientError> {
        tracing::debug!("POST {url}?op={op}");
        let req = self.authorize(self.agent.post(url)).query("op", op);
        Self::finish("POST", url, req.send_empty())?;
        Ok(())
    }

    fn do_put_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<(), ClientError> {
        tracing::debug!("PUT {url} {fields:?}");
        let req = self.authorize(self.agent.put(url));
        Self::finish("PUT", url, req.send_form(fields.iter().copied()))?;
        Ok(())
    }

    fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, ClientError> {
        let body = self.do_get(url, query)?;
        serde_json::from_slice(&body)
            .map_err(|e| ClientError::Serialization(format!("invalid JSON from {url}: {e}")))
    }

    fn machine_url(&self, system_id: &str) -> String {
        self.config.api_url(&format!("machines/{system_id}/"))
    }

    fn list_by_power_address(
        &self,
        address: &str,
        filter: &MachineFilter,
    ) -> Result<Vec<MachineSummary>, ClientError> {
        let url = self.config.api_url("machines/");
        let value = self.get_json(&url, &[("op", "power_parameters")])?;
        let all: BTreeMap<String, PowerParameters> = serde_json::from_value(value)
            .map_err(|e| ClientError::Serialization(format!("invalid power parameters: {e}")))?;

        let mut machines = Vec::new();
        for (system_id, params) in &all {
            if params.power_address() != Some(address) {
                continue;
            }
            let mut machine = self.get_machine(system_id)?;
            if filter.matches(&machine, Some(address)) {
                machine.power_address = Some(address.to_owned());
                machines.push(machine);
            }
        }
        Ok(machines)
    }
}

fn parse_machine_list(value: serde_json::Value) -> Result<Vec<MachineSummary>, ClientError> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(MachineSummary::from_value)
            .collect(),
        other => Err(ClientError::Serialization(format!(
            "expected a machine list, got {other}"
        ))),
    }
}

impl MaasApi for HttpClient {
    fn list_machines(&self, filter: &MachineFilter) -> Result<Vec<MachineSummary>, ClientError> {
        if let Some(ref address) = filter.power_address {
            return self.list_by_power_address(address, filter);
        }
        let url = self.config.api_url("machines/");
        let query: Vec<(&str, &str)> = filter
            .hostname
            .as_deref()
            .map(|h| ("hostname", h))
            .into_iter()
            .collect();
        let machines = parse_machine_list(self.get_json(&url, &query)?)?;
        // The remote filter is trusted to narrow, not to match exactly.
        Ok(machines
            .into_iter()
            .filter(|m| filter.matches(m, None))
            .collect())
    }

    fn get_machine(&self, system_id: &str) -> Result<MachineSummary, ClientError> {
        let url = self.machine_url(system_id);
        MachineSummary::from_value(self.get_json(&url, &[])?)
    }

    fn power_parameters(&self, system_id: &str) -> Result<PowerParameters, ClientError> {
        let url = self.machine_url(system_id);
        let value = self.get_json(&url, &[("op", "power_parameters")])?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Serialization(format!("invalid power parameters: {e}")))
    }

    fn request_transition(&self, system_id: &str, verb: Verb) -> Result<(), ClientError> {
        let url = self.machine_url(system_id);
        self.do_post_op(&url, verb.op())
    }

    fn set_hostname(&self, system_id: &str, hostname: &str) -> Result<(), ClientError> {
        let url = self.machine_url(system_id);
        self.do_put_form(&url, &[("hostname", hostname)])
    }

    fn list_domains(&self) -> Result<Vec<Domain>, ClientError> {
        let url = self.config.api_url("domains/");
        let value = self.get_json(&url, &[])?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Serialization(format!("invalid domain list: {e}")))
    }

    fn set_domain(&self, system_id: &str, domain_id: u64) -> Result<(), ClientError> {
        let url = self.machine_url(system_id);
        let id = domain_id.to_string();
        self.do_put_form(&url, &[("domain", id.as_str())])
    }
}
