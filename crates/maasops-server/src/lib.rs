//! Simulated MAAS 2.0 HTTP endpoint.
//!
//! Serves the subset of the machines and domains API used by `maasops`,
//! backed by an in-memory [`SimulatedMaas`]. Machines converge a configurable
//! number of reads after a transition is requested, so polling behaves as it
//! does against a real region controller.
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

use maasops_client::{ClientError, Domain, MaasApi, MachineFilter, PowerParameters, Verb};
use maasops_core::{SimMachine, SimulatedMaas};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tracing::{debug, info, warn};

/// Machines and domains to seed the simulator with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inventory {
    pub machines: Vec<SimMachine>,
    #[serde(default)]
    pub domains: Vec<Domain>,
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&data).map_err(|e| format!("invalid inventory {}: {e}", path.display()))
    }

    /// A small rack used when no inventory file is given.
    pub fn demo() -> Self {
        use maasops_client::{NodeStatus, PowerState};
        Self {
            machines: vec![
                SimMachine::new("y3b3x3", "server1")
                    .with_status(NodeStatus::Deployed)
                    .with_power(PowerState::On)
                    .with_power_address("10.20.0.11"),
                SimMachine::new("k8p2a1", "server2").with_power_address("10.20.0.12"),
                SimMachine::new("n0n3w1", "fresh").with_status(NodeStatus::New),
            ],
            domains: Vec::new(),
        }
    }

    pub fn into_simulator(self) -> SimulatedMaas {
        let sim = SimulatedMaas::new(self.machines);
        if self.domains.is_empty() {
            sim
        } else {
            sim.with_domains(self.domains)
        }
    }
}

/// API resource addressed by a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Machines,
    Machine(&'a str),
    Domains,
}

/// Parse `<base>/api/2.0/<resource>/` into a route. Any base path is accepted,
/// so both `http://host/MAAS` and `http://host` style service URLs work.
pub fn parse_route(path: &str) -> Option<Route<'_>> {
    let marker = format!("/{}/", maasops_client::API_PREFIX);
    let idx = path.find(&marker)?;
    let rest = path[idx + marker.len()..].trim_end_matches('/');
    match rest.split('/').collect::<Vec<_>>().as_slice() {
        ["machines"] => Some(Route::Machines),
        ["machines", id] if !id.is_empty() => Some(Route::Machine(id)),
        ["domains"] => Some(Route::Domains),
        _ => None,
    }
}

/// Decode one `application/x-www-form-urlencoded` component.
fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// Split `a=1&b=2` into decoded pairs. Later duplicates win.
pub fn parse_pairs(s: &str) -> BTreeMap<String, String> {
    s.split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

/// A request as seen by the simulator, kept for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
}

/// Status, body and content type of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub json: bool,
}

impl Reply {
    fn json(value: &impl serde::Serialize) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status: 200,
                body,
                json: true,
            },
            Err(e) => Self::text(500, &format!("serialization error: {e}")),
        }
    }

    fn text(status: u16, msg: &str) -> Self {
        Self {
            status,
            body: msg.to_owned(),
            json: false,
        }
    }

    fn from_client_error(err: &ClientError) -> Self {
        match err {
            ClientError::NotFound(what) => Self::text(404, &format!("Not Found: {what}")),
            ClientError::Rejected(reason) => Self::text(409, reason),
            other => Self::text(500, &other.to_string()),
        }
    }
}

/// Shared server state: the simulator plus a request log.
pub struct MaasSimServer {
    sim: Arc<SimulatedMaas>,
    require_auth: bool,
    log: Mutex<Vec<RecordedRequest>>,
}

impl MaasSimServer {
    pub fn new(sim: Arc<SimulatedMaas>) -> Self {
        Self {
            sim,
            require_auth: false,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Answer 401 to requests without an OAuth PLAINTEXT `Authorization` header.
    #[must_use]
    pub fn with_required_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }

    pub fn simulator(&self) -> &Arc<SimulatedMaas> {
        &self.sim
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn machine_document(&self, system_id: &str) -> Reply {
        match self.sim.machine(system_id) {
            Some(m) => Reply::json(&m.to_summary().raw),
            None => Reply::text(404, &format!("Not Found: machine {system_id}")),
        }
    }

    fn all_power_parameters(&self) -> Result<BTreeMap<String, PowerParameters>, ClientError> {
        let mut all = BTreeMap::new();
        for m in self.sim.list_machines(&MachineFilter::default())? {
            let params = self.sim.power_parameters(&m.system_id)?;
            all.insert(m.system_id, params);
        }
        Ok(all)
    }

    fn get(&self, route: Route<'_>, query: &BTreeMap<String, String>) -> Reply {
        let op = query.get("op").map(String::as_str);
        let result = match (route, op) {
            (Route::Machines, None) => {
                let filter = match query.get("hostname") {
                    Some(h) => MachineFilter::by_hostname(h),
                    None => MachineFilter::default(),
                };
                self.sim.list_machines(&filter).map(|machines| {
                    let docs: Vec<_> = machines.into_iter().map(|m| m.raw).collect();
                    Reply::json(&docs)
                })
            }
            (Route::Machines, Some("power_parameters")) => {
                self.all_power_parameters().map(|all| Reply::json(&all))
            }
            (Route::Machine(id), None) => self.sim.get_machine(id).map(|m| Reply::json(&m.raw)),
            (Route::Machine(id), Some("power_parameters")) => {
                self.sim.power_parameters(id).map(|p| Reply::json(&p))
            }
            (Route::Domains, None) => self.sim.list_domains().map(|d| Reply::json(&d)),
            (_, Some(op)) => return Reply::text(400, &format!("unknown op '{op}'")),
        };
        result.unwrap_or_else(|e| Reply::from_client_error(&e))
    }

    fn post(&self, route: Route<'_>, query: &BTreeMap<String, String>) -> Reply {
        let Route::Machine(id) = route else {
            return Reply::text(405, "method not allowed");
        };
        let Some(verb) = query.get("op").and_then(|op| Verb::from_op(op)) else {
            return Reply::text(400, "unknown or missing op");
        };
        match self.sim.request_transition(id, verb) {
            Ok(()) => {
                info!("{verb} accepted for {id}");
                self.machine_document(id)
            }
            Err(e) => {
                warn!("{verb} for {id}: {e}");
                Reply::from_client_error(&e)
            }
        }
    }

    fn put(&self, route: Route<'_>, form: &BTreeMap<String, String>) -> Reply {
        let Route::Machine(id) = route else {
            return Reply::text(405, "method not allowed");
        };
        if let Some(domain) = form.get("domain") {
            let Ok(domain_id) = domain.parse::<u64>() else {
                return Reply::text(400, &format!("invalid domain id '{domain}'"));
            };
            if let Err(e) = self.sim.set_domain(id, domain_id) {
                return Reply::from_client_error(&e);
            }
            info!("{id} moved to domain {domain_id}");
        }
        if let Some(hostname) = form.get("hostname") {
            if let Err(e) = self.sim.set_hostname(id, hostname) {
                return Reply::from_client_error(&e);
            }
            info!("{id} renamed to {hostname}");
        }
        self.machine_document(id)
    }

    fn authorized(authorization: Option<&str>) -> bool {
        authorization.is_some_and(|h| {
            h.starts_with("OAuth ") && h.contains(r#"oauth_signature_method="PLAINTEXT""#)
        })
    }

    /// Route one request. Separate from the socket so it can be unit tested.
    pub fn dispatch(
        &self,
        method: &str,
        url: &str,
        authorization: Option<&str>,
        body: &str,
    ) -> Reply {
        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedRequest {
                method: method.to_owned(),
                url: url.to_owned(),
                authorization: authorization.map(str::to_owned),
            });
        }
        if self.require_auth && !Self::authorized(authorization) {
            return Reply::text(401, "Authorization required");
        }

        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let Some(route) = parse_route(path) else {
            return Reply::text(404, "not found");
        };
        let query = parse_pairs(query);
        match method {
            "GET" => self.get(route, &query),
            "POST" => self.post(route, &query),
            "PUT" => self.put(route, &parse_pairs(body.trim())),
            _ => Reply::text(405, "method not allowed"),
        }
    }
}

fn respond(req: Request, reply: Reply) {
    let content_type = if reply.json {
        "application/json"
    } else {
        "text/plain"
    };
    let mut response = Response::from_string(reply.body).with_status_code(StatusCode(reply.status));
    if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

/// Handle a single HTTP request.
pub fn handle_request(state: &MaasSimServer, mut req: Request) {
    let method = req.method().to_string();
    let url = req.url().to_owned();
    let authorization = req
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str().to_owned());
    let mut body = String::new();
    if let Err(e) = req.as_reader().read_to_string(&mut body) {
        respond(req, Reply::text(400, &format!("unreadable body: {e}")));
        return;
    }

    let reply = state.dispatch(&method, &url, authorization.as_deref(), &body);
    debug!("{method} {url} -> {}", reply.status);
    respond(req, reply);
}

/// Start the server loop, blocking the current thread.
pub fn run_server(
    state: &Arc<MaasSimServer>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(addr)?;
    for request in server.incoming_requests() {
        handle_request(state, request);
    }
    Ok(())
}

/// A test helper that starts a simulator on a random port in a background thread.
///
/// `url` is the service URL to hand to a client (it includes the `/MAAS` base
/// path). Dropping the `TestServer` stops the server.
pub struct TestServer {
    pub url: String,
    pub state: Arc<MaasSimServer>,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    pub fn start(sim: Arc<SimulatedMaas>) -> Self {
        Self::start_with(MaasSimServer::new(sim))
    }

    pub fn start_with(state: MaasSimServer) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}/MAAS");

        let state = Arc::new(state);
        let srv = Arc::clone(&server);
        let st = Arc::clone(&state);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&st, request);
            }
        });

        Self {
            url,
            state,
            server,
            _handle: handle,
        }
    }

    pub fn simulator(&self) -> &Arc<SimulatedMaas> {
        self.state.simulator()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
