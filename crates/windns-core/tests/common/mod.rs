//! Test doubles and common utilities for contract tests
//!
//! [`FakeDnsServer`] stands in for a Windows DNS server behind a remote
//! shell. Sessions decode the `-EncodedCommand` payload, tokenize it the way
//! PowerShell would (double quotes, backtick escapes), and apply the
//! Add/Remove/Get cmdlets to an in-memory zone store. Like the real server,
//! a query matching exactly one record prints a bare JSON object, and a
//! query matching nothing fails with an `ObjectNotFound` error record.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use windns_core::command::decode_invocation;
use windns_core::error::{Error, Result};
use windns_core::traits::{CommandOutput, Connector, RemoteSession};
use windns_core::{ConnectionPool, PoolConfig, RecordEngine, SshConfig, WinDnsConfig};

type RecordKey = (String, String, String);

#[derive(Default)]
struct ServerState {
    records: BTreeMap<RecordKey, Vec<String>>,
    commands: Vec<String>,
    failing: Vec<String>,
    broken: Vec<String>,
}

/// In-memory Windows DNS server
#[derive(Clone, Default)]
pub struct FakeDnsServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeDnsServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record set, as if it had been created out of band
    pub fn seed(&self, zone: &str, host: &str, record_type: &str, values: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.records.insert(
            key(zone, host, record_type),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    /// Values currently stored for a record set, in insertion order
    pub fn values(&self, zone: &str, host: &str, record_type: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .records
            .get(&key(zone, host, record_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Every decoded command text the server received, in order
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Decoded command texts starting with `cmdlet`
    pub fn commands_for(&self, cmdlet: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(cmdlet))
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    /// Commands containing `needle` exit with code 1
    pub fn fail_commands_containing(&self, needle: &str) {
        self.state.lock().unwrap().failing.push(needle.to_string());
    }

    /// Commands containing `needle` fail at transport level
    pub fn break_transport_containing(&self, needle: &str) {
        self.state.lock().unwrap().broken.push(needle.to_string());
    }

    fn run(&self, invocation: &str) -> Result<CommandOutput> {
        let text = decode_invocation(invocation)
            .map_err(|e| Error::transport(format!("remote shell rejected invocation: {}", e)))?;

        let mut state = self.state.lock().unwrap();
        state.commands.push(text.clone());

        if state.broken.iter().any(|needle| text.contains(needle)) {
            return Err(Error::transport("channel closed by remote host"));
        }
        if state.failing.iter().any(|needle| text.contains(needle)) {
            return Ok(remote_error("injected failure", "InvalidOperation"));
        }

        let command = match text.split_once(" | ConvertTo-Json") {
            Some((command, _)) => command,
            None => text.as_str(),
        };
        let tokens = tokenize(command);
        let Some((cmdlet, args)) = tokens.split_first() else {
            return Ok(remote_error("empty command", "ParserError"));
        };
        let params = Params::parse(args);

        match cmdlet.as_str() {
            "Get-DnsServerResourceRecord" => Ok(get(&state, &params)),
            "Add-DnsServerResourceRecord" => Ok(add(&mut state, &params)),
            "Remove-DnsServerResourceRecord" => Ok(remove(&mut state, &params)),
            other => Ok(remote_error(
                &format!("The term '{}' is not recognized", other),
                "CommandNotFoundException",
            )),
        }
    }
}

fn key(zone: &str, host: &str, record_type: &str) -> RecordKey {
    (
        zone.to_lowercase(),
        host.to_lowercase(),
        record_type.to_uppercase(),
    )
}

fn remote_error(message: &str, category: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: format!(
            "{}\r\n    + CategoryInfo          : {}: (:) [], CimException",
            message, category
        ),
        exit_code: 1,
    }
}

/// Split a command line into arguments, honouring double quotes and backtick escapes
fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '`' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_token = true;
            }
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

const SWITCHES: &[&str] = &["-Force", "-CreatePtr", "-A", "-AAAA", "-TXT", "-PTR", "-CNAME"];

#[derive(Default)]
struct Params {
    named: BTreeMap<String, String>,
    switches: Vec<String>,
}

impl Params {
    fn parse(args: &[String]) -> Self {
        let mut params = Params::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if SWITCHES.contains(&arg.as_str()) {
                params.switches.push(arg.trim_start_matches('-').to_string());
            } else if let Some(name) = arg.strip_prefix('-') {
                let value = iter.next().cloned().unwrap_or_default();
                params.named.insert(name.to_string(), value);
            }
        }
        params
    }

    fn get(&self, name: &str) -> &str {
        self.named.get(name).map(String::as_str).unwrap_or("")
    }

    fn has(&self, switch: &str) -> bool {
        self.switches.iter().any(|s| s == switch)
    }
}

fn value_property(record_type: &str) -> &'static str {
    match record_type {
        "A" => "IPv4Address",
        "AAAA" => "IPv6Address",
        "TXT" => "DescriptiveText",
        "PTR" => "PtrDomainName",
        "CNAME" => "HostNameAlias",
        _ => "RecordData",
    }
}

/// The server stores PTR/CNAME targets fully qualified and AAAA lower-cased
fn stored_form(record_type: &str, value: &str) -> String {
    match record_type {
        "PTR" | "CNAME" if !value.ends_with('.') => format!("{}.", value),
        "AAAA" => value.to_lowercase(),
        _ => value.to_string(),
    }
}

fn get(state: &ServerState, params: &Params) -> CommandOutput {
    let (zone, host, record_type) = (params.get("ZoneName"), params.get("Name"), params.get("RRType"));
    let values = state
        .records
        .get(&key(zone, host, record_type))
        .cloned()
        .unwrap_or_default();

    if values.is_empty() {
        return remote_error(
            &format!(
                "Get-DnsServerResourceRecord : Failed to get {} record in {} zone on server DNS01.",
                host, zone
            ),
            "ObjectNotFound",
        );
    }

    let objects: Vec<serde_json::Value> = values
        .iter()
        .map(|value| {
            json!({
                "DistinguishedName": format!("DC={},DC={},cn=MicrosoftDNS,DC=DomainDnsZones", host, zone),
                "HostName": host,
                "RecordClass": "IN",
                "RecordType": record_type.to_uppercase(),
                "RecordData": {
                    "CimInstanceProperties": [
                        { "Name": value_property(&record_type.to_uppercase()), "Value": value, "CimType": 14 }
                    ]
                },
                "TimeToLive": { "Days": 0, "Hours": 1, "TotalSeconds": 3600 }
            })
        })
        .collect();

    // ConvertTo-Json unwraps a single-element pipeline into a bare object
    let stdout = if objects.len() == 1 {
        serde_json::to_string_pretty(&objects[0]).unwrap()
    } else {
        serde_json::to_string_pretty(&objects).unwrap()
    };

    CommandOutput {
        stdout: format!("{}\r\n", stdout),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn add(state: &mut ServerState, params: &Params) -> CommandOutput {
    let Some(record_type) = ["A", "AAAA", "TXT", "PTR", "CNAME"]
        .into_iter()
        .find(|t| params.has(t))
    else {
        return remote_error("A record type switch is required", "InvalidArgument");
    };

    let value = stored_form(record_type, params.get(value_property(record_type)));
    let values = state
        .records
        .entry(key(params.get("ZoneName"), params.get("Name"), record_type))
        .or_default();

    if values.contains(&value) {
        return remote_error(
            "Add-DnsServerResourceRecord : Failed to create resource record: already exists",
            "ResourceExists",
        );
    }
    values.push(value);
    CommandOutput::default()
}

fn remove(state: &mut ServerState, params: &Params) -> CommandOutput {
    let record_type = params.get("RRType").to_uppercase();
    let target = stored_form(&record_type, params.get("RecordData"));
    let key = key(params.get("ZoneName"), params.get("Name"), &record_type);

    let removed = match state.records.get_mut(&key) {
        Some(values) => {
            let before = values.len();
            values.retain(|v| !v.eq_ignore_ascii_case(&target));
            values.len() != before
        }
        None => false,
    };

    if !removed {
        return remote_error(
            "Remove-DnsServerResourceRecord : Failed to find the record",
            "ObjectNotFound",
        );
    }
    if state.records.get(&key).is_some_and(Vec::is_empty) {
        state.records.remove(&key);
    }
    CommandOutput::default()
}

/// Session to the fake server
pub struct FakeSession {
    pub id: usize,
    server: FakeDnsServer,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn exec(&mut self, invocation: &str) -> Result<CommandOutput> {
        tokio::task::yield_now().await;
        self.server.run(invocation)
    }

    async fn close(self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector opening sessions to a [`FakeDnsServer`]
pub struct FakeConnector {
    server: FakeDnsServer,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    probes: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl FakeConnector {
    pub fn new(server: &FakeDnsServer) -> Self {
        Self {
            server: server.clone(),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            probes: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a connector that shares counters and switches with another
    pub fn sharing_counters_with(other: &FakeConnector) -> Self {
        Self {
            server: other.server.clone(),
            opened: Arc::clone(&other.opened),
            closed: Arc::clone(&other.closed),
            probes: Arc::clone(&other.probes),
            refuse: Arc::clone(&other.refuse),
            alive: Arc::clone(&other.alive),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Make new connections fail as if the host were unreachable
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make liveness probes report every idle session dead
    pub fn kill_sessions(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection("dns01:22: connection refused"));
        }
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            id,
            server: self.server.clone(),
            closed: Arc::clone(&self.closed),
        })
    }

    async fn is_alive(&self, _session: &mut FakeSession) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst)
    }

    fn target(&self) -> &str {
        "dns01"
    }
}

/// Configuration pointing at the fake host
pub fn test_config() -> WinDnsConfig {
    WinDnsConfig::new(SshConfig::new("administrator", "hunter2", "dns01"))
}

/// A fake server, a connector handle for counters, a pool, and an engine
pub struct Harness {
    pub server: FakeDnsServer,
    pub connector: FakeConnector,
    pub pool: ConnectionPool<FakeConnector>,
    pub engine: RecordEngine,
    pub events: tokio::sync::mpsc::Receiver<windns_core::EngineEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_pool_config(PoolConfig::default())
    }

    pub fn with_pool_config(pool_config: PoolConfig) -> Self {
        let server = FakeDnsServer::new();
        let connector = FakeConnector::new(&server);
        let pool = ConnectionPool::new(FakeConnector::sharing_counters_with(&connector), pool_config);
        let (engine, events) = RecordEngine::new(&test_config()).expect("engine construction succeeds");

        Self {
            server,
            connector,
            pool,
            engine,
            events,
        }
    }

    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<windns_core::EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
