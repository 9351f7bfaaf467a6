//! The validated proxy model handed to the renderer
//!
//! [`parse_env`] is the whole pipeline: scan the snapshot for links, resolve
//! each service's companion variables, then fold services into hosts. It is
//! all-or-nothing: the first violated rule aborts the run.

use crate::error::ValidationError;
use crate::hosts;
use crate::resolver;
use crate::scanner;
use crate::snapshot::EnvSnapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Hostname used for services that don't name one
pub const WILDCARD_HOST: &str = "0.0.0.0";

/// Distribution policy across a service's addresses. Unset means round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingType {
    /// Sticky by client address
    IpHash,
    /// Fewest active connections
    LeastConn,
}

impl BalancingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancingType::IpHash => "ip_hash",
            BalancingType::LeastConn => "least_conn",
        }
    }
}

impl FromStr for BalancingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip_hash" => Ok(BalancingType::IpHash),
            "least_conn" => Ok(BalancingType::LeastConn),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for BalancingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transports a service is reachable over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposeProtocol {
    #[default]
    Http,
    Https,
    Both,
}

impl ExposeProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposeProtocol::Http => "http",
            ExposeProtocol::Https => "https",
            ExposeProtocol::Both => "both",
        }
    }

    /// Whether this exposure needs an explicit hostname and certificates
    pub fn requires_tls(&self) -> bool {
        match self {
            ExposeProtocol::Http => false,
            ExposeProtocol::Https | ExposeProtocol::Both => true,
        }
    }
}

impl FromStr for ExposeProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ExposeProtocol::Http),
            "https" => Ok(ExposeProtocol::Https),
            "both" => Ok(ExposeProtocol::Both),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ExposeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated backend service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    #[serde(skip)]
    pub name: String,
    pub addresses: Vec<String>,
    pub port: u16,
    pub location: String,
    pub remote_path: String,
    pub balancing_type: Option<BalancingType>,
    pub expose_protocol: ExposeProtocol,
    pub host: String,
}

/// Protocol flags of a host. Flags only ever go from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Protocols {
    pub http: bool,
    pub https: bool,
}

impl Protocols {
    pub fn enable(&mut self, protocol: ExposeProtocol) {
        match protocol {
            ExposeProtocol::Http => self.http = true,
            ExposeProtocol::Https => self.https = true,
            ExposeProtocol::Both => {
                self.http = true;
                self.https = true;
            }
        }
    }
}

/// A virtual host and the services routed under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    #[serde(skip)]
    pub hostname: String,
    pub protocols: Protocols,
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_certificate_key: Option<String>,
}

impl Host {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            protocols: Protocols::default(),
            services: Vec::new(),
            ssl_certificate: None,
            ssl_certificate_key: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.hostname == WILDCARD_HOST
    }
}

/// Hosts and services of one run, keyed and ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyModel {
    pub hosts: BTreeMap<String, Host>,
    pub services: BTreeMap<String, Service>,
}

impl ProxyModel {
    pub fn services_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.services)
    }

    pub fn hosts_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.hosts)
    }
}

/// Build and validate the proxy model from an environment snapshot.
///
/// Certificate files are checked for existence under `cert_dir`.
pub fn parse_env(env: &EnvSnapshot, cert_dir: &Path) -> Result<ProxyModel, ValidationError> {
    let discovered = scanner::scan_links(env)?;
    let services = resolver::resolve_services(&discovered, env)?;
    let hosts = hosts::aggregate_hosts(&services, env, cert_dir)?;

    Ok(ProxyModel {
        hosts,
        services: services
            .into_iter()
            .map(|service| (service.name.clone(), service))
            .collect(),
    })
}
