//! Render the proxy model into nginx configuration text
//!
//! The model is first flattened into plain views (upstreams and server
//! blocks) so the template only loops and prints. Balancing and protocol
//! variants are matched here, not in the template.

use crate::model::{BalancingType, ExposeProtocol, Host, ProxyModel};
use minijinja::{context, Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TEMPLATE_NAME: &str = "proxy.conf";
const DEFAULT_TEMPLATE: &str = include_str!("../templates/proxy.conf.j2");

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;
const CATCH_ALL_SERVER_NAME: &str = "_";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to read template {}: {source}", .path.display())]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UpstreamView {
    pub name: String,
    pub balancing: Option<&'static str>,
    pub servers: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SslView {
    pub certificate: String,
    pub key: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LocationView {
    pub path: String,
    pub upstream: String,
    pub remote_path: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ServerView {
    pub server_name: String,
    pub port: u16,
    pub default_server: bool,
    pub ssl: Option<SslView>,
    pub locations: Vec<LocationView>,
}

/// Renders proxy configs from a template (built-in unless overridden)
#[derive(Debug, Clone)]
pub struct ConfigRenderer {
    template: String,
}

impl Default for ConfigRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRenderer {
    pub fn new() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn from_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, RenderError> {
        let template =
            std::fs::read_to_string(path).map_err(|source| RenderError::ReadTemplate {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_template(template))
    }

    /// Render the model. Certificate names are joined onto `ssl_dir`.
    pub fn render(&self, model: &ProxyModel, ssl_dir: &Path) -> Result<String, RenderError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template(TEMPLATE_NAME, &self.template)?;

        let template = env.get_template(TEMPLATE_NAME)?;
        let rendered = template.render(context! {
            upstreams => upstream_views(model),
            servers => server_views(model, ssl_dir),
        })?;
        Ok(rendered)
    }
}

fn balancing_directive(balancing: Option<BalancingType>) -> Option<&'static str> {
    match balancing {
        None => None,
        Some(BalancingType::IpHash) => Some("ip_hash"),
        Some(BalancingType::LeastConn) => Some("least_conn"),
    }
}

fn served_over(protocol: ExposeProtocol, transport: ExposeProtocol) -> bool {
    match (protocol, transport) {
        (ExposeProtocol::Both, _) => true,
        (ExposeProtocol::Http, ExposeProtocol::Http) => true,
        (ExposeProtocol::Https, ExposeProtocol::Https) => true,
        (ExposeProtocol::Http | ExposeProtocol::Https, _) => false,
    }
}

/// One upstream per service, in name order
pub fn upstream_views(model: &ProxyModel) -> Vec<UpstreamView> {
    model
        .services
        .values()
        .map(|service| UpstreamView {
            name: service.name.clone(),
            balancing: balancing_directive(service.balancing_type),
            servers: service
                .addresses
                .iter()
                .map(|address| format!("{}:{}", address, service.port))
                .collect(),
        })
        .collect()
}

/// Server blocks per host: plain on port 80 when http is exposed, SSL on
/// port 443 when https is exposed. Each block only routes the services
/// exposed over its transport.
pub fn server_views(model: &ProxyModel, ssl_dir: &Path) -> Vec<ServerView> {
    let mut servers = Vec::new();

    for host in model.hosts.values() {
        if host.protocols.http {
            servers.push(server_view(model, host, ExposeProtocol::Http, ssl_dir));
        }
        if host.protocols.https {
            servers.push(server_view(model, host, ExposeProtocol::Https, ssl_dir));
        }
    }

    servers
}

fn server_view(
    model: &ProxyModel,
    host: &Host,
    transport: ExposeProtocol,
    ssl_dir: &Path,
) -> ServerView {
    let (port, ssl) = match transport {
        ExposeProtocol::Http => (HTTP_PORT, None),
        ExposeProtocol::Https | ExposeProtocol::Both => {
            let ssl = match (&host.ssl_certificate, &host.ssl_certificate_key) {
                (Some(certificate), Some(key)) => Some(SslView {
                    certificate: ssl_dir.join(certificate).display().to_string(),
                    key: ssl_dir.join(key).display().to_string(),
                }),
                _ => None,
            };
            (HTTPS_PORT, ssl)
        }
    };

    let locations = host
        .services
        .iter()
        .filter_map(|name| model.services.get(name))
        .filter(|service| served_over(service.expose_protocol, transport))
        .map(|service| LocationView {
            path: service.location.clone(),
            upstream: service.name.clone(),
            remote_path: service.remote_path.clone(),
        })
        .collect();

    ServerView {
        server_name: if host.is_wildcard() {
            CATCH_ALL_SERVER_NAME.to_string()
        } else {
            host.hostname.clone()
        },
        port,
        default_server: host.is_wildcard(),
        ssl,
        locations,
    }
}
