//! Attach companion variables to discovered services and validate them

use crate::codec::{
    self, BALANCING_TYPE, EXPOSE_PROTOCOL, HOSTNAME, PATH, REMOTE_PATH, REMOTE_PORT,
};
use crate::error::ValidationError;
use crate::model::{BalancingType, ExposeProtocol, Service, WILDCARD_HOST};
use crate::scanner::{BasePort, DiscoveredService, DEFAULT_PORT};
use crate::snapshot::EnvSnapshot;
use tracing::debug;

/// Default backend path prefix
pub const DEFAULT_REMOTE_PATH: &str = "/";

/// Resolve every discovered service, preserving discovery order.
///
/// Each service is validated before its name is checked against the ones
/// already resolved, so a token missing its own companions reports that first.
pub fn resolve_services(
    discovered: &[DiscoveredService],
    env: &EnvSnapshot,
) -> Result<Vec<Service>, ValidationError> {
    let mut services: Vec<Service> = Vec::with_capacity(discovered.len());

    for (index, service) in discovered.iter().enumerate() {
        let resolved = resolve_service(service, env)?;
        if let Some(first) = discovered[..index].iter().find(|d| d.name == service.name) {
            return Err(ValidationError::ConflictingServiceName {
                name: service.name.clone(),
                first_token: first.token.clone(),
                token: service.token.clone(),
            });
        }
        services.push(resolved);
    }

    Ok(services)
}

/// Resolve a single service.
///
/// Rules are checked in order: path, balancing type, protocol, hostname,
/// remote port. The first violation is returned.
pub fn resolve_service(
    discovered: &DiscoveredService,
    env: &EnvSnapshot,
) -> Result<Service, ValidationError> {
    let token = discovered.token.as_str();
    let key = |suffix: &str| codec::service_key(token, suffix);

    let path_key = key(PATH);
    let location = env
        .lookup(&path_key)
        .ok_or_else(|| ValidationError::MissingPath {
            service: discovered.name.clone(),
            variable: path_key.clone(),
        })?
        .to_string();

    let remote_path = env
        .lookup(&key(REMOTE_PATH))
        .unwrap_or(DEFAULT_REMOTE_PATH)
        .to_string();

    let balancing_key = key(BALANCING_TYPE);
    let balancing_type = match env.lookup_set(&balancing_key) {
        None => None,
        Some(value) => Some(value.parse::<BalancingType>().map_err(|value| {
            ValidationError::InvalidBalancingType {
                variable: balancing_key.clone(),
                value,
            }
        })?),
    };

    let protocol_key = key(EXPOSE_PROTOCOL);
    let expose_protocol = match env.lookup_set(&protocol_key) {
        None => ExposeProtocol::default(),
        Some(value) => value
            .parse::<ExposeProtocol>()
            .map_err(|value| ValidationError::InvalidProtocol {
                variable: protocol_key.clone(),
                value,
            })?,
    };

    let hostname_key = key(HOSTNAME);
    let host = match env.lookup(&hostname_key) {
        Some(hostname) => hostname.to_string(),
        None if expose_protocol.requires_tls() => {
            return Err(ValidationError::MissingHostname {
                protocol_variable: protocol_key,
                protocol: expose_protocol.to_string(),
                variable: hostname_key,
            });
        }
        None => WILDCARD_HOST.to_string(),
    };

    let port = match &discovered.port {
        BasePort::Default => DEFAULT_PORT,
        BasePort::Remote(raw) => parse_port(raw).ok_or_else(|| {
            ValidationError::InvalidRemotePort {
                variable: key(REMOTE_PORT),
                value: raw.clone(),
            }
        })?,
    };

    debug!(
        service = %discovered.name,
        host = %host,
        protocol = %expose_protocol,
        location = %location,
        port,
        addresses = discovered.addresses.len(),
        "Resolved service"
    );

    Ok(Service {
        name: discovered.name.clone(),
        addresses: discovered.addresses.clone(),
        port,
        location,
        remote_path,
        balancing_type,
        expose_protocol,
        host,
    })
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|port| *port > 0)
}
