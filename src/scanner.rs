//! Discovery of linked service instances from `*_PORT_<N>_TCP_ADDR` variables
//!
//! Link variables have the shape
//! `<PREFIX><SERVICE>(_<INSTANCE>)?_PORT_<PORT>_TCP_ADDR=<address>`.
//! Bindings on port 80 are always accepted. Bindings on any other port are
//! only accepted when `<SERVICE>_REMOTE_PORT` says which port to proxy to;
//! otherwise they belong to something else and are skipped.
//!
//! Instance ids are not sorted: addresses appear in snapshot order, which is
//! lexicographic, so `WEBAPP_10_...` comes before `WEBAPP_2_...`.

use crate::codec::{self, REMOTE_PORT};
use crate::error::ValidationError;
use crate::snapshot::EnvSnapshot;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info};

/// Port every link is assumed to serve unless a remote port is given
pub const DEFAULT_PORT: u16 = 80;

/// Where a service's backend port comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasePort {
    /// First binding was on port 80
    Default,
    /// Raw `<SERVICE>_REMOTE_PORT` value, validated by the resolver
    Remote(String),
}

/// A service as found in the environment, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    /// Display name, e.g. `webapp`
    pub name: String,
    /// Variable token companion lookups are keyed by, e.g. `WEBAPP`
    pub token: String,
    pub addresses: Vec<String>,
    pub port: BasePort,
}

/// Compiled size cap for the link pattern. Only an oversized `ENV_PREFIX`
/// can reach it.
pub const LINK_PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Build the link variable pattern for a prefix (may be empty)
pub fn link_pattern(prefix: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!(
        r"^{}(?P<service_name>[a-zA-Z_]+)(_\d+)?_PORT_(?P<service_port>\d+)_TCP_ADDR$",
        regex::escape(prefix)
    ))
    .size_limit(LINK_PATTERN_SIZE_LIMIT)
    .build()
}

/// Scan the snapshot for link variables and group them by service token.
///
/// Services are returned in the order they were first encountered. Tokens
/// are compared exactly, so `WEBAPP` and `webapp` are separate services.
pub fn scan_links(env: &EnvSnapshot) -> Result<Vec<DiscoveredService>, ValidationError> {
    let pattern =
        link_pattern(env.prefix()).map_err(|e| ValidationError::InvalidLinkPattern {
            prefix: env.prefix().to_string(),
            reason: e.to_string(),
        })?;

    let mut services: Vec<DiscoveredService> = Vec::new();

    for (var, address) in env.iter() {
        let Some(caps) = pattern.captures(var) else {
            continue;
        };
        let token = &caps["service_name"];
        let is_default_port =
            caps["service_port"].parse::<u32>().ok() == Some(u32::from(DEFAULT_PORT));

        let port = if is_default_port {
            BasePort::Default
        } else {
            match env.lookup(&codec::service_key(token, REMOTE_PORT)) {
                Some(remote) => BasePort::Remote(remote.to_string()),
                None => {
                    debug!(variable = var, "Skipping link without remote port");
                    continue;
                }
            }
        };

        match services.iter_mut().find(|s| s.token == token) {
            Some(service) => service.addresses.push(address.to_string()),
            None => {
                let name = codec::service_name(token);
                info!(service = %name, token, "Found service");
                services.push(DiscoveredService {
                    name,
                    token: token.to_string(),
                    addresses: vec![address.to_string()],
                    port,
                });
            }
        }
    }

    Ok(services)
}
