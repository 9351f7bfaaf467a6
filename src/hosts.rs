//! Fold resolved services into virtual hosts and attach SSL certificates

use crate::codec::{self, SSL_CERTIFICATE, SSL_CERTIFICATE_KEY};
use crate::error::ValidationError;
use crate::model::{Host, Service};
use crate::snapshot::EnvSnapshot;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Group services by host and validate certificates for https hosts.
///
/// Each host lists its services in the order they were given. Certificate
/// names are resolved relative to `cert_dir` and must exist as files.
pub fn aggregate_hosts(
    services: &[Service],
    env: &EnvSnapshot,
    cert_dir: &Path,
) -> Result<BTreeMap<String, Host>, ValidationError> {
    let mut hosts: BTreeMap<String, Host> = BTreeMap::new();

    for service in services {
        let host = hosts
            .entry(service.host.clone())
            .or_insert_with(|| Host::new(&service.host));
        host.services.push(service.name.clone());
        host.protocols.enable(service.expose_protocol);
    }

    for host in hosts.values_mut() {
        if host.protocols.https {
            attach_certificates(host, env, cert_dir)?;
        }
        debug!(
            host = %host.hostname,
            http = host.protocols.http,
            https = host.protocols.https,
            services = ?host.services,
            "Aggregated host"
        );
    }

    Ok(hosts)
}

fn attach_certificates(
    host: &mut Host,
    env: &EnvSnapshot,
    cert_dir: &Path,
) -> Result<(), ValidationError> {
    let certificate = require_certificate(host, env, SSL_CERTIFICATE)?;
    let key = require_certificate(host, env, SSL_CERTIFICATE_KEY)?;

    for name in [&certificate, &key] {
        let path = cert_dir.join(name);
        if !path.is_file() {
            return Err(ValidationError::CertificateFileNotFound {
                host: host.hostname.clone(),
                path,
            });
        }
    }

    info!(
        host = %host.hostname,
        certificate = %certificate,
        key = %key,
        "SSL enabled"
    );

    host.ssl_certificate = Some(certificate);
    host.ssl_certificate_key = Some(key);
    Ok(())
}

fn require_certificate(
    host: &Host,
    env: &EnvSnapshot,
    suffix: &str,
) -> Result<String, ValidationError> {
    let variable = codec::host_key(&host.hostname, suffix);
    env.lookup(&variable)
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingCertificate {
            host: host.hostname.clone(),
            variable,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExposeProtocol, WILDCARD_HOST};
    use std::fs;
    use tempfile::TempDir;

    fn service(name: &str, host: &str, protocol: ExposeProtocol) -> Service {
        Service {
            name: name.to_string(),
            addresses: vec!["10.0.0.2".to_string()],
            port: 80,
            location: format!("/{}/", name),
            remote_path: "/".to_string(),
            balancing_type: None,
            expose_protocol: protocol,
            host: host.to_string(),
        }
    }

    fn cert_dir_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), "---").unwrap();
        }
        dir
    }

    #[test]
    fn test_http_only_host_needs_no_certificates() {
        let services = vec![
            service("webapp", WILDCARD_HOST, ExposeProtocol::Http),
            service("api", WILDCARD_HOST, ExposeProtocol::Http),
        ];
        let hosts = aggregate_hosts(
            &services,
            &EnvSnapshot::default(),
            Path::new("/nonexistent"),
        )
        .unwrap();

        assert_eq!(hosts.len(), 1);
        let host = &hosts[WILDCARD_HOST];
        assert!(host.protocols.http);
        assert!(!host.protocols.https);
        assert_eq!(host.services, vec!["webapp", "api"]);
        assert!(host.ssl_certificate.is_none());
    }

    #[test]
    fn test_protocols_merge() {
        let dir = cert_dir_with(&["site.pem", "site.key"]);
        let env = EnvSnapshot::from_pairs([
            ("EXAMPLE_COM_SSL_CERTIFICATE", "site.pem"),
            ("EXAMPLE_COM_SSL_CERTIFICATE_KEY", "site.key"),
        ]);
        let services = vec![
            service("webapp", "example.com", ExposeProtocol::Http),
            service("api", "example.com", ExposeProtocol::Https),
        ];

        let hosts = aggregate_hosts(&services, &env, dir.path()).unwrap();
        let host = &hosts["example.com"];
        assert!(host.protocols.http);
        assert!(host.protocols.https);
        assert_eq!(host.ssl_certificate.as_deref(), Some("site.pem"));
        assert_eq!(host.ssl_certificate_key.as_deref(), Some("site.key"));
    }

    #[test]
    fn test_missing_certificate() {
        let dir = cert_dir_with(&["site.pem", "site.key"]);
        let services = vec![service("api", "example.com", ExposeProtocol::Https)];

        let err = aggregate_hosts(&services, &EnvSnapshot::default(), dir.path()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingCertificate {
                host: "example.com".to_string(),
                variable: "EXAMPLE_COM_SSL_CERTIFICATE".to_string(),
            }
        );

        let env = EnvSnapshot::from_pairs([("EXAMPLE_COM_SSL_CERTIFICATE", "site.pem")]);
        let err = aggregate_hosts(&services, &env, dir.path()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingCertificate {
                host: "example.com".to_string(),
                variable: "EXAMPLE_COM_SSL_CERTIFICATE_KEY".to_string(),
            }
        );
    }

    #[test]
    fn test_certificate_file_not_found() {
        let dir = cert_dir_with(&["site.pem"]);
        let env = EnvSnapshot::from_pairs([
            ("EXAMPLE_COM_SSL_CERTIFICATE", "site.pem"),
            ("EXAMPLE_COM_SSL_CERTIFICATE_KEY", "site.key"),
        ]);
        let services = vec![service("api", "example.com", ExposeProtocol::Both)];

        let err = aggregate_hosts(&services, &env, dir.path()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::CertificateFileNotFound {
                host: "example.com".to_string(),
                path: dir.path().join("site.key"),
            }
        );
    }

    #[test]
    fn test_certificate_must_be_a_file() {
        let dir = cert_dir_with(&["site.key"]);
        fs::create_dir(dir.path().join("site.pem")).unwrap();
        let env = EnvSnapshot::from_pairs([
            ("EXAMPLE_COM_SSL_CERTIFICATE", "site.pem"),
            ("EXAMPLE_COM_SSL_CERTIFICATE_KEY", "site.key"),
        ]);
        let services = vec![service("api", "example.com", ExposeProtocol::Https)];

        let err = aggregate_hosts(&services, &env, dir.path()).unwrap_err();
        assert!(matches!(err, ValidationError::CertificateFileNotFound { .. }));
    }

    #[test]
    fn test_hosts_are_independent() {
        let dir = cert_dir_with(&["a.pem", "a.key"]);
        let env = EnvSnapshot::from_pairs([
            ("A_EXAMPLE_COM_SSL_CERTIFICATE", "a.pem"),
            ("A_EXAMPLE_COM_SSL_CERTIFICATE_KEY", "a.key"),
        ]);
        let services = vec![
            service("secure", "a.example.com", ExposeProtocol::Https),
            service("plain", "b.example.com", ExposeProtocol::Http),
        ];

        let hosts = aggregate_hosts(&services, &env, dir.path()).unwrap();
        assert_eq!(hosts.len(), 2);
        assert!(hosts["a.example.com"].ssl_certificate.is_some());
        assert!(hosts["b.example.com"].ssl_certificate.is_none());
        assert_eq!(hosts["b.example.com"].services, vec!["plain"]);
    }
}
