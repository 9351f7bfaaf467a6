//! Mapping between names and the upper-case, underscore-delimited tokens used
//! as environment variable prefixes.

pub const PATH: &str = "PATH";
pub const REMOTE_PATH: &str = "REMOTE_PATH";
pub const REMOTE_PORT: &str = "REMOTE_PORT";
pub const BALANCING_TYPE: &str = "BALANCING_TYPE";
pub const EXPOSE_PROTOCOL: &str = "EXPOSE_PROTOCOL";
pub const HOSTNAME: &str = "HOSTNAME";
pub const SSL_CERTIFICATE: &str = "SSL_CERTIFICATE";
pub const SSL_CERTIFICATE_KEY: &str = "SSL_CERTIFICATE_KEY";

/// Display name of a service from its variable token: `WEBAPP` -> `webapp`
pub fn service_name(token: &str) -> String {
    token.to_lowercase()
}

/// Convert a hostname to its token form: `www.example.com` -> `WWW_EXAMPLE_COM`
pub fn host_token(hostname: &str) -> String {
    hostname.replace('.', "_").to_uppercase()
}

/// Key of a per-service companion variable, e.g. `WEBAPP_PATH`
pub fn service_key(token: &str, suffix: &str) -> String {
    format!("{}_{}", token, suffix)
}

/// Key of a per-host variable, e.g. `WWW_EXAMPLE_COM_SSL_CERTIFICATE`
pub fn host_key(hostname: &str, suffix: &str) -> String {
    format!("{}_{}", host_token(hostname), suffix)
}
