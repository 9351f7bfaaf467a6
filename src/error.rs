//! Validation errors raised while building the proxy model

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Machine-readable code for each validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    MissingPath,
    InvalidBalancingType,
    InvalidProtocol,
    MissingHostname,
    InvalidRemotePort,
    MissingCertificate,
    CertificateFileNotFound,
    ConflictingServiceName,
    InvalidLinkPattern,
}

impl ValidationCode {
    /// Get the code as a string for log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::MissingPath => "MISSING_PATH",
            ValidationCode::InvalidBalancingType => "INVALID_BALANCING_TYPE",
            ValidationCode::InvalidProtocol => "INVALID_PROTOCOL",
            ValidationCode::MissingHostname => "MISSING_HOSTNAME",
            ValidationCode::InvalidRemotePort => "INVALID_REMOTE_PORT",
            ValidationCode::MissingCertificate => "MISSING_CERTIFICATE",
            ValidationCode::CertificateFileNotFound => "CERTIFICATE_FILE_NOT_FOUND",
            ValidationCode::ConflictingServiceName => "CONFLICTING_SERVICE_NAME",
            ValidationCode::InvalidLinkPattern => "INVALID_LINK_PATTERN",
        }
    }
}

/// A violated rule in the environment. Every variant is fatal for the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Could not find {variable} environment variable for service {service}")]
    MissingPath { service: String, variable: String },

    #[error(
        "Invalid value for {variable}: {value}, must be \"ip_hash\", \"least_conn\", or unset"
    )]
    InvalidBalancingType { variable: String, value: String },

    #[error("Invalid value for {variable}: {value}, must be \"http\", \"https\", or \"both\"")]
    InvalidProtocol { variable: String, value: String },

    #[error("With {protocol_variable}={protocol}, you must supply {variable}")]
    MissingHostname {
        protocol_variable: String,
        protocol: String,
        variable: String,
    },

    #[error("Invalid value for {variable}: {value}, must be a port number between 1 and 65535")]
    InvalidRemotePort { variable: String, value: String },

    #[error("SSL certificate not provided for https host: {host}, please set {variable}")]
    MissingCertificate { host: String, variable: String },

    #[error("SSL certificate file: {} could not be found for {host}", .path.display())]
    CertificateFileNotFound { host: String, path: PathBuf },

    #[error("Link tokens {first_token} and {token} both name service {name}")]
    ConflictingServiceName {
        name: String,
        first_token: String,
        token: String,
    },

    #[error(
        "ENV_PREFIX ({} bytes) cannot be used to match link variables: {reason}",
        .prefix.len()
    )]
    InvalidLinkPattern { prefix: String, reason: String },
}

impl ValidationError {
    pub fn code(&self) -> ValidationCode {
        match self {
            ValidationError::MissingPath { .. } => ValidationCode::MissingPath,
            ValidationError::InvalidBalancingType { .. } => ValidationCode::InvalidBalancingType,
            ValidationError::InvalidProtocol { .. } => ValidationCode::InvalidProtocol,
            ValidationError::MissingHostname { .. } => ValidationCode::MissingHostname,
            ValidationError::InvalidRemotePort { .. } => ValidationCode::InvalidRemotePort,
            ValidationError::MissingCertificate { .. } => ValidationCode::MissingCertificate,
            ValidationError::CertificateFileNotFound { .. } => {
                ValidationCode::CertificateFileNotFound
            }
            ValidationError::ConflictingServiceName { .. } => {
                ValidationCode::ConflictingServiceName
            }
            ValidationError::InvalidLinkPattern { .. } => ValidationCode::InvalidLinkPattern,
        }
    }
}
