//! Linkgate - nginx config generation from linked-container environments
//!
//! This library turns an environment snapshot into a reverse-proxy model:
//! - Discovers service instances from `<SERVICE>_<N>_PORT_<P>_TCP_ADDR` link variables
//! - Resolves per-service routing (path, balancing, protocol, hostname)
//! - Groups services into virtual hosts and attaches SSL certificates
//! - Renders the model into an nginx config
//! - Launches and supervises the proxy process

pub mod codec;
pub mod config;
pub mod error;
pub mod hosts;
pub mod model;
pub mod process;
pub mod render;
pub mod resolver;
pub mod scanner;
pub mod snapshot;

pub use error::{ValidationCode, ValidationError};
pub use model::{parse_env, ProxyModel};
pub use snapshot::EnvSnapshot;
