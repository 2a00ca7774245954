//! Broker server: accept loop, per-connection handlers, configuration

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::Broker;
