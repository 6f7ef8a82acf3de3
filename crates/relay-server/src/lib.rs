//! WebSocket transport for the Relay workflow runtime.

pub mod config;
pub mod connection;
pub mod health;
pub mod server;
pub mod settings;
pub mod shutdown;

pub use config::ServerConfig;
pub use connection::{ConnectionRegistry, WsTransport};
pub use server::{RelayServer, ServerHandle};
pub use settings::{LoggingSettings, Settings, SettingsError};
pub use shutdown::ShutdownCoordinator;
