//! Error types for the Art-Net ingestion engine

use std::io;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Transport and socket errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("Failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Port {0} is already in use by another application")]
    AddressInUse(u16),

    #[error("Permission denied binding port {0}")]
    PermissionDenied(u16),

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(#[source] io::Error),

    #[error("Receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    #[error("Send failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("OSC encoding failed: {0}")]
    OscEncode(String),

    #[error("Receiver already running")]
    AlreadyRunning,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[source] io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port: {0}")]
    InvalidPort(u32),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid OSC target: {0}")]
    InvalidTarget(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
