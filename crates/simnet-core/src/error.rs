//! Error types for the driver core
//!
//! Packet handling never surfaces errors: drops and stalls degrade to
//! statistics. Only bring-up and the configuration entry points
//! (`change_mtu`, `set_config`) return a [`DriverError`].

use thiserror::Error;

/// Errors reported by the host stack through [`crate::stack::HostStack`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// The stack refused the device
    #[error("Registration rejected: {0}")]
    Rejected(String),

    /// A device with the same name is already registered
    #[error("Device name already in use: {0}")]
    Duplicate(String),
}

/// Errors that can occur in driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    /// A device failed to register during bring-up
    #[error("Failed to register device \"{device}\": {source}")]
    Registration {
        /// Name of the device that failed
        device: String,
        /// Error returned by the host stack
        #[source]
        source: StackError,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// MTU outside the Ethernet range
    #[error("Invalid MTU {0} (must be {min}..={max})", min = crate::ether::ETH_MIN_MTU, max = crate::ether::ETH_DATA_LEN)]
    InvalidMtu(usize),

    /// Operation not allowed while the device is up
    #[error("Device busy")]
    Busy,

    /// Operation not supported by a simulated device
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// Pool setup attempted on a pool that still holds buffers
    #[error("Packet pool already set up")]
    PoolActive,
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
