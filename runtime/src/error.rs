//! Error types for the host runtime and system registry.

use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The device layer rejected an operation.
    #[snafu(display("Device error: {source}"))]
    Device { source: tessera_device::Error },

    /// No factory is registered for the requested backend.
    #[snafu(display("Unsupported device: {device}"))]
    UnsupportedDevice { device: String },

    /// A device string could not be parsed.
    #[snafu(display("Invalid device spec '{spec}': {reason}"))]
    InvalidDeviceSpec { spec: String, reason: String },

    /// The backend enumerated no device matching the request.
    #[snafu(display("No {device_type} device on backend {backend}"))]
    NoMatchingDevice { backend: String, device_type: String },
}
