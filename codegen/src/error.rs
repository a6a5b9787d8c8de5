//! Error types for kernel generation.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The backend rejected a build, bind or launch.
    #[snafu(display("{source}"))]
    Device { source: tessera_device::Error },

    /// `set_arg` named a parameter the kernel never declared.
    #[snafu(display("kernel '{kernel}' has no argument {index}"))]
    UndeclaredArg { kernel: String, index: usize },

    /// A declared parameter had no value when the kernel was launched.
    #[snafu(display("kernel '{kernel}' argument {index} ('{name}') was never bound"))]
    UnboundArg { kernel: String, index: usize, name: String },
}

impl Error {
    /// Build log, when the failure is a program build failure.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Error::Device { source: tessera_device::Error::Compile { log } } => Some(log),
            _ => None,
        }
    }
}

impl From<tessera_device::Error> for Error {
    fn from(source: tessera_device::Error) -> Self {
        Error::Device { source }
    }
}
