use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Device { source: tessera_device::Error },

    #[snafu(display("{source}"))]
    Codegen { source: tessera_codegen::Error },

    /// Resolving the default device, context or queue failed.
    #[snafu(display("default system: {source}"))]
    System { source: tessera_runtime::Error },

    /// An algorithm needed physical storage behind an iterator that has none.
    #[snafu(display("{iterator} has no backing buffer"))]
    NoStorage { iterator: &'static str },

    #[snafu(display("index {index} is out of range for a vector of {len} elements"))]
    IndexOutOfRange { index: usize, len: usize },
}

impl Error {
    /// Device build log, when the failure is a program build failure.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Error::Device { source: tessera_device::Error::Compile { log } } => Some(log),
            Error::Codegen { source } => source.build_log(),
            _ => None,
        }
    }
}

impl From<tessera_device::Error> for Error {
    fn from(source: tessera_device::Error) -> Self {
        Error::Device { source }
    }
}

impl From<tessera_codegen::Error> for Error {
    fn from(source: tessera_codegen::Error) -> Self {
        Error::Codegen { source }
    }
}
