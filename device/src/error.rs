use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The backend reported a native error code.
    #[snafu(display("{} ({}): {detail}", code.message(), *code as i32))]
    Runtime { code: ErrorCode, detail: String },

    /// Program build failed; `log` is the device compiler output.
    #[snafu(display("program build failed:\n{log}"))]
    Compile { log: String },

    /// A kernel argument was never declared or never bound.
    #[snafu(display("kernel '{kernel}' argument {index}: {reason}"))]
    Bind { kernel: String, index: usize, reason: String },

    /// The device lacks a capability the operation needs.
    #[snafu(display("device does not support '{extension}'"))]
    ExtensionUnsupported { extension: String },

    /// A kernel faulted while running.
    #[snafu(display("kernel '{kernel}' faulted: {message}"))]
    Execution { kernel: String, message: String },
}

impl Error {
    /// Native error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Runtime { code, .. } => *code,
            Error::Compile { .. } => ErrorCode::BuildProgramFailure,
            Error::Bind { .. } => ErrorCode::InvalidKernelArgs,
            Error::ExtensionUnsupported { .. } => ErrorCode::InvalidOperation,
            Error::Execution { .. } => ErrorCode::OutOfResources,
        }
    }

    pub fn runtime(code: ErrorCode, detail: impl Into<String>) -> Self {
        Error::Runtime { code, detail: detail.into() }
    }
}

/// Native compute-runtime status codes (OpenCL numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::FromRepr, strum::EnumIter)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    DeviceNotFound = -1,
    DeviceNotAvailable = -2,
    CompilerNotAvailable = -3,
    MemObjectAllocationFailure = -4,
    OutOfResources = -5,
    OutOfHostMemory = -6,
    ProfilingInfoNotAvailable = -7,
    MemCopyOverlap = -8,
    ImageFormatMismatch = -9,
    ImageFormatNotSupported = -10,
    BuildProgramFailure = -11,
    MapFailure = -12,
    InvalidValue = -30,
    InvalidDeviceType = -31,
    InvalidPlatform = -32,
    InvalidDevice = -33,
    InvalidContext = -34,
    InvalidQueueProperties = -35,
    InvalidCommandQueue = -36,
    InvalidHostPtr = -37,
    InvalidMemObject = -38,
    InvalidImageFormatDescriptor = -39,
    InvalidImageSize = -40,
    InvalidSampler = -41,
    InvalidBinary = -42,
    InvalidBuildOptions = -43,
    InvalidProgram = -44,
    InvalidProgramExecutable = -45,
    InvalidKernelName = -46,
    InvalidKernelDefinition = -47,
    InvalidKernel = -48,
    InvalidArgIndex = -49,
    InvalidArgValue = -50,
    InvalidArgSize = -51,
    InvalidKernelArgs = -52,
    InvalidWorkDimension = -53,
    InvalidWorkGroupSize = -54,
    InvalidWorkItemSize = -55,
    InvalidGlobalOffset = -56,
    InvalidEventWaitList = -57,
    InvalidEvent = -58,
    InvalidOperation = -59,
    InvalidGlObject = -60,
    InvalidBufferSize = -61,
    InvalidMipLevel = -62,
    InvalidGlobalWorkSize = -63,
}

impl ErrorCode {
    /// Looks up a raw status code; unknown values yield `None`.
    pub fn from_raw(code: i32) -> Option<Self> {
        Self::from_repr(code)
    }

    pub const fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::DeviceNotFound => "Device Not Found",
            Self::DeviceNotAvailable => "Device Not Available",
            Self::CompilerNotAvailable => "Compiler Not Available",
            Self::MemObjectAllocationFailure => "Memory Object Allocation Failure",
            Self::OutOfResources => "Out of Resources",
            Self::OutOfHostMemory => "Out of Host Memory",
            Self::ProfilingInfoNotAvailable => "Profiling Information Not Available",
            Self::MemCopyOverlap => "Memory Copy Overlap",
            Self::ImageFormatMismatch => "Image Format Mismatch",
            Self::ImageFormatNotSupported => "Image Format Not Supported",
            Self::BuildProgramFailure => "Build Program Failure",
            Self::MapFailure => "Map Failure",
            Self::InvalidValue => "Invalid Value",
            Self::InvalidDeviceType => "Invalid Device Type",
            Self::InvalidPlatform => "Invalid Platform",
            Self::InvalidDevice => "Invalid Device",
            Self::InvalidContext => "Invalid Context",
            Self::InvalidQueueProperties => "Invalid Queue Properties",
            Self::InvalidCommandQueue => "Invalid Command Queue",
            Self::InvalidHostPtr => "Invalid Host Pointer",
            Self::InvalidMemObject => "Invalid Memory Object",
            Self::InvalidImageFormatDescriptor => "Invalid Image Format Descriptor",
            Self::InvalidImageSize => "Invalid Image Size",
            Self::InvalidSampler => "Invalid Sampler",
            Self::InvalidBinary => "Invalid Binary",
            Self::InvalidBuildOptions => "Invalid Build Options",
            Self::InvalidProgram => "Invalid Program",
            Self::InvalidProgramExecutable => "Invalid Program Executable",
            Self::InvalidKernelName => "Invalid Kernel Name",
            Self::InvalidKernelDefinition => "Invalid Kernel Definition",
            Self::InvalidKernel => "Invalid Kernel",
            Self::InvalidArgIndex => "Invalid Argument Index",
            Self::InvalidArgValue => "Invalid Argument Value",
            Self::InvalidArgSize => "Invalid Argument Size",
            Self::InvalidKernelArgs => "Invalid Kernel Arguments",
            Self::InvalidWorkDimension => "Invalid Work Dimension",
            Self::InvalidWorkGroupSize => "Invalid Work Group Size",
            Self::InvalidWorkItemSize => "Invalid Work Item Size",
            Self::InvalidGlobalOffset => "Invalid Global Offset",
            Self::InvalidEventWaitList => "Invalid Event Wait List",
            Self::InvalidEvent => "Invalid Event",
            Self::InvalidOperation => "Invalid Operation",
            Self::InvalidGlObject => "Invalid GL Object",
            Self::InvalidBufferSize => "Invalid Buffer Size",
            Self::InvalidMipLevel => "Invalid MIP Level",
            Self::InvalidGlobalWorkSize => "Invalid Global Work Size",
        }
    }

    /// Message for a raw status code, including codes outside the table.
    pub fn message_for(code: i32) -> &'static str {
        Self::from_raw(code).map_or("Unknown Error Code", |c| c.message())
    }
}
