use anyhow::Error as AnyError;
use thiserror::Error;

/// Harness errors.
///
/// These only arise while setting the harness up. Once inputs are running, every outcome is a
/// [`RunStatus`](../harness/enum.RunStatus.html), and anything else is a defect in the harness
/// that panics.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An environment variable could not be parsed.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnvVar { var: &'static str, value: String },

    /// The process-wide harness was already set up.
    #[error("Harness already set up")]
    AlreadySetUp,

    /// The interpreter environment could not be brought up.
    #[error("Interpreter error: {0}")]
    VmError(#[from] stepfuzz_vm::Error),

    /// A catch-all for internal errors that are likely unrecoverable.
    #[error("Internal error: {0}")]
    InternalError(#[source] AnyError),
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Error {
        Error::InternalError(e.into())
    }
}

#[macro_export]
macro_rules! stepfuzz_bail {
    ($e:expr) => {
        return Err(stepfuzz_format_err!($e));
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err(stepfuzz_format_err!($fmt, $($arg)*));
    };
}

#[macro_export(local_inner_macros)]
macro_rules! stepfuzz_ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            stepfuzz_bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            stepfuzz_bail!($fmt, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! stepfuzz_format_err {
    ($($arg:tt)*) => { $crate::error::Error::InternalError(anyhow::format_err!($($arg)*)) }
}
