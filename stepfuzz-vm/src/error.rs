use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Errors raised while bringing up the interpreter environment.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A native function with the same name is already registered.
    #[error("Native function already registered: {0}")]
    DuplicateNative(String),

    /// An environment variable could not be parsed into the expected type.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnvVar { var: &'static str, value: String },
}

/// A parse failure, reported the way the interpreter prints it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("syntax error, {message} on line {line}")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
}

impl SyntaxError {
    pub fn new<S: Into<String>>(message: S, line: u32) -> Self {
        SyntaxError {
            message: message.into(),
            line,
        }
    }
}

/// Fatal errors raised by the running program itself.
///
/// These end the request through the interpreter's own fatal path: the message is written to the
/// request output and the request is considered finished.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("{0}")]
    Syntax(SyntaxError),

    #[error("Uncaught {0}")]
    UncaughtException(String),

    #[error("Cannot redeclare {0}()")]
    FunctionRedeclared(String),

    #[error("Cannot declare class {0}, because the name is already in use")]
    ClassRedeclared(String),

    #[error("Maximum function nesting level of {0} reached, aborting")]
    NestingLimit(usize),

    /// Too many nested dispatch invocations (`eval`, `call`, destructors).
    #[error("Maximum re-entry depth of {0} reached, aborting")]
    ReentryLimit(usize),

    #[error("Allowed memory size of {limit} bytes exhausted (tried to allocate {requested} bytes)")]
    MemoryLimit { limit: usize, requested: usize },
}

/// The interpreter's non-local abort.
///
/// Every execution path returns `Result<_, Bailout>`, so raising one unwinds every active frame
/// through `?`. `Fatal` bailouts are caught by the interpreter when the main script finishes.
/// `Provided` bailouts carry an embedder payload; the interpreter never catches them, and neither
/// can `try`/`catch` in the running program.
pub enum Bailout {
    Fatal(FatalError),
    Provided {
        type_name: &'static str,
        provided: Box<dyn Any + 'static>,
    },
}

impl Bailout {
    pub fn fatal(error: FatalError) -> Self {
        Bailout::Fatal(error)
    }

    pub fn provide<A: Any + 'static>(details: A) -> Self {
        Bailout::Provided {
            type_name: std::any::type_name::<A>(),
            provided: Box::new(details),
        }
    }

    pub fn provided_details(&self) -> Option<&dyn Any> {
        match self {
            Bailout::Provided { provided, .. } => Some(provided.as_ref()),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Bailout::Fatal(_))
    }
}

impl From<FatalError> for Bailout {
    fn from(e: FatalError) -> Bailout {
        Bailout::Fatal(e)
    }
}

impl fmt::Debug for Bailout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bailout::")?;
        match self {
            Bailout::Fatal(e) => write!(f, "Fatal({:?})", e),
            Bailout::Provided { type_name, .. } => write!(f, "Provided({})", type_name),
        }
    }
}

impl fmt::Display for Bailout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bailout::Fatal(e) => write!(f, "fatal error: {}", e),
            Bailout::Provided { type_name, .. } => write!(f, "bailout with {} payload", type_name),
        }
    }
}

impl std::error::Error for Bailout {}

/// Failure of a source compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// The compiler itself bailed out before producing anything.
    #[error("compilation aborted: {0}")]
    Bailout(#[from] Bailout),
}

#[test]
fn provided_details_roundtrip() {
    let bailout = Bailout::provide(42u32);
    assert!(!bailout.is_fatal());
    assert_eq!(
        bailout.provided_details().and_then(|d| d.downcast_ref::<u32>()),
        Some(&42)
    );
    assert_eq!(format!("{:?}", bailout), "Bailout::Provided(u32)");
}
