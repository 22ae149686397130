//! Error handling for kiln.
//! Defines the error taxonomy shared by the scanner, parser, evaluator and renderer.

use std::fmt;
use std::io;
use thiserror::Error;

/// Position of a construct in template source, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Parse-time failures. Always fatal for the template being compiled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxErrorKind {
    #[error("unterminated {0}")]
    UnterminatedTag(String),

    #[error("unbalanced block: {0}")]
    UnbalancedBlock(String),

    #[error("unknown directive '{0}'")]
    UnknownDirective(String),

    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    #[error("<%page> declared more than once")]
    DuplicatePageArgs,

    #[error("<%page> must appear before any other content")]
    MisplacedPageArgs,

    #[error("parameter '{0}' declared more than once")]
    DuplicateParameter(String),
}

/// Render-time type failures raised by the expression evaluator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeErrorKind {
    #[error("'{0}' object is not callable")]
    NotCallable(String),

    #[error("'{0}' object is not iterable")]
    NotIterable(String),

    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {0} out of range")]
    IndexOutOfRange(i64),

    #[error("'{0}' object is not subscriptable")]
    NotSubscriptable(String),

    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("cannot unpack {found} values into {expected} names")]
    UnpackMismatch { expected: usize, found: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures reported by an include resolver.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("template '{identity}' not found")]
    NotFound { identity: String },

    #[error("cannot read template '{identity}': {source}")]
    Io {
        identity: String,
        #[source]
        source: io::Error,
    },
}

/// Custom error types for kiln operations.
///
/// Parse errors abort compilation of a template entirely; every other
/// variant aborts the render call it was raised in.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Syntax error: {kind} at {location}.")]
    SyntaxError {
        kind: SyntaxErrorKind,
        location: Location,
    },

    #[error("Name error: '{name}' is not defined.")]
    NameError { name: String },

    #[error("Type error: {kind}.")]
    TypeError { kind: TypeErrorKind },

    #[error("Missing required argument '{name}'.")]
    MissingArgument { name: String },

    #[error("Include of '{identity}' failed: {cause}")]
    IncludeError {
        identity: String,
        #[source]
        cause: Box<Error>,
    },

    #[error("Include depth limit of {depth} exceeded.")]
    RecursionLimitExceeded { depth: usize },

    #[error("Iteration limit of {limit} exceeded.")]
    IterationLimitExceeded { limit: usize },

    #[error("Resolution error: {0}.")]
    Resolution(#[from] ResolutionError),

    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    #[error("Configuration error: {0}.")]
    ConfigError(String),
}

impl Error {
    pub fn syntax(kind: SyntaxErrorKind, location: Location) -> Self {
        Error::SyntaxError { kind, location }
    }

    pub fn type_error(kind: TypeErrorKind) -> Self {
        Error::TypeError { kind }
    }

    pub fn name_error(name: impl Into<String>) -> Self {
        Error::NameError { name: name.into() }
    }

    pub fn invalid_operand(message: impl Into<String>) -> Self {
        Error::TypeError {
            kind: TypeErrorKind::InvalidOperand(message.into()),
        }
    }
}

/// Convenience type alias for Results with kiln's Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - Any displayable error raised by the command-line front end
pub fn default_error_handler<E: fmt::Display>(err: E) {
    eprintln!("{err}");
    std::process::exit(1);
}
