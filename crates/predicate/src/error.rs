//! Error types for filter parsing, serialization, composition and query application.

use nom::error::{ErrorKind, ParseError};
use thiserror::Error;

use crate::functions::FunctionError;
use crate::value::{TypeError, ValueError};

/// A filter string, or one of its sub-expressions, could not be turned into a predicate.
///
/// Parsing never produces a partial predicate: the first unrecoverable sub-expression aborts the
/// whole filter and is reported here along with a description of what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at: {token}")]
pub struct FilterSyntaxError {
    /// The sub-expression that could not be resolved
    pub token: String,
    /// A description of what went wrong
    pub reason: String,
}

impl FilterSyntaxError {
    /// Create a new syntax error for the given token.
    pub fn new(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Create a syntax error from a nom ErrorKind with a default message.
    pub fn from_kind(token: &str, kind: ErrorKind) -> Self {
        let reason = match kind {
            ErrorKind::Digit => "expected a number".to_string(),
            ErrorKind::Alpha => "expected an identifier".to_string(),
            ErrorKind::Tag => "unexpected token".to_string(),
            ErrorKind::Char => "unexpected character".to_string(),
            ErrorKind::Eof => "unexpected end of input".to_string(),
            ErrorKind::TakeUntil => "unterminated literal".to_string(),
            _ => format!("parse error: {:?}", kind),
        };
        Self::new(token, reason)
    }

    /// Wraps a type error raised while building a node for `token`.
    pub(crate) fn from_type_error(token: &str, err: TypeError) -> Self {
        Self::new(token, err.to_string())
    }
}

impl<'a> ParseError<&'a str> for FilterSyntaxError {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        Self::from_kind(input, kind)
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Errors raised when a predicate cannot be rendered in a text dialect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    /// A constant of a type the dialect has no literal form for
    #[error("Unsupported data type detected: {0}")]
    UnsupportedLiteral(String),
    /// A function call the dialect cannot express
    #[error("Unsupported method call encountered in query expression: {0}")]
    UnsupportedMethod(String),
    /// A property path deeper than the dialect allows
    #[error(
        "SQL-92 dialect does not allow property navigation '{0}'. Only first level properties are supported."
    )]
    NavigationNotSupported(String),
    /// Any other node kind the dialect cannot express
    #[error("Unsupported expression node encountered in query expression: {0}")]
    UnsupportedNode(String),
}

/// Structural errors raised while merging or inlining expression trees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// An invocation supplied a different number of arguments than the lambda declares
    #[error("lambda/invoke mismatch: lambda declares {params} parameters, invoked with {args}")]
    ArityMismatch { params: usize, args: usize },
    /// The inliner met a node kind it does not rewrite
    #[error("inlining is not implemented for node kind {0}")]
    NotImplemented(&'static str),
    /// The invoked expression is not a lambda
    #[error("node kind {0} cannot be invoked")]
    NotSupported(&'static str),
    /// A predicate lambda must take exactly one parameter
    #[error("a predicate lambda takes exactly one parameter, found {0}")]
    NotAPredicate(usize),
}

/// Errors raised while lowering a host expression into a predicate tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    /// A parameter that is not bound by the lambda being lowered
    #[error("parameter '{0}' is not bound by the predicate lambda")]
    UnboundParameter(String),
    /// A member chain that does not resolve against the record schema
    #[error("property '{path}' does not exist on {schema}")]
    UnknownProperty { path: String, schema: String },
    /// A member access on a constant that is not an object with that field
    #[error("constant has no member '{0}'")]
    UnknownMember(String),
    /// A node kind that has no predicate counterpart
    #[error("expression node {0} cannot be used in a predicate")]
    UnsupportedNode(&'static str),
    /// A method that has no predicate counterpart
    #[error("method '{0}' cannot be used in a predicate")]
    UnsupportedMethod(String),
    /// A conversion that is not a nullable lift
    #[error("conversion from {from} to {to} is not supported")]
    UnsupportedCast { from: String, to: String },
    /// Operands that cannot be combined
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Errors raised while evaluating a compiled predicate against a record.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The record does not expose a field the predicate reads
    #[error("record has no field '{0}'")]
    MissingField(String),
    /// A navigation passed through a null or non-object value
    #[error("cannot read '{field}' from a {found} value")]
    NullNavigation { field: String, found: &'static str },
    /// A value operation failed
    #[error(transparent)]
    Value(#[from] ValueError),
    /// A function call failed
    #[error(transparent)]
    Function(#[from] FunctionError),
    /// A registered constructor rejected its arguments
    #[error("constructor for {type_name} failed: {reason}")]
    Constructor { type_name: String, reason: String },
}

/// Errors raised while parsing or applying query options.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The `$filter` text was rejected
    #[error(transparent)]
    Filter(#[from] FilterSyntaxError),
    /// An option carried a value that could not be parsed
    #[error("invalid value '{value}' for query option '{option}'")]
    InvalidValue { option: String, value: String },
    /// A `$select` field that does not exist on the record type
    #[error("field '{0}' does not exist on the record type")]
    UnknownField(String),
    /// A `$`-prefixed key that is not a query operator
    #[error("'{0}' is not a valid query operator")]
    InvalidOperator(String),
    /// An operator that the target source cannot honour
    #[error("The query operator '{0}' is not supported for event streams")]
    NotSupported(String),
    /// The filter could not be rendered
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    /// A host query could not be composed
    #[error(transparent)]
    Compose(#[from] ComposeError),
    /// A host query could not be lowered into a predicate
    #[error(transparent)]
    Lower(#[from] LowerError),
}
