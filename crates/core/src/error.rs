//! Evaluator errors and thrown values
//!
//! Errors raised by the core are values: an `ErrorData` cell carrying a
//! symbolic id, the offending values, and where evaluation stood when it
//! was raised. A non-local exit — an error, a thrown value, a halt — is a
//! `Thrown` traveling down the `Err` arm of `Result`, so every frame's
//! bookkeeping runs on the way out and nothing can be silently ignored.
//! Panics are reserved for violated internal invariants.

use crate::series::SeriesRef;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Symbolic error ids raised by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A word evaluated to UNSET.
    NoValue,
    /// A set-word's expression produced UNSET.
    NeedValue,
    /// An infix function with no left-hand argument.
    NoOpArg,
    /// Argument fulfillment hit the end of the block.
    NoArg,
    /// A named refinement was not found in the spec.
    NoRefine,
    /// A refinement token was not a word.
    BadRefine,
    /// An argument failed its parameter type check.
    ArgType,
    /// A spec contained a reserved form.
    InvalidArg,
    /// A path head has no dispatcher and is not a function.
    BadPathType,
    /// A selector could not be applied.
    InvalidPath,
    /// A set-path could not store.
    BadPathSet,
    /// A field assignment was rejected for the value's type.
    BadFieldSet,
    /// A position selector fell outside the series.
    OutOfRange,
    /// More values than the operation can accept.
    TooLong,
    /// A kind the evaluator refuses to evaluate.
    BadEvalType,
    /// The data stack or evaluator recursion hit its ceiling.
    StackOverflow,
    /// The escape signal was serviced.
    Halt,
    /// The cumulative evaluation ceiling was exceeded.
    Security,
    /// Catch-all for structural failures.
    Misc,
}

impl ErrorKind {
    /// The symbolic id, as a script would see it.
    pub fn id(self) -> &'static str {
        match self {
            ErrorKind::NoValue => "no-value",
            ErrorKind::NeedValue => "need-value",
            ErrorKind::NoOpArg => "no-op-arg",
            ErrorKind::NoArg => "no-arg",
            ErrorKind::NoRefine => "no-refine",
            ErrorKind::BadRefine => "bad-refine",
            ErrorKind::ArgType => "arg-type",
            ErrorKind::InvalidArg => "invalid-arg",
            ErrorKind::BadPathType => "bad-path-type",
            ErrorKind::InvalidPath => "invalid-path",
            ErrorKind::BadPathSet => "bad-path-set",
            ErrorKind::BadFieldSet => "bad-field-set",
            ErrorKind::OutOfRange => "out-of-range",
            ErrorKind::TooLong => "too-long",
            ErrorKind::BadEvalType => "bad-evaltype",
            ErrorKind::StackOverflow => "stack-overflow",
            ErrorKind::Halt => "halt",
            ErrorKind::Security => "security",
            ErrorKind::Misc => "misc",
        }
    }

    /// The error type grouping the id.
    pub fn type_id(self) -> &'static str {
        match self {
            ErrorKind::StackOverflow | ErrorKind::Misc => "internal",
            ErrorKind::Halt | ErrorKind::Security => "throw",
            _ => "script",
        }
    }
}

/// An error value: type and id plus detail.
#[derive(Debug, Clone)]
pub struct ErrorData {
    pub kind: ErrorKind,
    /// Offending values, in raise order.
    pub args: Vec<Value>,
    /// Block and position where evaluation stood when raised.
    pub near: Option<SeriesRef>,
}

impl ErrorData {
    pub fn new(kind: ErrorKind, args: Vec<Value>) -> Self {
        ErrorData {
            kind,
            args,
            near: None,
        }
    }

    pub fn with_near(mut self, near: SeriesRef) -> Self {
        self.near = Some(near);
        self
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind.type_id(), self.kind.id())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorData {}

/// A value propagating a non-local exit until caught by a trap.
#[derive(Debug, Clone)]
pub struct Thrown(pub Value);

impl Thrown {
    pub fn error(data: ErrorData) -> Self {
        Thrown(Value::Error(Rc::new(data)))
    }

    /// A plain thrown value (THROW and friends), not an error.
    pub fn value(value: Value) -> Self {
        Thrown(value)
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn as_error(&self) -> Option<&ErrorData> {
        match &self.0 {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.as_error().map(|e| e.kind)
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_error() {
            Some(e) => write!(f, "{}", e),
            None => write!(f, "thrown: {}", self.0),
        }
    }
}
