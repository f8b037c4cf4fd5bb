// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

/// A grammar error found while compiling a query expression.
///
/// Every variant identifies the token that caused it. None of them is
/// recoverable: callers abort with a usage status.
#[derive(Debug)]
pub enum Error {
    /// A `(` without the matching `)`.
    UnbalancedOpen,
    /// A `)` without the matching `(`.
    UnbalancedClose,
    /// A `( )` group without an expression inside.
    EmptyParentheses,
    /// A binary or unary operator without a following (or preceding)
    /// expression.
    MissingOperand { operator: String },
    /// A predicate or action cut short by the end of the arguments.
    MissingArgument { token: String },
    UnknownAction { token: String },
    /// An action where only a filter expression is allowed.
    UnexpectedAction { token: String },
    /// A path given after the expression started.
    PathAfterExpression { token: String },
    InvalidArgument {
        token: String,
        argument: String,
        reason: String,
    },
    InvalidPattern {
        token: String,
        pattern: String,
        source: regex::Error,
    },
}

impl Error {

    pub(crate) fn invalid_argument<R: Into<String>>(
        token: &str,
        argument: &str,
        reason: R,
    ) -> Error {
        Error::InvalidArgument {
            token: token.to_owned(),
            argument: argument.to_owned(),
            reason: reason.into(),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Error::*;

        match *self {
            UnbalancedOpen => write!(fmt, "invalid expression: missing ')'"),
            UnbalancedClose => write!(
                fmt,
                "invalid expression: ')' without a matching '('"
            ),
            EmptyParentheses => write!(
                fmt,
                "invalid expression: empty parentheses are not allowed"
            ),
            MissingOperand { ref operator } => write!(
                fmt,
                "invalid expression: '{}' is missing an operand",
                operator
            ),
            MissingArgument { ref token } => {
                write!(fmt, "missing argument to '{}'", token)
            }
            UnknownAction { ref token } => {
                write!(fmt, "unknown predicate or action '{}'", token)
            }
            UnexpectedAction { ref token } => write!(
                fmt,
                "action '{}' is not allowed in a filter expression",
                token
            ),
            PathAfterExpression { ref token } => write!(
                fmt,
                "paths must precede the expression: '{}'",
                token
            ),
            InvalidArgument { ref token, ref argument, ref reason } => write!(
                fmt,
                "invalid argument '{}' to '{}': {}",
                argument,
                token,
                reason
            ),
            InvalidPattern { ref token, ref pattern, ref source } => write!(
                fmt,
                "invalid pattern '{}' to '{}': {}",
                pattern,
                token,
                source
            ),
        }
    }
}
