use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected token, expected {0}")]
    Expected(String),
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),
    #[error("unknown root identifier {0:?}, expected one of: context, input, output")]
    UnknownIdentifier(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("{0} expects {1} argument(s), got {2}")]
    ArityMismatch(&'static str, usize, usize),
    #[error("cannot apply {0} to non-numeric operand")]
    NotNumeric(&'static str),
    #[error("division by zero")]
    DivisionByZero,
}
