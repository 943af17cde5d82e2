use thiserror::Error;

use crate::pin::PinType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while defining part types or building the connection graph
#[derive(Error, Debug)]
pub enum Error {
    #[error("part type {part_type} defines pin alias {alias} more than once")]
    DuplicateAlias { part_type: String, alias: String },
    #[error("pin at position {position} has no aliases")]
    EmptyPinAliases { position: usize },
    #[error("couldn't find voltage well pin {well} for pin {pin} on part {part}")]
    UnknownWellPin {
        part: String,
        pin: String,
        well: String,
    },
    #[error("well pin {well} of pin {pin} on part {part} is not a power pin (but is {found})")]
    InvalidWellPinType {
        part: String,
        pin: String,
        well: String,
        found: PinType,
    },
    #[error("part {part} has no pin {pin}")]
    UnknownPin { part: String, pin: String },
    #[error("part {part} has {count} {pin_type} pins, can't pick one to connect")]
    AmbiguousPinSelection {
        part: String,
        pin_type: PinType,
        count: usize,
    },
    #[error("part {part} has no {pin_type} pin to connect")]
    NoSuchPinType { part: String, pin_type: PinType },
    #[error("{pin} pin is already connected to a net ({net}), can't connect to {new_net} too")]
    PinAlreadyConnected {
        pin: String,
        net: String,
        new_net: String,
    },
    #[error("can't connect net {other} to net {net}, nets are never merged")]
    NetToNetConnectionUnsupported { net: String, other: String },
    #[error("don't know how to connect {0} to a net")]
    UnsupportedConnectTarget(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Part library parse errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected end of input at {at:?}")]
    UnexpectedEof { at: logos::Span },
    #[error("Expected {expected} but found {found} at {at:?}")]
    UnexpectedToken {
        expected: String,
        found: String,
        at: logos::Span,
    },
    #[error("Unknown token {found} at {at:?}")]
    UnknownToken { found: String, at: logos::Span },
    #[error("SExpr {0} not found")]
    MissingChild(String),
    #[error("Value not found for {0}")]
    MissingValue(String),
    #[error("Unknown pin type {0}")]
    UnknownPinType(String),
    #[error("Expected ({expected} ...) but found ({found} ...)")]
    UnexpectedForm { expected: String, found: String },
}
