//! Tagged status codes - `no_std` compatible.
//!
//! Every fallible operation in the SDK returns [`Result`]. The error type is a
//! single `#[repr(u32)]` enum whose numeric value carries three fields:
//!
//! - bit 31: failure flag (always set for an [`Error`]; success is `Ok`)
//! - bits 16..30: [`Facility`] that produced the error
//! - bits 0..15: error code within the facility
//!
//! Callers may log or switch on the numeric value ([`Error::as_u32`]); the
//! layout is part of the public contract and round-trips through
//! [`Error::from_u32`].

use core::fmt;

/// Result type alias used across all azlite crates.
pub type Result<T> = core::result::Result<T, Error>;

/// Bit 31 of every error value.
pub const FAILURE_FLAG: u32 = 0x8000_0000;

const fn make_error(facility: u32, code: u32) -> u32 {
    FAILURE_FLAG | (facility << 16) | code
}

/// The subsystem a status value originates from (bits 16..30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Facility {
    /// Spans, contexts and other shared primitives.
    Core = 1,
    /// The host platform port.
    Platform = 2,
    /// JSON payload handling.
    Json = 3,
    /// The HTTP request/response pipeline.
    Http = 4,
    /// The MQTT event pipeline.
    Mqtt = 5,
    /// IoT topic and payload codecs.
    Iot = 6,
    /// The hierarchical state machine runtime.
    Hfsm = 7,
}

/// Error codes for all azlite facilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Error {
    /// The operation was cancelled by its context deadline or an explicit
    /// cancellation.
    Canceled = make_error(Facility::Core as u32, 1),
    /// An input argument is outside its documented domain.
    InvalidArg = make_error(Facility::Core as u32, 2),
    /// The destination span is too small to hold the result. Nothing was
    /// written.
    InsufficientSpanSize = make_error(Facility::Core as u32, 3),
    /// The requested functionality is not implemented.
    NotImplemented = make_error(Facility::Core as u32, 4),
    /// The requested item was not found.
    ItemNotFound = make_error(Facility::Core as u32, 5),
    /// Input parsing stopped on an unexpected byte.
    UnexpectedChar = make_error(Facility::Core as u32, 6),
    /// Input ended before parsing completed.
    UnexpectedEnd = make_error(Facility::Core as u32, 7),
    /// The operation is not supported in the current configuration.
    NotSupported = make_error(Facility::Core as u32, 8),

    /// A fixed-capacity structure is full.
    OutOfMemory = make_error(Facility::Platform as u32, 1),
    /// A required platform dependency was not provided by the host.
    DependencyNotProvided = make_error(Facility::Platform as u32, 2),

    /// The JSON value is not valid in the current reader state.
    JsonInvalidState = make_error(Facility::Json as u32, 1),
    /// The JSON document nests deeper than the supported maximum.
    JsonNestingOverflow = make_error(Facility::Json as u32, 2),
    /// The JSON reader already consumed the whole document.
    JsonReaderDone = make_error(Facility::Json as u32, 3),

    /// The HTTP response parser was used out of order.
    HttpInvalidState = make_error(Facility::Http as u32, 1),
    /// The HTTP pipeline is mis-wired (an event ran past the terminal
    /// policy, or a policy slot is empty).
    HttpPipelineInvalidPolicy = make_error(Facility::Http as u32, 2),
    /// The request method is not a valid HTTP verb.
    HttpInvalidMethodVerb = make_error(Facility::Http as u32, 3),
    /// Authentication failed; the credential could not produce a token.
    HttpAuthenticationFailed = make_error(Facility::Http as u32, 4),
    /// The response does not fit the caller-provided response buffer.
    HttpResponseOverflow = make_error(Facility::Http as u32, 5),
    /// The transport could not resolve the host name.
    HttpResponseCouldntResolveHost = make_error(Facility::Http as u32, 6),
    /// A response header violates the HTTP grammar.
    HttpCorruptResponseHeader = make_error(Facility::Http as u32, 7),
    /// The header iterator reached the blank line ending the header block.
    HttpEndOfHeaders = make_error(Facility::Http as u32, 8),
    /// The HTTP transport adapter failed for a reason it could not classify.
    HttpAdapter = make_error(Facility::Http as u32, 9),

    /// The received topic does not match the topic format.
    IotTopicNoMatch = make_error(Facility::Iot as u32, 1),
    /// The property iterator reached the end of the property bag.
    IotEndOfProperties = make_error(Facility::Iot as u32, 2),

    /// A state machine refused an event, or a request arrived in a state
    /// that cannot service it.
    HfsmInvalidState = make_error(Facility::Hfsm as u32, 1),
}

impl Error {
    /// The raw 32-bit status value (failure flag | facility | code).
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// The facility field (bits 16..30).
    pub const fn facility(self) -> Facility {
        match (self.as_u32() >> 16) & 0x7FFF {
            1 => Facility::Core,
            2 => Facility::Platform,
            3 => Facility::Json,
            4 => Facility::Http,
            5 => Facility::Mqtt,
            6 => Facility::Iot,
            _ => Facility::Hfsm,
        }
    }

    /// The code field (bits 0..15).
    #[inline]
    pub const fn code(self) -> u16 {
        (self.as_u32() & 0xFFFF) as u16
    }

    /// Reconstructs an [`Error`] from its numeric value.
    pub const fn from_u32(value: u32) -> Option<Self> {
        macro_rules! check {
            ($($variant:ident),* $(,)?) => {
                $(if value == Error::$variant.as_u32() { return Some(Error::$variant); })*
            };
        }
        check!(
            Canceled,
            InvalidArg,
            InsufficientSpanSize,
            NotImplemented,
            ItemNotFound,
            UnexpectedChar,
            UnexpectedEnd,
            NotSupported,
            OutOfMemory,
            DependencyNotProvided,
            JsonInvalidState,
            JsonNestingOverflow,
            JsonReaderDone,
            HttpInvalidState,
            HttpPipelineInvalidPolicy,
            HttpInvalidMethodVerb,
            HttpAuthenticationFailed,
            HttpResponseOverflow,
            HttpResponseCouldntResolveHost,
            HttpCorruptResponseHeader,
            HttpEndOfHeaders,
            HttpAdapter,
            IotTopicNoMatch,
            IotEndOfProperties,
            HfsmInvalidState,
        );
        None
    }
}

/// Tests the failure flag of a raw status value.
#[inline]
pub const fn status_failed(value: u32) -> bool {
    value & FAILURE_FLAG != 0
}

/// Tests that a raw status value carries no failure flag.
#[inline]
pub const fn status_succeeded(value: u32) -> bool {
    !status_failed(value)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Error::Canceled => "operation cancelled",
            Error::InvalidArg => "invalid argument",
            Error::InsufficientSpanSize => "destination span too small",
            Error::NotImplemented => "not implemented",
            Error::ItemNotFound => "item not found",
            Error::UnexpectedChar => "unexpected character",
            Error::UnexpectedEnd => "unexpected end of input",
            Error::NotSupported => "operation not supported",
            Error::OutOfMemory => "fixed-capacity structure is full",
            Error::DependencyNotProvided => "platform dependency not provided",
            Error::JsonInvalidState => "json reader in invalid state",
            Error::JsonNestingOverflow => "json nesting too deep",
            Error::JsonReaderDone => "json reader done",
            Error::HttpInvalidState => "http parser in invalid state",
            Error::HttpPipelineInvalidPolicy => "http pipeline mis-wired",
            Error::HttpInvalidMethodVerb => "invalid http method",
            Error::HttpAuthenticationFailed => "authentication failed",
            Error::HttpResponseOverflow => "response buffer overflow",
            Error::HttpResponseCouldntResolveHost => "could not resolve host",
            Error::HttpCorruptResponseHeader => "corrupt response header",
            Error::HttpEndOfHeaders => "end of headers",
            Error::HttpAdapter => "http transport adapter failure",
            Error::IotTopicNoMatch => "topic does not match format",
            Error::IotEndOfProperties => "end of properties",
            Error::HfsmInvalidState => "state machine cannot service the event",
        };
        write!(f, "{message} (0x{:08X})", self.as_u32())
    }
}

impl core::error::Error for Error {}
