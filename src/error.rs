//! Error types for the panel controller
//!
//! This module defines the error types produced while parsing the declarative
//! panel description ([`ParseError`], [`ConfigError`]) and while driving the
//! panel at runtime ([`Error`]).
//!
//! ## Error Types
//!
//! - [`ParseError`] - Malformed DCS command declaration (fatal to that sequence only)
//! - [`ConfigError`] - Required panel property missing or invalid
//! - [`Error`] - Runtime errors while talking to the panel
//! - [`InterfaceError`](crate::interface::InterfaceError) - Low-level hardware communication errors
//!
//! ## Example
//!
//! ```
//! use dsi_panel::{CommandSequence, LinkState, ParseError};
//!
//! // Header declares 4 payload bytes, only 1 present
//! let raw = [0x39, 0x01, 0x00, 0x00, 0x00, 0x00, 0x04, 0xB0];
//! let result = CommandSequence::parse(&raw, LinkState::LowPower);
//! assert!(matches!(result, Err(ParseError::Truncated { .. })));
//! ```

use crate::esd::EsdFailure;

/// Errors raised while parsing a DCS command declaration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The declaration contained no bytes at all
    Empty,
    /// A header declared more payload bytes than remain in the buffer
    Truncated {
        /// Byte offset of the offending header
        offset: usize,
        /// Payload length declared by the header
        declared: usize,
        /// Bytes remaining after the header
        remaining: usize,
    },
    /// Bytes were left over that do not form a complete header
    TrailingBytes {
        /// Byte offset where the leftover bytes start
        offset: usize,
        /// Number of leftover bytes
        len: usize,
    },
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty command declaration"),
            Self::Truncated {
                offset,
                declared,
                remaining,
            } => write!(
                f,
                "Command at offset {offset} declares {declared} payload bytes, {remaining} remain"
            ),
            Self::TrailingBytes { offset, len } => {
                write!(f, "{len} trailing bytes at offset {offset}")
            }
        }
    }
}

impl core::error::Error for ParseError {}

/// Errors raised while resolving the panel configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A property the panel cannot work without is absent
    MissingProperty(&'static str),
    /// A property is present but its value is unusable
    InvalidProperty {
        /// Property key
        key: &'static str,
        /// Why the value was rejected
        reason: &'static str,
    },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingProperty(key) => write!(f, "Missing panel property: {key}"),
            Self::InvalidProperty { key, reason } => {
                write!(f, "Invalid panel property {key}: {reason}")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

/// Errors that can occur when driving the panel
///
/// Generic over the transport error type so callers can match on the
/// underlying hardware error.
#[derive(Debug)]
pub enum Error<E> {
    /// Transport error on the DSI link
    ///
    /// Wraps the error returned by the [`DsiLink`](crate::interface::DsiLink) implementation.
    Transport(E),
    /// A heartbeat or read-back did not arrive in time
    Timeout,
    /// The requested feature is not present in the resolved configuration
    ConfigurationMissing(&'static str),
    /// The display was judged non-responsive
    EsdFailure(EsdFailure),
    /// The request needs a powered panel
    PanelOff,
    /// A mode level outside the supported range was requested
    InvalidLevel {
        /// Requested level
        level: u8,
        /// Highest supported level
        max: u8,
    },
}

impl<E> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transport(_) => write!(f, "Transport error"),
            Self::Timeout => write!(f, "Timed out waiting for the panel"),
            Self::ConfigurationMissing(feature) => {
                write!(f, "Feature not configured: {feature}")
            }
            Self::EsdFailure(failure) => write!(f, "Panel status check failed: {failure}"),
            Self::PanelOff => write!(f, "Panel is off"),
            Self::InvalidLevel { level, max } => {
                write!(f, "Invalid level {level} (max {max})")
            }
        }
    }
}

impl<E: core::fmt::Debug> core::error::Error for Error<E> {}
