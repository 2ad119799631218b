use std::io;
use thiserror::Error;

use crate::format::FormatError;

/// Errors raised by the [`MessageBuffer`](crate::buffer::MessageBuffer) primitive read/write
/// operations.
///
/// These are the lowest-level errors in the crate; [`EncodeError`] and [`DecodeError`] both wrap
/// them via `#[from]` so callers generally only need to match on the higher-level error types.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
	/// A write was attempted after [`set_read_only`](crate::buffer::MessageBuffer::set_read_only)
	/// had already latched the buffer.
	#[error("write attempted on a read-only message buffer")]
	ReadOnly,
	/// A read ran past the end of the buffer's written data.
	#[error("read past end of message buffer")]
	Eof,
}

/// Errors that can occur while [`Encoder`](crate::encoder::Encoder) walks a format string and
/// argument list.
#[derive(Error, Debug)]
pub enum EncodeError {
	/// `write`/`init` was called on a [`Message`](crate::message::Message) that had already been
	/// finished.
	#[error("message is already finished and cannot be written to")]
	MessageFinished,
	/// A character appeared in the format string that is not part of the grammar in spec.md §4.2.
	#[error("invalid format character `{0}`")]
	InvalidFormatChar(char),
	/// A `%` was not followed by a valid flag/conversion sequence before the format string ended.
	#[error("unterminated conversion in format string")]
	UnterminatedConversion,
	/// A width flag (`l`, `ll`, `h`, `hh`) was combined with a conversion that does not support it
	/// (e.g. a float conversion with `h`).
	#[error("conversion `%{flags}{conv}` does not support this width")]
	UnsupportedWidth { flags: String, conv: char },
	/// The format string required more arguments than were supplied.
	#[error("missing argument for conversion #{0}")]
	MissingArgument(usize),
	/// An argument's [`Value`](crate::value::Value) variant cannot be coerced to the numeric kind
	/// a conversion requires (e.g. a string passed where `%d` expects an integer).
	#[error("argument #{0} cannot be coerced to the kind required by its conversion")]
	ArgumentNotCoercible(usize),
	/// `writeStr` was given a string (including its trailing NUL) longer than `0xFFFF` bytes.
	#[error("string too long: {0} bytes (including NUL) exceeds 0xFFFF")]
	StringTooLong(usize),
	/// `writeStr` was given a string containing non-ASCII bytes.
	#[error("string is not ASCII")]
	StringNotAscii,
	/// Propagated from the underlying [`MessageBuffer`].
	#[error(transparent)]
	Buffer(#[from] BufferError),
}

impl From<FormatError> for EncodeError {
	fn from(e: FormatError) -> Self {
		match e {
			FormatError::InvalidChar(c) => EncodeError::InvalidFormatChar(c),
			FormatError::UnterminatedConversion => EncodeError::UnterminatedConversion,
			FormatError::UnsupportedWidth { flags, conv } => {
				EncodeError::UnsupportedWidth { flags, conv }
			}
		}
	}
}

/// Errors that can occur while [`Decoder`](crate::decoder::Decoder) reads a typed value stream.
#[derive(Error, Debug)]
pub enum DecodeError {
	/// `read`/`dump` was called on a [`Message`](crate::message::Message) that has not been
	/// finished yet.
	#[error("message is not finished and cannot be read")]
	MessageNotFinished,
	/// See [`EncodeError::InvalidFormatChar`].
	#[error("invalid format character `{0}`")]
	InvalidFormatChar(char),
	/// See [`EncodeError::UnterminatedConversion`].
	#[error("unterminated conversion in format string")]
	UnterminatedConversion,
	/// See [`EncodeError::UnsupportedWidth`].
	#[error("conversion `%{flags}{conv}` does not support this width")]
	UnsupportedWidth { flags: String, conv: char },
	/// The tag byte read from the stream did not match the tag the format string (or typed
	/// reader) expected.
	#[error("type tag mismatch: expected {expected:?}, found 0x{found:02x}")]
	TagMismatch { expected: crate::value::Tag, found: u8 },
	/// `dump()` encountered a tag byte that does not correspond to any [`Tag`](crate::value::Tag).
	#[error("unknown type tag 0x{0:02x}")]
	UnknownTag(u8),
	/// A `STR` value's declared length was `0` or greater than `0xFFFF`.
	#[error("invalid string length {0}")]
	InvalidStringLength(u32),
	/// A `STR` value's payload was not terminated by a `0x00` byte.
	#[error("string value is missing its NUL terminator")]
	StringMissingNul,
	/// A varint ran past 10 continuation bytes without terminating; treated as corrupt rather
	/// than silently accepted (see SPEC_FULL.md §9).
	#[error("varint exceeded the maximum encodable width")]
	VarintTooLong,
	/// Propagated from the underlying [`MessageBuffer`].
	#[error(transparent)]
	Buffer(#[from] BufferError),
}

impl From<FormatError> for DecodeError {
	fn from(e: FormatError) -> Self {
		match e {
			FormatError::InvalidChar(c) => DecodeError::InvalidFormatChar(c),
			FormatError::UnterminatedConversion => DecodeError::UnterminatedConversion,
			FormatError::UnsupportedWidth { flags, conv } => {
				DecodeError::UnsupportedWidth { flags, conv }
			}
		}
	}
}

/// Errors raised while parsing one of the address forms in spec.md §6.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddrParseError {
	#[error("address is missing a `scheme:` prefix")]
	MissingScheme,
	#[error("unknown address scheme `{0}`")]
	UnknownScheme(String),
	#[error("address `{0}` is missing a `:<port>` suffix")]
	MissingPort(String),
	#[error("invalid port number in address `{0}`")]
	InvalidPort(String),
	#[error("abstract unix socket name `{0}` is too long (max 107 bytes)")]
	AbstractNameTooLong(String),
	#[error("abstract unix sockets are not supported on this platform")]
	AbstractUnsupported,
}

/// Errors raised by the transport glue (connection setup, I/O on an already-established
/// connection). Per spec.md §7, recoverable socket errors during listen/connect/bind are logged
/// and retried rather than returned; this type only covers failures the caller must act on.
#[derive(Error, Debug)]
pub enum TransportError {
	#[error("address error: {0}")]
	Addr(#[from] AddrParseError),
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
	#[error("encode error: {0}")]
	Encode(#[from] EncodeError),
}
