//! POMP ("Printf Oriented Message Protocol") is a small message-passing library over stream and
//! datagram sockets. A message carries an integer identifier and a typed argument tuple; the
//! argument list is described by a printf-style format string at both encode and decode sides,
//! yielding a self-describing binary payload framed on the wire by a fixed magic-prefixed header.
//!
//! # Layout
//!
//! The core codec and framer ([`value`], [`buffer`], [`format`], [`encoder`], [`decoder`],
//! [`message`], [`protocol`]) are synchronous, single-threaded, and transport-agnostic: they only
//! know how to turn typed values into bytes and back. [`transport`] is the external collaborator
//! that moves those bytes over real sockets.
//!
//! # Example
//!
//! ```
//! use pomp_core::{Message, Value};
//!
//! let mut msg = Message::new();
//! msg.write(42, "%d%s", &[Value::I32(-71000), Value::Str("hi".to_owned())]).unwrap();
//! assert!(msg.finished());
//!
//! let values = msg.read("%d%s").unwrap();
//! assert_eq!(values, vec![Value::I32(-71000), Value::Str("hi".to_owned())]);
//! ```

mod buffer;
mod decoder;
mod encoder;
mod error;
mod format;
mod message;
mod protocol;
pub mod transport;
mod value;

pub use buffer::MessageBuffer;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{AddrParseError, BufferError, DecodeError, EncodeError, TransportError};
pub use message::Message;
pub use protocol::{Protocol, HEADER_LEN, MAGIC};
pub use value::{Tag, Value};
