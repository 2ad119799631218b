//! [`Message`]: owns a [`MessageBuffer`], an identifier, and a `finished` latch. See spec.md §4.5.

use crate::buffer::MessageBuffer;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{DecodeError, EncodeError};
use crate::protocol::{HEADER_LEN, MAGIC};
use crate::value::Value;

/// The atomic unit on the wire: a 12-byte header plus a typed-value sequence.
///
/// Lifecycle: created empty via [`Message::new`]; initialized with an id via [`Message::init`],
/// which resets the buffer and clears `finished`; mutated exclusively through an [`Encoder`]
/// while unfinished; finalized by [`Message::finish`], which stamps the header and latches the
/// buffer read-only. Thereafter it may be read any number of times by [`Decoder`]s but never
/// mutated again.
#[derive(Debug, Clone, Default)]
pub struct Message {
	msgid: u32,
	buf: MessageBuffer,
	finished: bool,
}

impl Message {
	/// An empty, unfinished message with id 0.
	pub fn new() -> Message {
		Message { msgid: 0, buf: MessageBuffer::new(), finished: false }
	}

	/// Resets the buffer, records `id`, and clears the `finished` latch.
	pub fn init(&mut self, id: u32) {
		self.msgid = id;
		self.buf.clear();
		self.finished = false;
	}

	pub fn id(&self) -> u32 {
		self.msgid
	}

	pub fn finished(&self) -> bool {
		self.finished
	}

	/// The full framed byte sequence (header + payload). Only meaningful once `finished`.
	pub fn bytes(&self) -> &[u8] {
		self.buf.as_slice()
	}

	/// Returns an [`Encoder`] positioned to write the payload. Fails if the message is already
	/// finished.
	pub fn encoder(&mut self) -> Result<Encoder<'_>, EncodeError> {
		Encoder::init(self)
	}

	/// The composite `init -> encoder write -> finish` operation described in spec.md §4.5.
	pub fn write(&mut self, id: u32, fmt: &str, args: &[Value]) -> Result<(), EncodeError> {
		self.init(id);
		{
			let mut enc = self.encoder()?;
			enc.write(fmt, args)?;
		}
		self.finish()
	}

	/// Seeks the buffer to the start, writes the magic/id/size header, then latches the buffer
	/// read-only and sets `finished`. Calling this on an already-finished message is a caller
	/// error (spec.md §4.5: "idempotent attempts are caller errors").
	pub fn finish(&mut self) -> Result<(), EncodeError> {
		if self.finished {
			return Err(EncodeError::MessageFinished);
		}
		// The header region may never have been physically written if the payload was empty
		// (Encoder::init only moves the cursor); the reserved region still counts toward the
		// total size.
		let total_len = self.buf.len().max(HEADER_LEN) as u32;
		self.buf.seek(0);
		self.buf.write_bytes(&MAGIC)?;
		self.buf.write_u32_le(self.msgid)?;
		self.buf.write_u32_le(total_len)?;
		self.buf.set_read_only();
		self.finished = true;
		Ok(())
	}

	/// Format-driven decode of the payload. Requires the message to be finished.
	pub fn read(&mut self, fmt: &str) -> Result<Vec<Value>, DecodeError> {
		if !self.finished {
			return Err(DecodeError::MessageNotFinished);
		}
		let id = self.msgid;
		let mut dec = Decoder::new(&mut self.buf, id);
		dec.read(fmt)
	}

	/// A textual dump of the payload, independent of any format string (spec.md §4.3).
	pub fn dump(&mut self) -> Result<String, DecodeError> {
		if !self.finished {
			return Err(DecodeError::MessageNotFinished);
		}
		let id = self.msgid;
		let mut dec = Decoder::new(&mut self.buf, id);
		dec.dump()
	}

	/// Resets the message to the empty, unfinished state with id 0.
	pub fn clear(&mut self) {
		self.buf.clear();
		self.msgid = 0;
		self.finished = false;
	}

	pub(crate) fn buffer_mut(&mut self) -> &mut MessageBuffer {
		&mut self.buf
	}

	/// Seeds an in-progress message from the [`Protocol`](crate::protocol::Protocol)'s completed
	/// 12-byte header buffer, ahead of receiving the payload bytes.
	pub(crate) fn seed_from_framer(&mut self, msgid: u32, header_bytes: &[u8]) {
		self.msgid = msgid;
		self.buf.clear();
		self.buf
			.write_bytes(header_bytes)
			.expect("a freshly cleared buffer is always writable");
	}

	pub(crate) fn raw_len(&self) -> usize {
		self.buf.len()
	}

	pub(crate) fn append_payload(&mut self, bytes: &[u8]) {
		self.buf.write_bytes(bytes).expect("an in-progress framer message is always writable");
	}

	/// Marks the message finished once the framer has collected exactly `size` bytes.
	pub(crate) fn finalize_from_framer(&mut self) {
		self.buf.set_read_only();
		self.finished = true;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_typed_values() {
		let mut msg = Message::new();
		msg.write(
			7,
			"%d%u%s%p%f",
			&[
				Value::I32(-42),
				Value::U32(42),
				Value::Str("hi".to_owned()),
				Value::Buf(vec![1, 2, 3]),
				Value::F32(1.5),
			],
		)
		.unwrap();

		let values = msg.read("%d%u%s%p%f").unwrap();
		assert_eq!(
			values,
			vec![
				Value::I32(-42),
				Value::U32(42),
				Value::Str("hi".to_owned()),
				Value::Buf(vec![1, 2, 3]),
				Value::F32(1.5),
			]
		);
	}

	#[test]
	fn header_integrity() {
		let mut msg = Message::new();
		msg.write(99, "%d", &[Value::I32(1)]).unwrap();
		let bytes = msg.bytes();
		assert_eq!(&bytes[0..4], b"POMP");
		assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 99);
		assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), bytes.len() as u32);
	}

	#[test]
	fn read_before_finish_fails() {
		let mut msg = Message::new();
		msg.init(1);
		assert!(matches!(msg.read("%d"), Err(DecodeError::MessageNotFinished)));
	}

	#[test]
	fn double_finish_is_a_caller_error() {
		let mut msg = Message::new();
		msg.write(1, "", &[]).unwrap();
		assert!(matches!(msg.finish(), Err(EncodeError::MessageFinished)));
	}

	#[test]
	fn write_after_finish_fails() {
		let mut msg = Message::new();
		msg.write(1, "", &[]).unwrap();
		assert!(matches!(msg.encoder(), Err(EncodeError::MessageFinished)));
	}

	#[test]
	fn clear_allows_reuse() {
		let mut msg = Message::new();
		msg.write(1, "%d", &[Value::I32(5)]).unwrap();
		msg.clear();
		assert!(!msg.finished());
		msg.write(2, "%d", &[Value::I32(6)]).unwrap();
		assert_eq!(msg.id(), 2);
		assert_eq!(msg.read("%d").unwrap(), vec![Value::I32(6)]);
	}
}
