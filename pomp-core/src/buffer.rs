use byteorder::{ByteOrder, LittleEndian};

use crate::error::BufferError;

/// A growable byte sequence with an internal read/write cursor and a read-only latch.
///
/// This backs every [`Message`](crate::message::Message): the [`Encoder`](crate::encoder::Encoder)
/// appends values after the reserved 12-byte header region, [`Message::finish`]
/// (crate::message::Message::finish) seeks back to the start to stamp the header, and the
/// [`Decoder`](crate::decoder::Decoder) reads forward from wherever the cursor is left.
///
/// Writes past the current end of the buffer extend it (zero-padding any gap between the old end
/// and the cursor); writes at or before the end overwrite in place without changing [`len`]
/// (crate::buffer::MessageBuffer::len). This lets [`init`](crate::encoder::Encoder::init) reserve
/// the header region purely by moving the cursor, and lets `finish` patch that region back in
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct MessageBuffer {
	data: Vec<u8>,
	cursor: usize,
	read_only: bool,
}

impl MessageBuffer {
	/// Creates a new, empty, writable buffer with the cursor at position 0.
	pub fn new() -> MessageBuffer {
		MessageBuffer { data: Vec::new(), cursor: 0, read_only: false }
	}

	/// Total number of bytes written so far. Independent of the cursor position.
	pub fn len(&self) -> usize { self.data.len() }

	/// True if no bytes have been written yet.
	pub fn is_empty(&self) -> bool { self.data.is_empty() }

	/// Current cursor position.
	pub fn position(&self) -> usize { self.cursor }

	/// Moves the cursor to an arbitrary position. Does not itself read or write anything, and may
	/// point past the current end of the buffer (the next write will zero-pad up to it).
	pub fn seek(&mut self, pos: usize) { self.cursor = pos; }

	/// True once [`set_read_only`](Self::set_read_only) has been called.
	pub fn is_read_only(&self) -> bool { self.read_only }

	/// Latches the buffer read-only. Idempotent. Called by [`Message::finish`]
	/// (crate::message::Message::finish); irreversible for the lifetime of this buffer.
	pub fn set_read_only(&mut self) { self.read_only = true; }

	/// Resets the buffer to empty, writable, with the cursor at 0. Called by
	/// [`Message::init`](crate::message::Message::init).
	pub fn clear(&mut self) {
		self.data.clear();
		self.cursor = 0;
		self.read_only = false;
	}

	/// The full written byte range, regardless of cursor position.
	pub fn as_slice(&self) -> &[u8] { &self.data }

	/// Writes a single byte at the cursor, overwriting in place if the cursor already falls
	/// within the written range, or zero-padding and appending otherwise. Advances the cursor by
	/// one. Fails if the buffer is read-only.
	pub fn write_byte(&mut self, b: u8) -> Result<(), BufferError> {
		if self.read_only {
			return Err(BufferError::ReadOnly);
		}
		if self.cursor >= self.data.len() {
			self.data.resize(self.cursor, 0);
			self.data.push(b);
		} else {
			self.data[self.cursor] = b;
		}
		self.cursor += 1;
		Ok(())
	}

	/// Writes a slice of bytes starting at the cursor, one [`write_byte`](Self::write_byte) at a
	/// time so the same overwrite-or-extend rule applies uniformly.
	pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
		for &b in bytes {
			self.write_byte(b)?;
		}
		Ok(())
	}

	/// Writes a 32-bit little-endian word at the cursor.
	pub fn write_u32_le(&mut self, v: u32) -> Result<(), BufferError> {
		let mut tmp = [0u8; 4];
		LittleEndian::write_u32(&mut tmp, v);
		self.write_bytes(&tmp)
	}

	/// Reads a single byte from the cursor and advances it by one. Fails at end of the written
	/// data.
	pub fn read_byte(&mut self) -> Result<u8, BufferError> {
		let b = *self.data.get(self.cursor).ok_or(BufferError::Eof)?;
		self.cursor += 1;
		Ok(b)
	}

	/// Reads `n` bytes from the cursor and advances it by `n`. Fails if fewer than `n` bytes
	/// remain.
	pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], BufferError> {
		let end = self.cursor.checked_add(n).ok_or(BufferError::Eof)?;
		let slice = self.data.get(self.cursor..end).ok_or(BufferError::Eof)?;
		self.cursor = end;
		Ok(slice)
	}

	/// Reads a 32-bit little-endian word from the cursor.
	pub fn read_u32_le(&mut self) -> Result<u32, BufferError> {
		let bytes = self.read_bytes(4)?;
		Ok(LittleEndian::read_u32(bytes))
	}

	/// Number of bytes remaining between the cursor and the end of the written data.
	pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.cursor) }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn append_and_len() {
		let mut buf = MessageBuffer::new();
		buf.write_byte(1).unwrap();
		buf.write_byte(2).unwrap();
		assert_eq!(buf.len(), 2);
		assert_eq!(buf.as_slice(), &[1, 2]);
	}

	#[test]
	fn seek_past_end_zero_pads() {
		let mut buf = MessageBuffer::new();
		buf.seek(4);
		buf.write_byte(0xAA).unwrap();
		assert_eq!(buf.as_slice(), &[0, 0, 0, 0, 0xAA]);
	}

	#[test]
	fn seek_back_overwrites_without_changing_len() {
		let mut buf = MessageBuffer::new();
		buf.write_bytes(&[1, 2, 3, 4]).unwrap();
		buf.seek(0);
		buf.write_bytes(&[9, 9]).unwrap();
		assert_eq!(buf.len(), 4);
		assert_eq!(buf.as_slice(), &[9, 9, 3, 4]);
	}

	#[test]
	fn read_only_rejects_writes() {
		let mut buf = MessageBuffer::new();
		buf.write_byte(1).unwrap();
		buf.set_read_only();
		assert_eq!(buf.write_byte(2), Err(BufferError::ReadOnly));
	}

	#[test]
	fn read_past_end_is_eof() {
		let mut buf = MessageBuffer::new();
		buf.write_byte(1).unwrap();
		buf.seek(0);
		assert_eq!(buf.read_byte(), Ok(1));
		assert_eq!(buf.read_byte(), Err(BufferError::Eof));
	}

	#[test]
	fn clear_resets_everything() {
		let mut buf = MessageBuffer::new();
		buf.write_bytes(&[1, 2, 3]).unwrap();
		buf.set_read_only();
		buf.clear();
		assert!(!buf.is_read_only());
		assert_eq!(buf.len(), 0);
		assert_eq!(buf.position(), 0);
		buf.write_byte(5).unwrap();
		assert_eq!(buf.as_slice(), &[5]);
	}
}
