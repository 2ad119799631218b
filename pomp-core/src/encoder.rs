//! Walks a format string and an argument sequence, emitting a type-tagged value stream into a
//! [`MessageBuffer`](crate::buffer::MessageBuffer). See spec.md §4.2.

use byteorder::{ByteOrder, LittleEndian};

use crate::buffer::MessageBuffer;
use crate::error::EncodeError;
use crate::format::{self, Conv};
use crate::message::Message;
use crate::protocol::HEADER_LEN;
use crate::value::{write_varint, Tag, Value, ZigZag};

/// Encodes values into a [`Message`]'s buffer, one conversion at a time.
///
/// Borrows the message for the duration of the call chain; dropping the encoder (or calling
/// [`clear`](Self::clear)) releases the borrow without altering anything already written.
pub struct Encoder<'a> {
	buf: &'a mut MessageBuffer,
}

impl<'a> Encoder<'a> {
	/// Positions the write cursor past the reserved 12-byte header region. Fails if the message
	/// is already finished.
	pub fn init(msg: &'a mut Message) -> Result<Encoder<'a>, EncodeError> {
		if msg.finished() {
			return Err(EncodeError::MessageFinished);
		}
		let buf = msg.buffer_mut();
		buf.seek(HEADER_LEN);
		Ok(Encoder { buf })
	}

	pub fn write_i8(&mut self, v: i8) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::I8.as_byte())?;
		self.buf.write_byte(v as u8)?;
		Ok(())
	}

	pub fn write_u8(&mut self, v: u8) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::U8.as_byte())?;
		self.buf.write_byte(v)?;
		Ok(())
	}

	pub fn write_i16(&mut self, v: i16) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::I16.as_byte())?;
		let mut tmp = [0u8; 2];
		LittleEndian::write_i16(&mut tmp, v);
		self.buf.write_bytes(&tmp)?;
		Ok(())
	}

	pub fn write_u16(&mut self, v: u16) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::U16.as_byte())?;
		let mut tmp = [0u8; 2];
		LittleEndian::write_u16(&mut tmp, v);
		self.buf.write_bytes(&tmp)?;
		Ok(())
	}

	pub fn write_i32(&mut self, v: i32) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::I32.as_byte())?;
		write_varint(self.buf, v.zig() as u64)?;
		Ok(())
	}

	pub fn write_u32(&mut self, v: u32) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::U32.as_byte())?;
		write_varint(self.buf, v as u64)?;
		Ok(())
	}

	pub fn write_i64(&mut self, v: i64) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::I64.as_byte())?;
		write_varint(self.buf, v.zig())?;
		Ok(())
	}

	pub fn write_u64(&mut self, v: u64) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::U64.as_byte())?;
		write_varint(self.buf, v)?;
		Ok(())
	}

	pub fn write_f32(&mut self, v: f32) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::F32.as_byte())?;
		let mut tmp = [0u8; 4];
		LittleEndian::write_f32(&mut tmp, v);
		self.buf.write_bytes(&tmp)?;
		Ok(())
	}

	pub fn write_f64(&mut self, v: f64) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::F64.as_byte())?;
		let mut tmp = [0u8; 8];
		LittleEndian::write_f64(&mut tmp, v);
		self.buf.write_bytes(&tmp)?;
		Ok(())
	}

	/// Writes an ASCII string: varint length (including the trailing NUL), the bytes, then a
	/// single `0x00`. Fails if `s` is non-ASCII or `len(s) + 1 > 0xFFFF`.
	pub fn write_str(&mut self, s: &str) -> Result<(), EncodeError> {
		if !s.is_ascii() {
			return Err(EncodeError::StringNotAscii);
		}
		let len = s.len() + 1;
		if len > 0xFFFF {
			return Err(EncodeError::StringTooLong(len));
		}
		self.buf.write_byte(Tag::Str.as_byte())?;
		write_varint(self.buf, len as u64)?;
		self.buf.write_bytes(s.as_bytes())?;
		self.buf.write_byte(0)?;
		Ok(())
	}

	/// Writes an opaque byte buffer: varint length, then the raw bytes. No ceiling beyond
	/// `u32::MAX`.
	pub fn write_buf(&mut self, b: &[u8]) -> Result<(), EncodeError> {
		self.buf.write_byte(Tag::Buf.as_byte())?;
		write_varint(self.buf, b.len() as u64)?;
		self.buf.write_bytes(b)?;
		Ok(())
	}

	/// Walks `fmt`'s conversions against `args`, writing one value per conversion. Integer
	/// arguments wider than the conversion's width are masked down (spec.md §4.2); an argument
	/// whose [`Value`] variant cannot be coerced to the conversion's kind is an error.
	pub fn write(&mut self, fmt: &str, args: &[Value]) -> Result<(), EncodeError> {
		let convs = format::parse(fmt)?;
		if args.len() < convs.len() {
			return Err(EncodeError::MissingArgument(args.len()));
		}
		for (i, conv) in convs.into_iter().enumerate() {
			let arg = &args[i];
			let not_coercible = || EncodeError::ArgumentNotCoercible(i);
			match conv {
				Conv::I8 => self.write_i8(arg.as_signed().ok_or_else(not_coercible)? as i8)?,
				Conv::U8 => self.write_u8(arg.as_unsigned().ok_or_else(not_coercible)? as u8)?,
				Conv::I16 => self.write_i16(arg.as_signed().ok_or_else(not_coercible)? as i16)?,
				Conv::U16 => {
					self.write_u16(arg.as_unsigned().ok_or_else(not_coercible)? as u16)?
				}
				Conv::I32 => self.write_i32(arg.as_signed().ok_or_else(not_coercible)? as i32)?,
				Conv::U32 => {
					self.write_u32(arg.as_unsigned().ok_or_else(not_coercible)? as u32)?
				}
				Conv::I64 => self.write_i64(arg.as_signed().ok_or_else(not_coercible)?)?,
				Conv::U64 => self.write_u64(arg.as_unsigned().ok_or_else(not_coercible)?)?,
				Conv::F32 => self.write_f32(arg.as_float().ok_or_else(not_coercible)? as f32)?,
				Conv::F64 => self.write_f64(arg.as_float().ok_or_else(not_coercible)?)?,
				Conv::Str => self.write_str(arg.as_str().ok_or_else(not_coercible)?)?,
				Conv::Buf => self.write_buf(arg.as_buf().ok_or_else(not_coercible)?)?,
			}
		}
		Ok(())
	}

	/// Drops the reference to the message.
	pub fn clear(self) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::Message;

	#[test]
	fn varint_boundaries_u32() {
		let mut msg = Message::new();
		msg.write(
			1,
			"%u%u%u%u",
			&[Value::U32(0), Value::U32(127), Value::U32(128), Value::U32(0xFFFF_FFFF)],
		)
		.unwrap();
		let payload = &msg.bytes()[HEADER_LEN..];
		assert_eq!(
			payload,
			&[0x06, 0x00, 0x06, 0x7F, 0x06, 0x80, 0x01, 0x06, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
		);
	}

	#[test]
	fn zigzag_boundaries_i32() {
		let mut msg = Message::new();
		msg.write(1, "%d%d%d", &[Value::I32(-1), Value::I32(1), Value::I32(i32::MIN)]).unwrap();
		let payload = &msg.bytes()[HEADER_LEN..];
		assert_eq!(
			payload,
			&[0x05, 0x01, 0x05, 0x02, 0x05, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
		);
	}

	#[test]
	fn string_too_long_is_rejected() {
		let mut msg = Message::new();
		let s = "x".repeat(0xFFFF);
		assert!(matches!(
			msg.write(1, "%s", &[Value::Str(s)]),
			Err(EncodeError::StringTooLong(_))
		));
	}

	#[test]
	fn non_ascii_string_is_rejected() {
		let mut msg = Message::new();
		assert!(matches!(
			msg.write(1, "%s", &[Value::Str("héllo".to_owned())]),
			Err(EncodeError::StringNotAscii)
		));
	}

	#[test]
	fn missing_argument_is_rejected() {
		let mut msg = Message::new();
		assert!(matches!(
			msg.write(1, "%d%d", &[Value::I32(1)]),
			Err(EncodeError::MissingArgument(_))
		));
	}

	#[test]
	fn argument_not_coercible_is_rejected() {
		let mut msg = Message::new();
		assert!(matches!(
			msg.write(1, "%d", &[Value::Str("nope".to_owned())]),
			Err(EncodeError::ArgumentNotCoercible(_))
		));
	}

	#[test]
	fn integer_argument_wider_than_conversion_is_masked() {
		// %hhd truncates to i8: 300 (0x12C) masked to the low 8 bits is 0x2C = 44.
		let mut msg = Message::new();
		msg.write(1, "%hhd", &[Value::I32(300)]).unwrap();
		assert_eq!(msg.read("%hhd").unwrap(), vec![Value::I8(44)]);
	}
}
