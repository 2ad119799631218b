//! Inverse of [`Encoder`](crate::encoder::Encoder); also provides a formatted textual dump
//! independent of any caller-supplied format. See spec.md §4.3.

use byteorder::{ByteOrder, LittleEndian};

use crate::buffer::MessageBuffer;
use crate::error::DecodeError;
use crate::format::{self, Conv};
use crate::protocol::HEADER_LEN;
use crate::value::{read_varint, Tag, Value, ZigZag};

/// Decodes values from a finished [`Message`](crate::message::Message)'s buffer.
pub struct Decoder<'a> {
	buf: &'a mut MessageBuffer,
	id: u32,
}

impl<'a> Decoder<'a> {
	pub(crate) fn new(buf: &'a mut MessageBuffer, id: u32) -> Decoder<'a> {
		buf.seek(HEADER_LEN);
		Decoder { buf, id }
	}

	fn expect_tag(&mut self, expected: Tag) -> Result<(), DecodeError> {
		let found = self.buf.read_byte()?;
		if found != expected.as_byte() {
			return Err(DecodeError::TagMismatch { expected, found });
		}
		Ok(())
	}

	pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
		self.expect_tag(Tag::I8)?;
		Ok(self.buf.read_byte()? as i8)
	}

	pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
		self.expect_tag(Tag::U8)?;
		Ok(self.buf.read_byte()?)
	}

	pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
		self.expect_tag(Tag::I16)?;
		let b = self.buf.read_bytes(2)?;
		Ok(LittleEndian::read_i16(b))
	}

	pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
		self.expect_tag(Tag::U16)?;
		let b = self.buf.read_bytes(2)?;
		Ok(LittleEndian::read_u16(b))
	}

	pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
		self.expect_tag(Tag::I32)?;
		let zz = read_varint(self.buf)? as u32;
		Ok(i32::zag(zz))
	}

	pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
		self.expect_tag(Tag::U32)?;
		Ok(read_varint(self.buf)? as u32)
	}

	pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
		self.expect_tag(Tag::I64)?;
		let zz = read_varint(self.buf)?;
		Ok(i64::zag(zz))
	}

	pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
		self.expect_tag(Tag::U64)?;
		read_varint(self.buf)
	}

	pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
		self.expect_tag(Tag::F32)?;
		let b = self.buf.read_bytes(4)?;
		Ok(LittleEndian::read_f32(b))
	}

	pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
		self.expect_tag(Tag::F64)?;
		let b = self.buf.read_bytes(8)?;
		Ok(LittleEndian::read_f64(b))
	}

	pub fn read_str(&mut self) -> Result<String, DecodeError> {
		self.expect_tag(Tag::Str)?;
		let (text, _) = self.read_str_body()?;
		Ok(text)
	}

	pub fn read_buf(&mut self) -> Result<Vec<u8>, DecodeError> {
		self.expect_tag(Tag::Buf)?;
		let len = read_varint(self.buf)?;
		Ok(self.buf.read_bytes(len as usize)?.to_vec())
	}

	/// Reads the varint length, bytes, and NUL terminator of a `STR` value (tag already
	/// consumed), returning the decoded text and its raw bytes (for `dump`'s repr rendering).
	fn read_str_body(&mut self) -> Result<(String, Vec<u8>), DecodeError> {
		let len = read_varint(self.buf)?;
		if len == 0 || len > 0xFFFF {
			return Err(DecodeError::InvalidStringLength(len as u32));
		}
		let body = self.buf.read_bytes(len as usize)?;
		let (text, nul) = body.split_at(body.len() - 1);
		if nul[0] != 0 {
			return Err(DecodeError::StringMissingNul);
		}
		let text = text.to_vec();
		let s = text.iter().map(|&b| b as char).collect();
		Ok((s, text))
	}

	/// Format-driven decode: reads one value per conversion in `fmt`, returning them as a
	/// heterogeneous sequence.
	pub fn read(&mut self, fmt: &str) -> Result<Vec<Value>, DecodeError> {
		let convs = format::parse(fmt)?;
		let mut out = Vec::with_capacity(convs.len());
		for conv in convs {
			out.push(match conv {
				Conv::I8 => Value::I8(self.read_i8()?),
				Conv::U8 => Value::U8(self.read_u8()?),
				Conv::I16 => Value::I16(self.read_i16()?),
				Conv::U16 => Value::U16(self.read_u16()?),
				Conv::I32 => Value::I32(self.read_i32()?),
				Conv::U32 => Value::U32(self.read_u32()?),
				Conv::I64 => Value::I64(self.read_i64()?),
				Conv::U64 => Value::U64(self.read_u64()?),
				Conv::F32 => Value::F32(self.read_f32()?),
				Conv::F64 => Value::F64(self.read_f64()?),
				Conv::Str => Value::Str(self.read_str()?),
				Conv::Buf => Value::Buf(self.read_buf()?),
			});
		}
		Ok(out)
	}

	/// Ignores any caller-provided format and re-derives the value sequence from the tag stream,
	/// producing `{ID:<id>, <TAG>:<value>, ...}`. Fails on an unknown tag byte.
	pub fn dump(&mut self) -> Result<String, DecodeError> {
		self.buf.seek(HEADER_LEN);
		let mut parts = Vec::new();
		while self.buf.remaining() > 0 {
			let tag_byte = self.buf.read_byte()?;
			let tag = Tag::from_byte(tag_byte).ok_or(DecodeError::UnknownTag(tag_byte))?;
			let rendered = match tag {
				Tag::I8 => (self.buf.read_byte()? as i8).to_string(),
				Tag::U8 => self.buf.read_byte()?.to_string(),
				Tag::I16 => {
					let b = self.buf.read_bytes(2)?;
					LittleEndian::read_i16(b).to_string()
				}
				Tag::U16 => {
					let b = self.buf.read_bytes(2)?;
					LittleEndian::read_u16(b).to_string()
				}
				Tag::I32 => {
					let zz = read_varint(self.buf)? as u32;
					i32::zag(zz).to_string()
				}
				Tag::U32 => (read_varint(self.buf)? as u32).to_string(),
				Tag::I64 => {
					let zz = read_varint(self.buf)?;
					i64::zag(zz).to_string()
				}
				Tag::U64 => read_varint(self.buf)?.to_string(),
				Tag::F32 => {
					let b = self.buf.read_bytes(4)?;
					LittleEndian::read_f32(b).to_string()
				}
				Tag::F64 => {
					let b = self.buf.read_bytes(8)?;
					LittleEndian::read_f64(b).to_string()
				}
				Tag::Str => {
					let (_, raw) = self.read_str_body()?;
					repr(&raw)
				}
				Tag::Buf => {
					let len = read_varint(self.buf)?;
					let raw = self.buf.read_bytes(len as usize)?.to_vec();
					repr(&raw)
				}
			};
			parts.push(format!("{}:{}", tag.name(), rendered));
		}
		Ok(format!("{{ID:{}, {}}}", self.id, parts.join(", ")))
	}
}

/// Renders `bytes` as a single-quoted, escaped ASCII literal, e.g. `'hi "there"\n'`. Used by
/// `dump` for both `STR` and `BUF` values (spec.md §4.3: "repr-style").
fn repr(bytes: &[u8]) -> String {
	let mut s = String::with_capacity(bytes.len() + 2);
	s.push('\'');
	for &b in bytes {
		match b {
			b'\'' => s.push_str("\\'"),
			b'\\' => s.push_str("\\\\"),
			b'\n' => s.push_str("\\n"),
			b'\r' => s.push_str("\\r"),
			b'\t' => s.push_str("\\t"),
			0x20..=0x7e => s.push(b as char),
			_ => s.push_str(&format!("\\x{:02x}", b)),
		}
	}
	s.push('\'');
	s
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::Message;

	fn sample_message() -> Message {
		let mut msg = Message::new();
		msg.write(
			42,
			"%hhd%hhu%hd%hu%d%u%lld%llu%s%p%f%lf",
			&[
				Value::I8(-32),
				Value::U8(212),
				Value::I16(-1000),
				Value::U16(23000),
				Value::I32(-71000),
				Value::U32(3_000_000_000),
				Value::I64(-4_000_000_000),
				Value::U64(10_000_000_000_000_000_000),
				Value::Str("Hello World !!!".to_owned()),
				Value::Buf(b"hELLO wORLD ???".to_vec()),
				Value::F32(3.1415927),
				Value::F64(std::f64::consts::PI),
			],
		)
		.unwrap();
		msg
	}

	#[test]
	fn all_types_payload_matches_the_spec_test_vector() {
		let msg = sample_message();
		let payload = &msg.bytes()[HEADER_LEN..];
		let expected: &[u8] = &[
			0x01, 0xE0, 0x02, 0xD4, 0x03, 0x18, 0xFC, 0x04, 0xD8, 0x59, 0x05, 0xAF, 0xD5, 0x08,
			0x06, 0x80, 0xBC, 0xC1, 0x96, 0x0B, 0x07, 0xFF, 0x9F, 0xD9, 0xE6, 0x1D, 0x08, 0x80,
			0x80, 0xA0, 0xCF, 0xC8, 0xE0, 0xC8, 0xE3, 0x8A, 0x01, 0x09, 0x10, 0x48, 0x65, 0x6C,
			0x6C, 0x6F, 0x20, 0x57, 0x6F, 0x72, 0x6C, 0x64, 0x20, 0x21, 0x21, 0x21, 0x00, 0x0A,
			0x0F, 0x68, 0x45, 0x4C, 0x4C, 0x4F, 0x20, 0x77, 0x4F, 0x52, 0x4C, 0x44, 0x20, 0x3F,
			0x3F, 0x3F, 0x0B, 0xDB, 0x0F, 0x49, 0x40, 0x0C, 0x18, 0x2D, 0x44, 0x54, 0xFB, 0x21,
			0x09, 0x40,
		];
		assert_eq!(payload, expected);
	}

	#[test]
	fn round_trips_all_types() {
		let mut msg = sample_message();
		let values = msg.read("%hhd%hhu%hd%hu%d%u%lld%llu%s%p%f%lf").unwrap();
		assert_eq!(
			values,
			vec![
				Value::I8(-32),
				Value::U8(212),
				Value::I16(-1000),
				Value::U16(23000),
				Value::I32(-71000),
				Value::U32(3_000_000_000),
				Value::I64(-4_000_000_000),
				Value::U64(10_000_000_000_000_000_000),
				Value::Str("Hello World !!!".to_owned()),
				Value::Buf(b"hELLO wORLD ???".to_vec()),
				Value::F32(3.1415927),
				Value::F64(std::f64::consts::PI),
			]
		);
	}

	#[test]
	fn dump_matches_the_spec_scenario_numerically() {
		let mut msg = sample_message();
		let dump = msg.dump().unwrap();
		assert!(dump.starts_with("{ID:42, "));
		assert!(dump.contains("I8:-32"));
		assert!(dump.contains("U8:212"));
		assert!(dump.contains("I16:-1000"));
		assert!(dump.contains("U16:23000"));
		assert!(dump.contains("I32:-71000"));
		assert!(dump.contains("U32:3000000000"));
		assert!(dump.contains("I64:-4000000000"));
		assert!(dump.contains("U64:10000000000000000000"));
		assert!(dump.contains("STR:'Hello World !!!'"));
		assert!(dump.contains("BUF:'hELLO wORLD ???'"));
		assert!(dump.contains("F32:"));
		assert!(dump.contains("F64:"));
		assert!(dump.ends_with('}'));
	}

	#[test]
	fn tag_mismatch_is_rejected() {
		let mut msg = sample_message();
		assert!(matches!(
			msg.read("%u"), // first value is actually I8, not U32
			Err(DecodeError::TagMismatch { expected: Tag::U32, found: _ })
		));
	}

	#[test]
	fn unknown_tag_fails_dump() {
		// Corrupt a valid message's first payload tag byte, then re-frame it through the
		// Protocol (the only sanctioned way to hand a Message to a Decoder).
		let mut msg = Message::new();
		msg.write(1, "%hhu", &[Value::U8(1)]).unwrap();
		let mut corrupted = msg.bytes().to_vec();
		corrupted[HEADER_LEN] = 0xFF;

		let mut p = crate::protocol::Protocol::new();
		let (_off, m) = p.decode(&corrupted, 0);
		let mut m = m.expect("well-formed header should still frame");
		assert!(matches!(m.dump(), Err(DecodeError::UnknownTag(0xFF))));
	}

	#[test]
	fn string_missing_nul_is_rejected() {
		let mut msg = Message::new();
		msg.write(1, "%s", &[Value::Str("hi".to_owned())]).unwrap();
		let mut corrupted = msg.bytes().to_vec();
		let last = corrupted.len() - 1;
		corrupted[last] = 0x41; // stomp the trailing NUL
		let mut p = crate::protocol::Protocol::new();
		let (_off, m) = p.decode(&corrupted, 0);
		let mut m = m.unwrap();
		assert!(matches!(m.read("%s"), Err(DecodeError::StringMissingNul)));
	}
}
