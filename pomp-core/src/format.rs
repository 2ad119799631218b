//! The printf-style format grammar shared by [`Encoder::write`](crate::encoder::Encoder::write)
//! and [`Decoder::read`](crate::decoder::Decoder::read). See spec.md §4.2: the grammar is
//! identical on both sides, so it lives in its own module rather than being duplicated.

use crate::value::Tag;

/// One parsed `%...` conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conv {
	I8,
	U8,
	I16,
	U16,
	I32,
	U32,
	I64,
	U64,
	F32,
	F64,
	Str,
	Buf,
}

impl Conv {
	pub fn tag(self) -> Tag {
		match self {
			Conv::I8 => Tag::I8,
			Conv::U8 => Tag::U8,
			Conv::I16 => Tag::I16,
			Conv::U16 => Tag::U16,
			Conv::I32 => Tag::I32,
			Conv::U32 => Tag::U32,
			Conv::I64 => Tag::I64,
			Conv::U64 => Tag::U64,
			Conv::F32 => Tag::F32,
			Conv::F64 => Tag::F64,
			Conv::Str => Tag::Str,
			Conv::Buf => Tag::Buf,
		}
	}
}

/// Failure while parsing a format string. `EncodeError` and `DecodeError` each carry a
/// one-for-one variant and convert from this via `From` (see `error.rs`).
#[derive(Debug, Clone)]
pub enum FormatError {
	InvalidChar(char),
	UnterminatedConversion,
	UnsupportedWidth { flags: String, conv: char },
}

/// Parses a full format string into its sequence of conversions (spec.md §4.2's grammar).
pub fn parse(fmt: &str) -> Result<Vec<Conv>, FormatError> {
	let mut chars = fmt.chars();
	let mut out = Vec::new();
	while let Some(c) = chars.next() {
		if c != '%' {
			return Err(FormatError::InvalidChar(c));
		}
		let mut flags = String::new();
		let conv_char = loop {
			match chars.next() {
				Some(f) if f == 'l' || f == 'h' => flags.push(f),
				Some(c) => break c,
				None => return Err(FormatError::UnterminatedConversion),
			}
		};
		out.push(resolve(&flags, conv_char)?);
	}
	Ok(out)
}

/// Number of `%` conversions a format string would parse into, without building the `Vec`.
/// Used to check the "format idempotence" invariant (spec.md §8): a format string consumes a
/// fixed number of arguments equal to its number of conversions.
pub fn count_conversions(fmt: &str) -> usize {
	fmt.chars().filter(|&c| c == '%').count()
}

fn resolve(flags: &str, conv_char: char) -> Result<Conv, FormatError> {
	let unsupported =
		|| FormatError::UnsupportedWidth { flags: flags.to_owned(), conv: conv_char };
	match conv_char {
		'd' | 'i' => match flags {
			"" | "l" => Ok(Conv::I32),
			"h" => Ok(Conv::I16),
			"hh" => Ok(Conv::I8),
			"ll" => Ok(Conv::I64),
			_ => Err(unsupported()),
		},
		'u' => match flags {
			"" | "l" => Ok(Conv::U32),
			"h" => Ok(Conv::U16),
			"hh" => Ok(Conv::U8),
			"ll" => Ok(Conv::U64),
			_ => Err(unsupported()),
		},
		'f' | 'F' | 'e' | 'E' | 'g' | 'G' => match flags {
			"" => Ok(Conv::F32),
			"l" => Ok(Conv::F64),
			_ => Err(unsupported()),
		},
		's' => {
			if flags.is_empty() {
				Ok(Conv::Str)
			} else {
				Err(unsupported())
			}
		}
		'p' => {
			if flags.is_empty() {
				Ok(Conv::Buf)
			} else {
				Err(unsupported())
			}
		}
		other => Err(FormatError::InvalidChar(other)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_the_all_types_format_string() {
		let convs = parse("%hhd%hhu%hd%hu%d%u%lld%llu%s%p%f%lf").unwrap();
		assert_eq!(
			convs,
			vec![
				Conv::I8,
				Conv::U8,
				Conv::I16,
				Conv::U16,
				Conv::I32,
				Conv::U32,
				Conv::I64,
				Conv::U64,
				Conv::Str,
				Conv::Buf,
				Conv::F32,
				Conv::F64,
			]
		);
	}

	#[test]
	fn empty_format_parses_to_no_conversions() {
		assert_eq!(parse("").unwrap(), vec![]);
	}

	#[test]
	fn rejects_stray_bytes_between_conversions() {
		assert!(matches!(parse("%dx%d"), Err(FormatError::InvalidChar('x'))));
	}

	#[test]
	fn rejects_unterminated_percent() {
		assert!(matches!(parse("%d%"), Err(FormatError::UnterminatedConversion)));
	}

	#[test]
	fn rejects_float_with_integer_width_flag() {
		assert!(matches!(parse("%hf"), Err(FormatError::UnsupportedWidth { .. })));
		assert!(matches!(parse("%hhf"), Err(FormatError::UnsupportedWidth { .. })));
		assert!(matches!(parse("%llf"), Err(FormatError::UnsupportedWidth { .. })));
	}

	#[test]
	fn rejects_unknown_conversion_char() {
		assert!(matches!(parse("%z"), Err(FormatError::InvalidChar('z'))));
	}

	#[test]
	fn count_conversions_matches_parse_len() {
		let fmt = "%d%s%p%lf";
		assert_eq!(count_conversions(fmt), parse(fmt).unwrap().len());
	}
}
