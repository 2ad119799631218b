//! Parses the four address forms from spec.md §6: `inet:<host>:<port>`,
//! `inet6:<host>:<port>`, `unix:<path>`, and `unix:@<name>` (abstract `AF_UNIX`).

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::error::AddrParseError;

/// Maximum payload length for an abstract Unix socket name: `sockaddr_un.sun_path` is 108 bytes,
/// minus the leading NUL that marks the name as abstract.
const MAX_ABSTRACT_NAME_LEN: usize = 107;

/// A parsed transport address, independent of whether it will be bound or connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addr {
	/// `inet:<host>:<port>`, resolved to a concrete IPv4 socket address.
	Inet(SocketAddr),
	/// `inet6:<host>:<port>`, resolved to a concrete IPv6 socket address.
	Inet6(SocketAddr),
	/// `unix:<path>`, a filesystem-named `AF_UNIX` address.
	Unix(PathBuf),
	/// `unix:@<name>`, an abstract-namespace `AF_UNIX` address (Linux only).
	UnixAbstract(String),
}

impl Addr {
	/// Parses one of the four forms. Host/port resolution happens eagerly via
	/// [`ToSocketAddrs`], matching the "fail fast on bad address syntax" requirement in
	/// SPEC_FULL.md §4.6 (the transport only retries *socket* operations, not address parsing).
	pub fn parse(s: &str) -> Result<Addr, AddrParseError> {
		let (scheme, rest) = s.split_once(':').ok_or(AddrParseError::MissingScheme)?;
		match scheme {
			"inet" => Ok(Addr::Inet(resolve_host_port(rest, false)?)),
			"inet6" => Ok(Addr::Inet6(resolve_host_port(rest, true)?)),
			"unix" => parse_unix(rest),
			other => Err(AddrParseError::UnknownScheme(other.to_owned())),
		}
	}
}

fn parse_unix(rest: &str) -> Result<Addr, AddrParseError> {
	if let Some(name) = rest.strip_prefix('@') {
		if name.len() > MAX_ABSTRACT_NAME_LEN {
			return Err(AddrParseError::AbstractNameTooLong(name.to_owned()));
		}
		Ok(Addr::UnixAbstract(name.to_owned()))
	} else {
		Ok(Addr::Unix(PathBuf::from(rest)))
	}
}

/// `bracket` wraps `host` in `[...]` before resolution, as `ToSocketAddrs` requires for literal
/// IPv6 hosts (`inet6:<host>:<port>`'s host is itself colon-separated).
fn resolve_host_port(s: &str, bracket: bool) -> Result<SocketAddr, AddrParseError> {
	let (host, port) =
		s.rsplit_once(':').ok_or_else(|| AddrParseError::MissingPort(s.to_owned()))?;
	port.parse::<u16>().map_err(|_| AddrParseError::InvalidPort(s.to_owned()))?;
	let lookup = if bracket { format!("[{}]:{}", host, port) } else { format!("{}:{}", host, port) };
	lookup
		.to_socket_addrs()
		.map_err(|_| AddrParseError::InvalidPort(s.to_owned()))?
		.next()
		.ok_or_else(|| AddrParseError::InvalidPort(s.to_owned()))
}
