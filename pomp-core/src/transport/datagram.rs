//! Connectionless datagram transport: a single `UdpSocket`/`UnixDatagram`, one receiver thread
//! feeding each inbound packet through a fresh [`Protocol`] (datagrams are not a byte stream, so
//! there is nothing to resynchronize across packets), and a `sendTo` that frames and ships a
//! [`Message`] in one shot. See spec.md §6, §7 and SPEC_FULL.md §4.6.

use std::io;
use std::net::UdpSocket;
use std::os::unix::net::UnixDatagram;
use std::thread;

use log::{debug, warn};

use crate::error::TransportError;
use crate::message::Message;
use crate::protocol::Protocol;

use super::addr::Addr;
use super::context::{ConnId, Context, Event};

/// Read buffer size for each inbound `recv` call. Large enough for any single POMP datagram this
/// transport is expected to see; a datagram larger than this is truncated by the OS and the
/// resulting partial message fails to re-frame, which the receive loop logs and discards.
const RECV_CHUNK: usize = 65536;

enum RawDatagram {
	Udp(UdpSocket),
	Unix(UnixDatagram),
}

impl RawDatagram {
	fn bind(addr: &Addr) -> Result<RawDatagram, TransportError> {
		match addr {
			Addr::Inet(sa) | Addr::Inet6(sa) => Ok(RawDatagram::Udp(UdpSocket::bind(sa)?)),
			Addr::Unix(path) => {
				let _ = std::fs::remove_file(path);
				Ok(RawDatagram::Unix(UnixDatagram::bind(path)?))
			}
			Addr::UnixAbstract(name) => Ok(RawDatagram::Unix(bind_abstract(name)?)),
		}
	}

	fn try_clone(&self) -> io::Result<RawDatagram> {
		match self {
			RawDatagram::Udp(s) => s.try_clone().map(RawDatagram::Udp),
			RawDatagram::Unix(s) => s.try_clone().map(RawDatagram::Unix),
		}
	}

	fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
		match self {
			RawDatagram::Udp(s) => s.recv(buf),
			RawDatagram::Unix(s) => s.recv(buf),
		}
	}

	fn send_to(&self, buf: &[u8], addr: &Addr) -> io::Result<usize> {
		match (self, addr) {
			(RawDatagram::Udp(s), Addr::Inet(sa) | Addr::Inet6(sa)) => s.send_to(buf, sa),
			(RawDatagram::Unix(s), Addr::Unix(path)) => s.send_to(buf, path),
			(RawDatagram::Unix(s), Addr::UnixAbstract(name)) => {
				send_to_abstract(s, buf, name)
			}
			_ => Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				"datagram socket family does not match destination address family",
			)),
		}
	}

	fn send(&self, buf: &[u8]) -> io::Result<usize> {
		match self {
			RawDatagram::Udp(s) => s.send(buf),
			RawDatagram::Unix(s) => s.send(buf),
		}
	}

	fn connect(&self, addr: &Addr) -> io::Result<()> {
		match (self, addr) {
			(RawDatagram::Udp(s), Addr::Inet(sa) | Addr::Inet6(sa)) => s.connect(sa),
			(RawDatagram::Unix(s), Addr::Unix(path)) => s.connect(path),
			(RawDatagram::Unix(s), Addr::UnixAbstract(name)) => connect_abstract(s, name),
			_ => Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				"datagram socket family does not match destination address family",
			)),
		}
	}
}

#[cfg(target_os = "linux")]
fn bind_abstract(name: &str) -> io::Result<UnixDatagram> {
	use std::os::linux::net::SocketAddrExt;
	use std::os::unix::net::SocketAddr as UnixSocketAddr;
	let sa = UnixSocketAddr::from_abstract_name(name.as_bytes())?;
	UnixDatagram::bind_addr(&sa)
}

#[cfg(not(target_os = "linux"))]
fn bind_abstract(_name: &str) -> io::Result<UnixDatagram> {
	Err(io::Error::new(io::ErrorKind::Unsupported, "abstract unix sockets require Linux"))
}

#[cfg(target_os = "linux")]
fn send_to_abstract(s: &UnixDatagram, buf: &[u8], name: &str) -> io::Result<usize> {
	use std::os::linux::net::SocketAddrExt;
	use std::os::unix::net::SocketAddr as UnixSocketAddr;
	let sa = UnixSocketAddr::from_abstract_name(name.as_bytes())?;
	s.send_to_addr(buf, &sa)
}

#[cfg(not(target_os = "linux"))]
fn send_to_abstract(_s: &UnixDatagram, _buf: &[u8], _name: &str) -> io::Result<usize> {
	Err(io::Error::new(io::ErrorKind::Unsupported, "abstract unix sockets require Linux"))
}

#[cfg(target_os = "linux")]
fn connect_abstract(s: &UnixDatagram, name: &str) -> io::Result<()> {
	use std::os::linux::net::SocketAddrExt;
	use std::os::unix::net::SocketAddr as UnixSocketAddr;
	let sa = UnixSocketAddr::from_abstract_name(name.as_bytes())?;
	s.connect_addr(&sa)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_s: &UnixDatagram, _name: &str) -> io::Result<()> {
	Err(io::Error::new(io::ErrorKind::Unsupported, "abstract unix sockets require Linux"))
}

/// A bound datagram socket with a background receive loop. Every inbound packet is handed to a
/// fresh [`Protocol`]: a well-formed packet contains exactly one message (spec.md's framer is
/// built for streams, but reframing a single complete-or-nothing datagram through it costs
/// nothing and reuses the same magic/size validation).
pub struct Datagram {
	id: ConnId,
	sock: RawDatagram,
}

impl Datagram {
	/// Binds `addr` and starts the receive loop, dispatching `Event::Received` for each
	/// successfully-framed packet.
	pub fn bind(addr: Addr, ctx: Context, max_message_size: Option<u32>) -> Result<Datagram, TransportError> {
		let sock = RawDatagram::bind(&addr)?;
		let reader_sock = sock.try_clone()?;
		let id: ConnId = 0;

		thread::spawn(move || {
			Self::recv_loop(reader_sock, id, ctx, max_message_size);
		});

		Ok(Datagram { id, sock })
	}

	fn recv_loop(sock: RawDatagram, id: ConnId, ctx: Context, max_message_size: Option<u32>) {
		let mut chunk = vec![0u8; RECV_CHUNK];
		loop {
			match sock.recv(&mut chunk) {
				Ok(n) => {
					let mut protocol = match max_message_size {
						Some(max) => Protocol::with_max_message_size(max),
						None => Protocol::new(),
					};
					let (_consumed, msg) = protocol.decode(&chunk[..n], 0);
					match msg {
						Some(msg) => ctx.dispatch(Event::Received(id, msg)),
						None => warn!("pomp: datagram of {} bytes did not frame a complete message", n),
					}
				}
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => {
					debug!("pomp: datagram receive error: {}", e);
					break;
				}
			}
		}
		ctx.dispatch(Event::Disconnected(id));
	}

	pub fn id(&self) -> ConnId {
		self.id
	}

	/// Frames and sends `msg` to `dest` in one call (spec.md §6's `sendMsgTo`).
	pub fn send_to(&self, msg: &Message, dest: &Addr) -> Result<(), TransportError> {
		self.sock.send_to(msg.bytes(), dest)?;
		Ok(())
	}

	/// Connects the underlying socket to `dest` so subsequent [`send`](Self::send) calls need no
	/// destination address.
	pub fn connect(&self, dest: &Addr) -> Result<(), TransportError> {
		self.sock.connect(dest)?;
		Ok(())
	}

	/// Sends `msg` to whatever address [`connect`](Self::connect) bound this socket to.
	pub fn send(&self, msg: &Message) -> Result<(), TransportError> {
		self.sock.send(msg.bytes())?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};
	use std::time::Duration;

	#[test]
	fn udp_round_trip_delivers_one_message() {
		let received = Arc::new(Mutex::new(Vec::new()));
		let received2 = received.clone();
		let ctx = Context::new(move |event| {
			if let Event::Received(_, msg) = event {
				received2.lock().unwrap().push(msg.id());
			}
		});

		// bind an ephemeral port first just to discover a free one, then bind the real
		// server socket to that same port by address
		let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
		let port = probe.local_addr().unwrap().port();
		drop(probe);
		let bound_addr = Addr::parse(&format!("inet:127.0.0.1:{}", port)).unwrap();

		let server = Datagram::bind(bound_addr.clone(), ctx, None).unwrap();
		let _ = server.id();

		let client_ctx = Context::new(|_event| {});
		let client_addr = Addr::parse("inet:127.0.0.1:0").unwrap();
		let client = Datagram::bind(client_addr, client_ctx, None).unwrap();

		let mut msg = Message::new();
		msg.write(55, "%d", &[crate::value::Value::I32(9)]).unwrap();
		client.send_to(&msg, &bound_addr).unwrap();

		thread::sleep(Duration::from_millis(150));
		assert_eq!(*received.lock().unwrap(), vec![55]);
	}
}
