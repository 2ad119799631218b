//! Connection-oriented stream transport: a `Listener`/`Connection` pair over TCP or Unix stream
//! sockets, each accepted connection getting one reader thread and one writer thread (spec.md
//! §5, §7). See SPEC_FULL.md §4.6.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use log::{debug, warn};

use crate::error::TransportError;
use crate::message::Message;
use crate::protocol::Protocol;

use super::addr::Addr;
use super::context::{ConnId, Context, Event};

/// Recoverable socket errors during listen/connect/bind are retried after this delay and never
/// propagated to the caller (spec.md §7).
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Read buffer size for each reader thread's `read` call.
const READ_CHUNK: usize = 4096;

enum RawStream {
	Tcp(TcpStream),
	Unix(UnixStream),
}

impl RawStream {
	fn try_clone(&self) -> io::Result<RawStream> {
		match self {
			RawStream::Tcp(s) => s.try_clone().map(RawStream::Tcp),
			RawStream::Unix(s) => s.try_clone().map(RawStream::Unix),
		}
	}
}

impl Read for RawStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		match self {
			RawStream::Tcp(s) => s.read(buf),
			RawStream::Unix(s) => s.read(buf),
		}
	}
}

impl Write for RawStream {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self {
			RawStream::Tcp(s) => s.write(buf),
			RawStream::Unix(s) => s.write(buf),
		}
	}
	fn flush(&mut self) -> io::Result<()> {
		match self {
			RawStream::Tcp(s) => s.flush(),
			RawStream::Unix(s) => s.flush(),
		}
	}
}

enum RawListener {
	Tcp(TcpListener),
	Unix(UnixListener),
}

impl RawListener {
	fn bind(addr: &Addr) -> Result<RawListener, TransportError> {
		match addr {
			Addr::Inet(sa) | Addr::Inet6(sa) => Ok(RawListener::Tcp(TcpListener::bind(sa)?)),
			Addr::Unix(path) => {
				// a stale socket file from a previous run otherwise makes bind fail forever
				let _ = std::fs::remove_file(path);
				Ok(RawListener::Unix(UnixListener::bind(path)?))
			}
			Addr::UnixAbstract(name) => Ok(RawListener::Unix(bind_abstract(name)?)),
		}
	}

	fn accept(&self) -> io::Result<RawStream> {
		match self {
			RawListener::Tcp(l) => l.accept().map(|(s, _)| RawStream::Tcp(s)),
			RawListener::Unix(l) => l.accept().map(|(s, _)| RawStream::Unix(s)),
		}
	}
}

#[cfg(target_os = "linux")]
fn bind_abstract(name: &str) -> io::Result<UnixListener> {
	use std::os::linux::net::SocketAddrExt;
	use std::os::unix::net::SocketAddr as UnixSocketAddr;
	let sa = UnixSocketAddr::from_abstract_name(name.as_bytes())?;
	UnixListener::bind_addr(&sa)
}

#[cfg(not(target_os = "linux"))]
fn bind_abstract(_name: &str) -> io::Result<UnixListener> {
	Err(io::Error::new(io::ErrorKind::Unsupported, "abstract unix sockets require Linux"))
}

/// A single accepted (or connected) stream connection: one reader thread feeding bytes through a
/// [`Protocol`] and posting completed [`Message`]s to the [`Context`], and one writer thread
/// draining an unbounded queue of outgoing messages.
pub struct Connection {
	id: ConnId,
	write_tx: Sender<Message>,
}

impl Connection {
	/// Spawns the reader and writer threads and detaches them: per spec.md §5 the core has no
	/// cancellation tokens, so the threads run until the peer disconnects or the writer channel
	/// is dropped, reporting back through `ctx` rather than through a joinable handle.
	fn spawn(
		stream: RawStream,
		id: ConnId,
		ctx: Context,
		max_message_size: Option<u32>,
	) -> Connection {
		let reader_stream = stream;
		let writer_stream = reader_stream.try_clone().expect("try_clone on a live socket");

		let reader_ctx = ctx.clone();
		thread::spawn(move || {
			Self::read_loop(reader_stream, id, reader_ctx, max_message_size);
		});

		let (write_tx, write_rx) = unbounded::<Message>();
		thread::spawn(move || {
			Self::write_loop(writer_stream, write_rx);
		});

		Connection { id, write_tx }
	}

	fn read_loop(mut stream: RawStream, id: ConnId, ctx: Context, max_message_size: Option<u32>) {
		let mut protocol = match max_message_size {
			Some(max) => Protocol::with_max_message_size(max),
			None => Protocol::new(),
		};
		let mut chunk = [0u8; READ_CHUNK];
		loop {
			match stream.read(&mut chunk) {
				Ok(0) => break,
				Ok(n) => {
					let mut offset = 0;
					while offset < n {
						let (new_offset, msg) = protocol.decode(&chunk[..n], offset);
						offset = new_offset;
						if let Some(msg) = msg {
							ctx.dispatch(Event::Received(id, msg));
						}
					}
				}
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => {
					debug!("pomp: connection {} read error: {}", id, e);
					break;
				}
			}
		}
		ctx.dispatch(Event::Disconnected(id));
	}

	fn write_loop(mut stream: RawStream, rx: crossbeam_channel::Receiver<Message>) {
		for msg in rx {
			if let Err(e) = stream.write_all(msg.bytes()) {
				debug!("pomp: connection write error: {}", e);
				break;
			}
		}
	}

	pub fn id(&self) -> ConnId {
		self.id
	}

	/// Enqueues `msg` for the writer thread. Fails only if the connection has already shut down.
	pub fn send_msg(&self, msg: Message) -> Result<(), TransportError> {
		self.write_tx
			.send(msg)
			.map_err(|_| TransportError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed")))
	}
}

/// Owns a background accept loop. `bind`/`accept` failures are logged and retried every
/// [`RETRY_DELAY`] rather than propagated (spec.md §7); only a malformed address fails the
/// constructor itself.
pub struct Listener {
	accept_thread: Option<JoinHandle<()>>,
}

impl Listener {
	pub fn bind(
		addr: Addr,
		ctx: Context,
		max_message_size: Option<u32>,
	) -> Result<Listener, TransportError> {
		let accept_next_id = Arc::new(AtomicU64::new(1));

		let accept_thread = thread::spawn(move || {
			let listener = loop {
				match RawListener::bind(&addr) {
					Ok(l) => break l,
					Err(e) => {
						warn!("pomp: bind failed ({}), retrying in {:?}", e, RETRY_DELAY);
						thread::sleep(RETRY_DELAY);
					}
				}
			};
			loop {
				match listener.accept() {
					Ok(stream) => {
						let id = accept_next_id.fetch_add(1, Ordering::SeqCst);
						// the reader/writer threads are already detached and keep running
						// independent of this value's lifetime; dropping it here only drops the
						// local id/sender fields, not the connection itself.
						let _conn = Connection::spawn(stream, id, ctx.clone(), max_message_size);
						ctx.dispatch(Event::Connected(id));
					}
					Err(e) => {
						warn!("pomp: accept failed ({}), retrying in {:?}", e, RETRY_DELAY);
						thread::sleep(RETRY_DELAY);
					}
				}
			}
		});

		Ok(Listener { accept_thread: Some(accept_thread) })
	}
}

impl Drop for Listener {
	fn drop(&mut self) {
		// the accept loop has no cancellation token (spec.md §5: "the core has no timers and no
		// cancellation tokens"); detach it rather than blocking the caller's drop indefinitely.
		self.accept_thread.take();
	}
}

/// Connects to `addr` as a client, returning a [`Connection`] with its reader/writer threads
/// already running.
pub fn connect(
	addr: &Addr,
	ctx: Context,
	max_message_size: Option<u32>,
) -> Result<Connection, TransportError> {
	let stream = match addr {
		Addr::Inet(sa) | Addr::Inet6(sa) => RawStream::Tcp(TcpStream::connect(sa)?),
		Addr::Unix(path) => RawStream::Unix(UnixStream::connect(path)?),
		Addr::UnixAbstract(name) => RawStream::Unix(connect_abstract(name)?),
	};
	Ok(Connection::spawn(stream, 0, ctx, max_message_size))
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> io::Result<UnixStream> {
	use std::os::linux::net::SocketAddrExt;
	use std::os::unix::net::SocketAddr as UnixSocketAddr;
	let sa = UnixSocketAddr::from_abstract_name(name.as_bytes())?;
	UnixStream::connect_addr(&sa)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_name: &str) -> io::Result<UnixStream> {
	Err(io::Error::new(io::ErrorKind::Unsupported, "abstract unix sockets require Linux"))
}
