use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use log::{error, info};

use pomp_core::transport::{connect, Addr, Context, Datagram, Event, Listener};
use pomp_core::{Message, Value};

/// `pompcli [options] <addr> [<addrto>] <msgid> [<fmt> [<args>...]]`
#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
	/// Listen for connections or datagrams instead of connecting/sending out.
	#[clap(short, long)]
	server: bool,

	/// Connect to a peer and send a message (default).
	#[clap(short, long, conflicts_with = "server")]
	client: bool,

	/// Use a datagram socket (UDP, or `AF_UNIX SOCK_DGRAM`) instead of a stream.
	#[clap(short, long)]
	udp: bool,

	/// Stay connected after the initial send/bind and print every message received.
	#[clap(short, long)]
	dump: bool,

	/// Stop waiting for messages after this many seconds.
	#[clap(short, long)]
	timeout: Option<u64>,

	/// Suppress informational output; only errors are logged.
	#[clap(short, long)]
	quiet: bool,

	/// Increase log verbosity. Repeatable (-v, -vv).
	#[clap(short, long, action = clap::ArgAction::Count)]
	verbose: u8,

	/// `<addr> [<addrto>] <msgid> [<fmt> [<args>...]]`, see spec §6 for the address syntax.
	#[clap(required = true)]
	positional: Vec<String>,
}

/// The positional arguments, disambiguated: `<addrto>` is only ever present in `--udp` client
/// mode, and is recognized by successfully parsing as an address (the grammar in spec.md §6 is
/// otherwise ambiguous between `<addrto>` and `<msgid>`).
struct Parsed {
	addr: Addr,
	addrto: Option<Addr>,
	msgid: u32,
	fmt: String,
	raw_args: Vec<String>,
}

fn parse_positional(udp: bool, positional: &[String]) -> Result<Parsed> {
	let mut it = positional.iter();

	let addr_str = it.next().context("missing <addr>")?;
	let addr = Addr::parse(addr_str).with_context(|| format!("invalid address `{}`", addr_str))?;

	let mut next = it.next().cloned();
	let addrto = if udp {
		match &next {
			Some(s) if Addr::parse(s).is_ok() => {
				let parsed = Addr::parse(s).expect("just checked Ok above");
				next = it.next().cloned();
				Some(parsed)
			}
			_ => None,
		}
	} else {
		None
	};

	let msgid_str = next.context("missing <msgid>")?;
	let msgid: u32 = msgid_str
		.parse()
		.with_context(|| format!("invalid message id `{}`", msgid_str))?;

	let fmt = it.next().cloned().unwrap_or_default();
	let raw_args: Vec<String> = it.cloned().collect();

	Ok(Parsed { addr, addrto, msgid, fmt, raw_args })
}

/// Coerces `raw` into one [`Value`] per conversion in `fmt`. Width flags (`l`/`h`/`hh`/`ll`) are
/// ignored here: `Message::write` masks integer values down to the conversion's actual width
/// (spec.md §4.2), so the CLI only needs to know whether a conversion is signed, unsigned, float,
/// string, or buffer.
fn coerce_args(fmt: &str, raw: &[String]) -> Result<Vec<Value>> {
	let mut values = Vec::with_capacity(raw.len());
	let mut raw_iter = raw.iter();
	let mut chars = fmt.chars().peekable();

	while let Some(c) = chars.next() {
		if c != '%' {
			continue;
		}
		while matches!(chars.peek(), Some('l') | Some('h')) {
			chars.next();
		}
		let conv = chars.next().context("unterminated conversion in format string")?;
		let arg = raw_iter
			.next()
			.with_context(|| format!("missing argument for conversion `%{}`", conv))?;
		let value = match conv {
			'd' | 'i' => Value::I64(
				arg.parse::<i64>().with_context(|| format!("`{}` is not an integer", arg))?,
			),
			'u' => Value::U64(
				arg.parse::<u64>().with_context(|| format!("`{}` is not an unsigned integer", arg))?,
			),
			'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
				Value::F64(arg.parse::<f64>().with_context(|| format!("`{}` is not a number", arg))?)
			}
			's' => Value::Str(arg.clone()),
			'p' => Value::Buf(arg.as_bytes().to_vec()),
			other => anyhow::bail!("unsupported conversion `%{}`", other),
		};
		values.push(value);
	}
	Ok(values)
}

fn main() -> ExitCode {
	let args = Args::parse();

	let level = if args.quiet {
		log::LevelFilter::Error
	} else {
		match args.verbose {
			0 => log::LevelFilter::Info,
			1 => log::LevelFilter::Debug,
			_ => log::LevelFilter::Trace,
		}
	};
	env_logger::Builder::new().filter_level(level).init();

	match run(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{:#}", e);
			ExitCode::from(1)
		}
	}
}

fn run(args: Args) -> Result<()> {
	let parsed = parse_positional(args.udp, &args.positional)?;
	let values = coerce_args(&parsed.fmt, &parsed.raw_args)?;
	let timeout = args.timeout.map(Duration::from_secs);

	if args.udp {
		run_udp(parsed, args.server, &values, args.dump, timeout)
	} else if args.server {
		run_stream_server(parsed.addr, args.dump, timeout)
	} else {
		run_stream_client(parsed.addr, parsed.msgid, &parsed.fmt, &values, args.dump, timeout)
	}
}

fn run_stream_server(addr: Addr, dump: bool, timeout: Option<Duration>) -> Result<()> {
	let (tx, rx) = unbounded();
	let ctx = Context::new(move |event| {
		let _ = tx.send(event);
	});
	let _listener = Listener::bind(addr, ctx, None)?;
	wait_and_print(&rx, dump, timeout)
}

fn run_stream_client(
	addr: Addr,
	msgid: u32,
	fmt: &str,
	values: &[Value],
	dump: bool,
	timeout: Option<Duration>,
) -> Result<()> {
	let (tx, rx) = unbounded();
	let ctx = Context::new(move |event| {
		let _ = tx.send(event);
	});
	let conn = connect(&addr, ctx, None)?;

	let mut msg = Message::new();
	msg.write(msgid, fmt, values)?;
	conn.send_msg(msg)?;

	if dump || timeout.is_some() {
		wait_and_print(&rx, dump, timeout)
	} else {
		Ok(())
	}
}

fn run_udp(parsed: Parsed, server: bool, values: &[Value], dump: bool, timeout: Option<Duration>) -> Result<()> {
	let (tx, rx) = unbounded();
	let ctx = Context::new(move |event| {
		let _ = tx.send(event);
	});
	let sock = Datagram::bind(parsed.addr, ctx, None)?;

	if !server {
		let dest = parsed
			.addrto
			.context("udp client mode requires a destination <addrto> address")?;
		let mut msg = Message::new();
		msg.write(parsed.msgid, &parsed.fmt, values)?;
		sock.send_to(&msg, &dest)?;
	}

	if server || dump || timeout.is_some() {
		wait_and_print(&rx, dump, timeout)
	} else {
		Ok(())
	}
}

/// Drains `rx`, printing each received message's `dump()`. Returns once `timeout` elapses, the
/// channel disconnects, or (when `dump` is false) the first message has been printed.
fn wait_and_print(rx: &Receiver<Event>, dump: bool, timeout: Option<Duration>) -> Result<()> {
	let deadline = timeout.map(|d| Instant::now() + d);
	loop {
		let received = match deadline {
			Some(dl) => rx.recv_timeout(dl.saturating_duration_since(Instant::now())),
			None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
		};
		match received {
			Ok(Event::Received(id, mut msg)) => {
				match msg.dump() {
					Ok(text) => println!("{}", text),
					Err(e) => error!("connection {}: malformed message: {}", id, e),
				}
				if !dump {
					return Ok(());
				}
			}
			Ok(Event::Connected(id)) => info!("connection {} established", id),
			Ok(Event::Disconnected(id)) => info!("connection {} closed", id),
			Err(RecvTimeoutError::Timeout) => return Ok(()),
			Err(RecvTimeoutError::Disconnected) => return Ok(()),
		}
		if deadline.is_some_and(|dl| Instant::now() >= dl) {
			return Ok(());
		}
	}
}
