//! The event-dispatch context: a background "main handler" thread that serializes
//! `Connected`/`Disconnected`/`Received` notifications to one user-supplied callback. See
//! spec.md §5 ("funnels three classes of requests ... to a user callback ... invoked on exactly
//! one thread") and SPEC_FULL.md §4.6.

use std::thread;

use crossbeam_channel::{unbounded, Sender};

use crate::message::Message;

/// A unique, process-local connection identifier handed out by [`Listener`](super::stream::Listener)
/// and [`Datagram`](super::datagram::Datagram).
pub type ConnId = u64;

/// One of the three notifications the transport delivers to the user callback.
pub enum Event {
	Connected(ConnId),
	Disconnected(ConnId),
	Received(ConnId, Message),
}

/// Owns the background dispatch thread. Cloning a `Context` shares the same thread and callback;
/// every clone's events are serialized onto the same channel, so the callback still only ever
/// runs on one thread.
pub struct Context {
	tx: Sender<Event>,
}

impl Context {
	/// Spawns the main-handler thread, which calls `handler` once per event until every `Context`
	/// clone (and its derived connections) has been dropped.
	pub fn new<F>(mut handler: F) -> Context
	where
		F: FnMut(Event) + Send + 'static,
	{
		let (tx, rx) = unbounded();
		thread::spawn(move || {
			for event in rx {
				handler(event);
			}
		});
		Context { tx }
	}

	/// Posts an event to the main-handler thread. Silently dropped if the handler thread has
	/// already exited (e.g. the user callback panicked) — matching spec.md §7's "never
	/// propagate" stance for transport-internal failures.
	pub(crate) fn dispatch(&self, event: Event) {
		let _ = self.tx.send(event);
	}
}

impl Clone for Context {
	fn clone(&self) -> Self {
		Context { tx: self.tx.clone() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};
	use std::time::Duration;

	#[test]
	fn events_reach_the_callback_in_order() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let seen2 = seen.clone();
		let ctx = Context::new(move |event| {
			let tag = match event {
				Event::Connected(id) => format!("connected:{}", id),
				Event::Disconnected(id) => format!("disconnected:{}", id),
				Event::Received(id, msg) => format!("received:{}:{}", id, msg.id()),
			};
			seen2.lock().unwrap().push(tag);
		});

		ctx.dispatch(Event::Connected(1));
		let mut msg = Message::new();
		msg.write(5, "", &[]).unwrap();
		ctx.dispatch(Event::Received(1, msg));
		ctx.dispatch(Event::Disconnected(1));

		// give the background thread a moment to drain
		thread::sleep(Duration::from_millis(100));
		let seen = seen.lock().unwrap();
		assert_eq!(*seen, vec!["connected:1", "received:1:5", "disconnected:1"]);
	}
}
