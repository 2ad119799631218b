//! Transport glue: the external collaborator described by spec.md §6's "transport collaborator
//! contract". Everything here is conventional I/O plumbing built on top of the core codec/framer
//! in the parent module — address parsing, stream listen/connect, datagram send/receive, and the
//! event-dispatch context that serializes notifications to a user callback.

pub mod addr;
pub mod context;
pub mod datagram;
pub mod stream;

pub use addr::Addr;
pub use context::{ConnId, Context, Event};
pub use datagram::Datagram;
pub use stream::{connect, Connection, Listener};
