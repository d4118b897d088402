//! Connection-side state shared by every request handler: the session
//! registry, the per-connection outbound queues and the wire frame codec.

pub mod frame;
pub mod outbox;
pub mod registry;

pub use outbox::{Delivery, Outbox, Seal};
pub use registry::{ConnectionId, Session, SessionRegistry};
