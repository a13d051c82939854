//! Message routing between API callers, local connections and other nodes.

pub mod router;
pub mod types;

pub use router::{Delivery, GroupDelivery, MessageRouter};
pub use types::{ClientReply, ConnectAck};
