pub mod ack;
pub mod error;
pub mod udp;

pub use ack::{AckManager, ResendHandler};
pub use error::TransportError;
pub use udp::{compute_broadcast, local_ip, Inbound, Transport};
