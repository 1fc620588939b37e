pub mod beacon;
pub mod peers;

pub use beacon::Beacon;
pub use peers::{PeerDirectory, PeerRecord};
