mod clock;
pub mod display;
pub mod ids;
pub mod message;
pub mod token;
pub mod wire;

pub use clock::{Clock, FixedClock, SystemClock};
pub use display::{Display, RecordingDisplay, StdoutDisplay};
pub use ids::{Endpoint, UserId};
pub use message::Message;
pub use token::{RevocationSet, Scope, Token};
