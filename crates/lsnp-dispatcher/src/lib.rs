pub mod coordinator;
pub mod dispatch;

pub use coordinator::Coordinator;
pub use dispatch::{DispatchOutcome, Dispatcher};
