pub mod error;
pub mod transfers;

pub use error::FileError;
pub use transfers::FileTransfers;
