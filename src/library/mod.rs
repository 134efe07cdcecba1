//! Remote library listing and the wire types shared with the upload pipeline.

pub mod error;
pub mod inventory;
pub mod types;

pub use self::error::LibraryError;
pub use self::inventory::{load_all, RemoteInventory};
