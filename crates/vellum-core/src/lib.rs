mod error;
pub use error::Error;

pub mod key;
pub use key::DocumentId;

pub mod schema;

pub mod store;

pub mod value;

/// A Result type alias that uses Vellum's [`Error`] type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use async_trait::async_trait;
