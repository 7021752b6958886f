pub mod client;
pub mod conversion;
pub mod error;
pub mod types;

pub use error::{AdminError, ServiceError, ValidationError};
