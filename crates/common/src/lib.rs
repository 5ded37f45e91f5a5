//! Types shared between the oauthorizer library and its demo service

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
