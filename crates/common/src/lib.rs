//! Common types shared by the playlistinator crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
