pub mod btih;
pub mod config;
pub mod digest;
pub mod error;
pub mod path_safety;
pub mod record;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod verify;
pub mod zsync;

pub use error::{Error, Result, StoreError};
