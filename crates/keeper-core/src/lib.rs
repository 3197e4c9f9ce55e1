pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod queue;
pub mod selection;
pub mod store;

pub use error::{KeeperError, Result};
pub use queue::{Queue, Reconciler};
