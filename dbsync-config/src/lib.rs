//! Configuration types and loading for the dbsync workspace.

mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, LoadConfigErrorKind, load_config_file};
