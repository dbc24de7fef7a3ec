pub mod boundary;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod coverage;
pub mod error;
pub mod formats;
pub mod handlers;
pub mod pool;
pub mod query;
pub mod sampling;
pub mod scanner;
pub mod storage;
pub mod subset;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
