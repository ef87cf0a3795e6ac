// crates/core/src/lib.rs
pub mod config;
pub mod error;
pub mod granularity;
pub mod period;
pub mod sample;

pub use config::*;
pub use error::*;
pub use granularity::*;
pub use period::*;
pub use sample::*;
