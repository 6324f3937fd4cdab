pub mod config;
pub mod error;
pub mod macros;
pub mod network;
pub mod utils;

#[doc(hidden)]
pub use tracing as __tracing;
