pub mod http;
pub mod monitor;
pub mod runner;

pub use http::*;
pub use monitor::*;
pub use runner::*;
