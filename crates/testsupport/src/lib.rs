pub mod fixtures;
pub mod http_client;
pub mod memory_admin;
pub mod server;

pub use fixtures::*;
pub use http_client::*;
pub use memory_admin::*;
pub use server::*;
