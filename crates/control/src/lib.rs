pub mod admin;
pub mod bootstrap;
pub mod migrations;
pub mod plan;

pub use admin::*;
pub use bootstrap::*;
pub use migrations::*;
pub use plan::*;
