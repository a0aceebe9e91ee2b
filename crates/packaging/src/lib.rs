pub mod containerfile;
pub mod image_builder;
pub mod inspect;
pub mod lockfile;
pub mod manifest;
pub mod plan;
pub mod service;
pub mod verify;

pub use containerfile::*;
pub use image_builder::*;
pub use inspect::*;
pub use lockfile::*;
pub use manifest::*;
pub use plan::*;
pub use service::*;
pub use verify::*;
