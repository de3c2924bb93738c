pub mod config;
pub mod diff;
pub mod finding;
pub mod forge;
pub mod pipeline;
pub mod plan;
pub mod render;
