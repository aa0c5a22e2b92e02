pub mod build;
pub mod config;
pub mod extensions;
pub mod list;
pub mod status;
