pub mod config;
pub mod files;
pub mod hardware;

pub use config::Policy;
