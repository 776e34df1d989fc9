pub mod cli;
pub mod config;
pub mod connector;
pub mod dns;
pub mod logs;
pub mod remote;
pub mod sink;

pub use config::{load_config, Config};
pub use connector::Connector;
