pub mod cli;
pub mod config;
pub mod pipeline;
pub mod proxy;
pub mod server;
