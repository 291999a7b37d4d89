pub mod config;
pub mod ipc;
pub mod logging;
