pub mod cli;
pub mod clients;
pub mod commands;
pub mod config;
pub mod logging;
pub mod store;
pub mod sync;
pub mod transform;
