pub mod audit;
pub mod bindings;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod http_server;
pub mod interaction;
pub mod message;
pub mod options;
pub mod registry;
pub mod snowflake;
pub mod tags;

#[cfg(test)]
mod testing;
