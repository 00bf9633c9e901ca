pub mod auth;
pub mod bridge;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod login;
pub mod middleware;
pub mod protocol;
pub mod server;
pub mod session;
pub mod window;

#[cfg(test)]
pub mod testing;
