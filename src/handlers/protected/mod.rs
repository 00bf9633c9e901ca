// handlers/protected/mod.rs - endpoints that require a session
pub mod auth;
