// handlers/protected/auth/mod.rs - session introspection

pub mod user; // GET /api/user

pub use user::current_user;
