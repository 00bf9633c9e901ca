// handlers/public/auth/mod.rs - session acquisition and release

pub mod login; // POST /api/auth/simple-login
pub mod logout; // POST /api/logout

pub use login::simple_login;
pub use logout::logout;
