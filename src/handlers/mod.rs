// handlers/mod.rs - two handler tiers
//
// Public (no auth): simple-login, logout
// Protected (cookie session or bearer token): current user
pub mod protected;
pub mod public;
