// handlers/mod.rs - three access tiers
//
// Public (no credentials) → Protected (API key + capability) → Admin (bearer token + allow-list)

pub mod admin;
pub mod protected;
pub mod public;
