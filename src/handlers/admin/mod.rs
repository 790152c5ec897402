// handlers/admin/mod.rs - Administrator handlers (bearer token + admin allow-list)
//
// Media and settings writes are also mounted under /admin, reusing the protected handlers.

pub mod analytics;
pub mod capabilities;
pub mod keys;
