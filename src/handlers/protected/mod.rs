// handlers/protected/mod.rs - API key handlers
//
// Every route here sits behind `api_key_middleware` with the capability it needs.
// The authorized key is available as an `Extension<AuthorizedKey>`.

pub mod media;
pub mod ping;
pub mod settings;

pub use media::{media_create, media_delete, media_get, media_list, media_update};
pub use ping::ping;
pub use settings::{settings_get, settings_update};
