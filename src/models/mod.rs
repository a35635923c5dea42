pub mod contact;
pub mod news;
pub mod settings;
pub mod status;

pub use contact::{ContactMessage, NewContact};
pub use news::{NewsDraft, NewsPost};
pub use settings::{SiteSettings, SiteSettingsPatch};
pub use status::{ServerState, ServerStatus, ServerStatusPatch};

/// Id of the single row kept in `server_status` and `site_settings`.
pub const SINGLETON_ID: i64 = 1;
