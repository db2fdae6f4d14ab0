pub mod activity;
pub mod beta_code;
pub mod event;
pub mod file;
pub mod table;
pub mod upload_window;
pub mod user;

pub use activity::{Activity, ActivityRecord};
pub use beta_code::{BetaCode, BetaCodeRecord};
pub use event::{Event, EventRecord, EventStatus, PublicEvent};
pub use file::{FileInfo, FileRecord};
pub use table::{TableInfo, TableRecord};
pub use upload_window::UploadWindow;
pub use user::{SessionRecord, User, UserRecord};
