use redb::TableDefinition;

/// Events table: event code (uppercase) -> EventRecord (serialized)
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Event tables: "{event_code}:{table_id}" -> TableRecord (serialized)
///
/// Tables are keyed independently so concurrent edits to different tables
/// of the same event never rewrite each other.
pub const EVENT_TABLES: TableDefinition<&str, &[u8]> = TableDefinition::new("event_tables");

/// Files table: "{event_code}:{file_id}" -> FileRecord (serialized)
/// The composite key makes per-event listing a prefix range scan.
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Users table: lowercased email -> UserRecord (serialized)
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Sessions table: HMAC-SHA256 token hash -> SessionRecord (serialized)
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Beta codes table: code (uppercase) -> BetaCodeRecord (serialized)
pub const BETA_CODES: TableDefinition<&str, &[u8]> = TableDefinition::new("beta_codes");

/// Activity log: "{timestamp_millis:013}:{id}" -> ActivityRecord (serialized)
/// Zero-padded millis keep lexicographic order equal to chronological order.
pub const ACTIVITY: TableDefinition<&str, &[u8]> = TableDefinition::new("activity");

/// Upload rate-limit windows: client key -> UploadWindow (serialized)
pub const UPLOAD_WINDOWS: TableDefinition<&str, &[u8]> = TableDefinition::new("upload_windows");
