/// Characters allowed in generated event and beta codes
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of generated event codes
pub const GENERATED_CODE_LEN: usize = 6;

/// Accepted length range for client-supplied codes
pub const MIN_CODE_LEN: usize = 3;
pub const MAX_CODE_LEN: usize = 12;

/// Length of raw session tokens (alphanumeric characters)
pub const SESSION_TOKEN_LEN: usize = 64;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hard cap on uploads relayed through the server (25MB)
/// Direct-to-blob uploads are capped per event instead.
pub const MAX_RELAY_BYTES: usize = 26_214_400;

/// Default per-event file quota when the host sets none
pub const DEFAULT_MAX_FILES: u32 = 500;

/// Default per-file size cap when the host sets none (100MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 104_857_600;

/// Default number of activity entries returned by the admin view
pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;

/// Upper bound on a single activity listing
pub const MAX_ACTIVITY_LIMIT: usize = 500;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for malformed event/beta codes
pub const ERR_INVALID_CODE: &str =
    "Code must be 3-12 uppercase letters or digits";

/// Error message for malformed email addresses
pub const ERR_INVALID_EMAIL: &str = "Invalid email address";

/// Error message for short passwords
pub const ERR_PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters";

/// Error message when an event code is already taken
pub const ERR_CODE_TAKEN: &str = "An event with this code already exists";
