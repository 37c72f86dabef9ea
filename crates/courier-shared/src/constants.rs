/// Top-level collection holding one profile document per user.
pub const USERS: &str = "users";

/// Top-level collection holding the per-participant message mirrors.
/// Also used as the nested collection name under `recent_messages/{uid}`.
pub const MESSAGES: &str = "messages";

/// Top-level collection holding each user's recent-conversation summaries.
pub const RECENT_MESSAGES: &str = "recent_messages";

/// Document field names
pub const FIELD_FROM_ID: &str = "fromId";
pub const FIELD_TO_ID: &str = "toId";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_PROFILE_IMAGE_URL: &str = "profileImageUrl";
pub const FIELD_UID: &str = "uid";

/// Default capacity of the update channels handed to the UI layer
pub const DEFAULT_UPDATE_BUFFER: usize = 256;
