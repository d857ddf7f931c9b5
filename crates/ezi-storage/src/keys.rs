//! Storage key constants.

/// Storage keys used for the persisted session
pub struct StorageKeys;

impl StorageKeys {
    /// User record (JSON)
    pub const USER: &'static str = "user";

    /// Access token (opaque string)
    pub const ACCESS_TOKEN: &'static str = "accessToken";

    /// Refresh token (opaque string)
    pub const REFRESH_TOKEN: &'static str = "refreshToken";

    /// All session keys, in the order they are written.
    pub const SESSION_KEYS: [&'static str; 3] =
        [Self::USER, Self::ACCESS_TOKEN, Self::REFRESH_TOKEN];
}
