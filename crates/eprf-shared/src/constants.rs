/// Application name
pub const APP_NAME: &str = "ePRF";

/// Interval between presence heartbeats sent by a viewing client, in seconds
pub const PRESENCE_HEARTBEAT_SECS: u64 = 10;

/// Presence entries older than this are treated as gone
pub const PRESENCE_STALE_SECS: i64 = 15;

/// Cursor entries older than this are treated as gone
pub const CURSOR_STALE_SECS: i64 = 5;

/// Minimum gap between typing pings from one session, in seconds
pub const TYPING_THROTTLE_SECS: u64 = 2;

/// How long a typing indicator stays visible without a refresh, in seconds
pub const TYPING_CLEAR_SECS: u64 = 3;

/// Chat messages returned by a history fetch
pub const CHAT_HISTORY_LIMIT: usize = 50;

/// Version history entries returned per query unless the caller asks for fewer
pub const HISTORY_DEFAULT_LIMIT: usize = 50;

/// Characters of message text included in a mention notification preview
pub const MENTION_PREVIEW_CHARS: usize = 100;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
