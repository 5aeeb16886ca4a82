/// Error code registry for stateflow
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Scheduler (drain loop) errors
/// - 3000-3999: Subscription errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_TOML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;
    pub const CONFIG_INVALID_ENV: u16 = 1004;

    // Scheduler errors (2000-2999)
    pub const SCHEDULER_IMPURE_REDUCER: u16 = 2001;
    pub const SCHEDULER_REDUCER_PANICKED: u16 = 2002;
    pub const SCHEDULER_CLOSED: u16 = 2003;
    pub const SCHEDULER_TASK_ABORTED: u16 = 2004;

    // Subscription errors (3000-3999)
    pub const SUBSCRIPTION_DUPLICATE_ID: u16 = 3001;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid TOML syntax in configuration",
        1003 => "Invalid value in configuration",
        1004 => "Invalid configuration environment variable",

        2001 => "Reducer produced different states for the same input",
        2002 => "Reducer or read callback panicked on the drain loop",
        2003 => "State store is closed",
        2004 => "Drain loop task was aborted",

        3001 => "Duplicate unique-only subscription id",

        9000 => "Generic error",

        _ => "Unknown error code",
    }
}
