// Stable error codes returned to callers alongside generic messages

pub mod validation {
    pub const INVALID_INPUT: &str = "VALIDATION_1001";
}

pub mod authentication {
    pub const INVALID_CREDENTIALS: &str = "AUTH_2001";
    pub const ACCOUNT_LOCKED: &str = "AUTH_2002";
    pub const SESSION_INVALID: &str = "AUTH_2003";
}

pub mod authorization {
    pub const ACCESS_DENIED: &str = "AUTHZ_3001";
}

pub mod throttling {
    pub const RATE_LIMITED: &str = "RATE_5001";
}

pub mod availability {
    pub const SERVICE_UNAVAILABLE: &str = "SYS_9001";
}
