//! Header keys recognized by the gateway
//!
//! Names are lower-case; `HeaderMap` lookups are case-insensitive.

/// Caller-supplied correlation identifier, copied into every audit event
pub const CORRELATION_ID: &str = "x-correlation-id";

/// Caller-supplied STAN trace identifier
pub const STAN_ID: &str = "x-stan-id";

/// Channel (tenant/domain) the request belongs to
pub const CHANNEL_ID: &str = "x-channel-id";

/// API key, redacted before leaving the process
pub const API_KEY: &str = "x-api-key";

/// Authorization credentials, redacted before leaving the process
pub const AUTHORIZATION: &str = "authorization";

/// Shared secret injected by the upstream API proxy
pub const SHARED_SECRET: &str = "x-3scale-proxy-secret-token";

/// Response code set on every gateway-built response
pub const RESPONSE_CODE: &str = "x-responsecode";

/// Human-readable response description paired with [`RESPONSE_CODE`]
pub const RESPONSE_MESSAGE: &str = "x-responsedesc";
