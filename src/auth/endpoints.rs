//! Paths and header names of the membership service.

/// Password and refresh grants.
pub const TOKEN_PATH: &str = "/membership/connect/token";

/// OpenID discovery document, used as a liveness probe.
pub const DISCOVERY_PATH: &str = "/membership/.well-known/openid-configuration";

pub const IMPORT_PATH: &str = "/membership/api/app/users/import-from-hireme";

pub const TENANT_HEADER: &str = "__tenant";
pub const X_REQUESTED_WITH: &str = "X-Requested-With";
pub const AUTHORIZATION: &str = "Authorization";
