//! Well-known realm globals and environment variables.

/// Hidden global holding the public test API exposed to test code.
pub const TEST_API_GLOBAL: &str = "__testrealm_index__";

/// Hidden global holding the pristine timer/utility primitives captured before anything can patch them.
pub const REQUIRED_PRIMITIVES_GLOBAL: &str = "__testrealm_required__";

/// Global the built-in client-like environment defines while active.
pub const WINDOW_GLOBAL: &str = "window";

/// Environment variable downstream code reads to branch on server rendering.
pub const SSR_ENV_VAR: &str = "SSR";

/// `SSR` value for server-like transform modes.
pub const SSR_SERVER_VALUE: &str = "1";

/// `SSR` value for the `web` transform mode.
pub const SSR_CLIENT_VALUE: &str = "";
