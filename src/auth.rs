//! Credential models: redacted secrets, session snapshots, and token grants parsed from the API.

pub mod credentials;
pub mod grant;
pub mod secret;

pub use credentials::*;
pub use grant::*;
pub use secret::*;
