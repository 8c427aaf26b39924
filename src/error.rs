//! Session-level error types shared across the store, transport, and request layers.

// self
use crate::_prelude::*;

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// API responded with a body that could not be decoded.
	#[error("API response could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response, when available.
		status: Option<u16>,
	},

	/// Call was rejected locally by the rate limiter; nothing reached the network.
	#[error("{message}")]
	RateLimited {
		/// Operation key the policy is registered under.
		operation: String,
		/// Time until the oldest call in the window expires.
		wait: Duration,
		/// Human-readable wait message suitable for display.
		message: String,
	},
	/// Access token was rejected and the refresh did not recover the session.
	#[error("Session has expired; sign in again.")]
	SessionExpired,
	/// Sign-in was rejected by the API.
	#[error("Sign-in was rejected: {reason}.")]
	InvalidCredentials {
		/// API-supplied reason string.
		reason: String,
	},
	/// API returned a non-success status the caller asked to treat as an error.
	#[error("API returned status {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// API-supplied message, or the canonical reason phrase.
		message: String,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] ::http::Error),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Serialize(#[source] serde_json::Error),
	/// Configuration document could not be parsed.
	#[error("Session configuration is malformed.")]
	Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
	/// A configured or derived URL is invalid.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},

	/// The API base URL cannot carry endpoint paths.
	#[error("API base `{0}` must be an absolute http(s) URL.")]
	UnsupportedBase(String),
	/// Refresh ceiling must allow at least one attempt.
	#[error("Maximum refresh attempts must be at least 1.")]
	ZeroRefreshAttempts,
	/// A duration setting must be positive.
	#[error("The {field} setting must be positive.")]
	NonPositiveDuration {
		/// Setting name.
		field: &'static str,
	},
	/// Rate-limit policy cannot admit any call, or its window exceeds a year.
	#[error(
		"Rate-limit policy `{operation}` must allow at least one call in a window between 1 ms and 366 days."
	)]
	InvalidRateLimit {
		/// Operation key.
		operation: String,
	},
	/// Call names a rate-limit operation that has no policy.
	#[error("No rate-limit policy is registered for `{operation}`.")]
	UnknownRateLimit {
		/// Operation key.
		operation: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
