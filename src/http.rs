//! Transport primitives for API calls.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. Requests and
//! responses are plain [`::http`] values with byte bodies, so downstream crates can plug
//! in any client (or a scripted fake in tests) without touching the session logic.
//! [`ApiResponse`] is the decoded view handed back to callers.

// crates.io
use ::http::{HeaderMap, StatusCode, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Outbound request shape accepted by transports.
pub type HttpRequest = ::http::Request<Vec<u8>>;
/// Inbound response shape produced by transports.
pub type HttpResponse = ::http::Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a, E> = Pin<Box<dyn Future<Output = Result<HttpResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP clients able to execute API calls.
///
/// Implementations must be `Send + Sync + 'static` so the refresh coordinator can run a
/// call on its own task while callers share the outcome. Redirects should not be
/// followed; the API answers directly.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying client.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends `request` and resolves with the full response.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that never follows redirects and applies `timeout` to every call.
	pub fn build(timeout: Option<Duration>) -> Result<Self, crate::error::ConfigError> {
		let mut builder = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none());

		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout.unsigned_abs());
		}

		Ok(Self(builder.build()?))
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	type TransportError = ReqwestError;

	fn execute(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError> {
		Box::pin(async move {
			let request = reqwest::Request::try_from(request)?;
			let response = self.0.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut converted = HttpResponse::new(response.bytes().await?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

/// Response handed back by [`AuthorizedClient`](crate::client::AuthorizedClient).
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body.
	pub body: Vec<u8>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ApiResponse {
	/// Converts a transport response, parsing the `Retry-After` hint.
	pub fn from_http(response: HttpResponse) -> Self {
		let (parts, body) = response.into_parts();
		let retry_after = parse_retry_after(&parts.headers);

		Self { status: parts.status, headers: parts.headers, body, retry_after }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { source, status: Some(self.status.as_u16()) })
	}

	/// Body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Best-effort human-readable error message taken from the body.
	///
	/// Looks at `message`, `error`, `detail`, then `error_description`; falls back to the
	/// canonical reason phrase.
	pub fn error_message(&self) -> String {
		serde_json::from_slice::<serde_json::Value>(&self.body)
			.ok()
			.and_then(|body| {
				["message", "error", "detail", "error_description"]
					.into_iter()
					.find_map(|field| body.get(field)?.as_str().map(str::to_owned))
			})
			.unwrap_or_else(|| {
				self.status.canonical_reason().unwrap_or("Unexpected response").to_owned()
			})
	}

	/// Turns non-success statuses into [`Error::Api`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Api { status: self.status.as_u16(), message: self.error_message() })
		}
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<i64>() {
		return Some(Duration::seconds(secs.max(0)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
