//! Token grants returned by the sign-in and refresh endpoints.
//!
//! The API answers with one of two shapes: the tokens at the top level
//! (`access_token`, `refresh_token`, `expires_in`) or nested under `data.session`.
//! Both are accepted; the top-level shape wins when it carries an access token.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, auth::Secret};

/// Errors produced while reading a token grant.
#[derive(Debug, ThisError)]
pub enum GrantError {
	/// Body is not a JSON object of the expected shape.
	#[error("Token response is malformed.")]
	Malformed(#[source] serde_path_to_error::Error<serde_json::Error>),
	/// Body parsed but neither shape carried an access token.
	#[error("Token response does not contain an access token.")]
	MissingAccessToken,
}

/// Tokens (and optionally the signed-in user) minted by the API.
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// New access token.
	pub access_token: Secret,
	/// Rotated refresh token, if the API issued one.
	pub refresh_token: Option<Secret>,
	/// Access-token lifetime in whole seconds; values below one second are dropped.
	pub expires_in: Option<Duration>,
	/// User profile attached to sign-in responses.
	pub user: Option<Value>,
}
impl TokenGrant {
	/// Parses a grant from a response body.
	pub fn from_slice(body: &[u8]) -> Result<Self, GrantError> {
		let mut de = serde_json::Deserializer::from_slice(body);
		let envelope: GrantEnvelope =
			serde_path_to_error::deserialize(&mut de).map_err(GrantError::Malformed)?;
		let GrantEnvelope { tokens, user, data } = envelope;
		let (nested, nested_user) = match data {
			Some(data) => (data.session, data.user),
			None => (None, None),
		};
		let fields = if tokens.has_access_token() {
			tokens
		} else {
			nested.filter(TokenFields::has_access_token).ok_or(GrantError::MissingAccessToken)?
		};
		let TokenFields { access_token, refresh_token, expires_in } = fields;
		let access_token = access_token.map(Secret::new).ok_or(GrantError::MissingAccessToken)?;

		Ok(Self {
			access_token,
			refresh_token: refresh_token.filter(|value| !value.is_empty()).map(Secret::new),
			expires_in: expires_in
				.filter(|secs| secs.is_finite() && *secs >= 1.0)
				.map(|secs| Duration::seconds(secs.trunc() as i64)),
			user: user.or(nested_user),
		})
	}
}

#[derive(Debug, Default, Deserialize)]
struct TokenFields {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<f64>,
}
impl TokenFields {
	fn has_access_token(&self) -> bool {
		self.access_token.as_deref().is_some_and(|value| !value.is_empty())
	}
}

#[derive(Debug, Deserialize)]
struct GrantEnvelope {
	#[serde(flatten)]
	tokens: TokenFields,
	#[serde(default)]
	user: Option<Value>,
	#[serde(default)]
	data: Option<GrantData>,
}

#[derive(Debug, Deserialize)]
struct GrantData {
	#[serde(default)]
	session: Option<TokenFields>,
	#[serde(default)]
	user: Option<Value>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn flat_shape_is_read() {
		let grant = TokenGrant::from_slice(
			br#"{"access_token":"A","refresh_token":"B","expires_in":3600}"#,
		)
		.expect("Flat grant should parse.");

		assert_eq!(grant.access_token.expose(), "A");
		assert_eq!(grant.refresh_token.as_ref().map(Secret::expose), Some("B"));
		assert_eq!(grant.expires_in, Some(Duration::hours(1)));
		assert!(grant.user.is_none());
	}

	#[test]
	fn nested_session_shape_is_read() {
		let grant = TokenGrant::from_slice(
			br#"{"data":{"session":{"access_token":"A2","expires_in":60},"user":{"id":7}}}"#,
		)
		.expect("Nested grant should parse.");

		assert_eq!(grant.access_token.expose(), "A2");
		assert!(grant.refresh_token.is_none());
		assert_eq!(grant.expires_in, Some(Duration::minutes(1)));
		assert_eq!(grant.user, Some(serde_json::json!({ "id": 7 })));
	}

	#[test]
	fn missing_access_token_is_rejected() {
		assert!(matches!(TokenGrant::from_slice(b"{}"), Err(GrantError::MissingAccessToken)));
		assert!(matches!(
			TokenGrant::from_slice(br#"{"access_token":"","data":{"session":{}}}"#),
			Err(GrantError::MissingAccessToken)
		));
	}

	#[test]
	fn malformed_bodies_are_reported() {
		assert!(matches!(TokenGrant::from_slice(b""), Err(GrantError::Malformed(_))));
		assert!(matches!(
			TokenGrant::from_slice(br#"{"access_token":"A","expires_in":"soon"}"#),
			Err(GrantError::Malformed(_))
		));
	}

	#[test]
	fn fractional_lifetime_is_truncated() {
		let grant = TokenGrant::from_slice(br#"{"access_token":"A","expires_in":3600.9}"#)
			.expect("Grant with a float lifetime should parse.");

		assert_eq!(grant.expires_in, Some(Duration::hours(1)));

		let grant = TokenGrant::from_slice(br#"{"access_token":"A","expires_in":0.5}"#)
			.expect("Grant with a sub-second lifetime should parse.");

		assert!(grant.expires_in.is_none());
	}

	#[test]
	fn non_positive_lifetime_is_dropped() {
		let grant = TokenGrant::from_slice(br#"{"access_token":"A","expires_in":0}"#)
			.expect("Grant with zero lifetime should parse.");

		assert!(grant.expires_in.is_none());
	}
}
