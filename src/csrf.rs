//! Anti-forgery token sources for state-changing requests.
//!
//! The token is read, never minted: first from the page's `<meta name="csrf-token">`
//! content, then from the `XSRF-TOKEN` or `csrf_token` cookie (percent-decoded).

// std
use std::borrow::Cow;
// self
use crate::_prelude::*;

/// Cookie names checked for a CSRF token, in priority order.
pub const CSRF_COOKIE_NAMES: [&str; 2] = ["XSRF-TOKEN", "csrf_token"];

/// Provides the CSRF token echoed on POST/PUT/DELETE/PATCH calls.
pub trait CsrfSource
where
	Self: Send + Sync,
{
	/// Current token, if one is available.
	fn csrf_token(&self) -> Option<String>;
}

/// Source that never yields a token.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCsrf;
impl CsrfSource for NoCsrf {
	fn csrf_token(&self) -> Option<String> {
		None
	}
}

/// Source fed by the host document: a meta tag value and the raw `Cookie` header.
///
/// The host adapter updates both whenever the page or cookie jar changes.
#[derive(Debug, Default)]
pub struct DocumentCsrf {
	meta_token: RwLock<Option<String>>,
	cookie_header: RwLock<Option<String>>,
}
impl DocumentCsrf {
	/// Sets the `content` of the `csrf-token` meta tag.
	pub fn set_meta_token(&self, token: Option<String>) {
		*self.meta_token.write() = token;
	}

	/// Sets the raw cookie string (`name=value; name2=value2`).
	pub fn set_cookie_header(&self, cookies: Option<String>) {
		*self.cookie_header.write() = cookies;
	}
}
impl CsrfSource for DocumentCsrf {
	fn csrf_token(&self) -> Option<String> {
		let meta = self.meta_token.read().as_deref().map(str::trim).map(str::to_owned);

		meta.filter(|token| !token.is_empty())
			.or_else(|| self.cookie_header.read().as_deref().and_then(token_from_cookies))
	}
}

/// Extracts the CSRF token from a cookie string, honoring [`CSRF_COOKIE_NAMES`] order.
pub fn token_from_cookies(cookies: &str) -> Option<String> {
	let pairs: Vec<(&str, &str)> = cookies
		.split(';')
		.filter_map(|pair| pair.trim().split_once('='))
		.map(|(name, value)| (name.trim(), value.trim()))
		.collect();

	CSRF_COOKIE_NAMES.iter().find_map(|wanted| {
		pairs
			.iter()
			.find(|(name, value)| name == wanted && !value.is_empty())
			.map(|(_, value)| decode(value))
	})
}

fn decode(value: &str) -> String {
	urlencoding::decode(value).map(Cow::into_owned).unwrap_or_else(|_| value.to_owned())
}
