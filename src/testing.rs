//! In-crate fakes shared by unit tests.

// std
use std::{
	io,
	sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
// crates.io
use ::http::{HeaderMap, Method, StatusCode};
// self
use crate::{
	_prelude::*,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	refresh::LoginRedirect,
};

/// One scripted transport reply.
#[derive(Clone, Debug)]
pub(crate) enum Reply {
	Json(u16, String),
	Fail(&'static str),
}
impl Reply {
	pub(crate) fn json(status: u16, body: serde_json::Value) -> Self {
		Self::Json(status, body.to_string())
	}
}

/// Request captured by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
	pub(crate) method: Method,
	pub(crate) uri: String,
	pub(crate) headers: HeaderMap,
	pub(crate) body: Vec<u8>,
}
impl RecordedRequest {
	pub(crate) fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	pub(crate) fn json(&self) -> serde_json::Value {
		serde_json::from_slice(&self.body).expect("Recorded body should be JSON.")
	}
}

/// Transport that replays queued replies and records every request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
	replies: Mutex<VecDeque<Reply>>,
	requests: Mutex<Vec<RecordedRequest>>,
	delay: Option<std::time::Duration>,
}
impl ScriptedTransport {
	pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
		Arc::new(Self { replies: Mutex::new(replies.into_iter().collect()), ..Default::default() })
	}

	pub(crate) fn delayed(
		replies: impl IntoIterator<Item = Reply>,
		delay: std::time::Duration,
	) -> Arc<Self> {
		Arc::new(Self {
			replies: Mutex::new(replies.into_iter().collect()),
			delay: Some(delay),
			..Default::default()
		})
	}

	pub(crate) fn push(&self, reply: Reply) {
		self.replies.lock().push_back(reply);
	}

	pub(crate) fn calls(&self) -> usize {
		self.requests.lock().len()
	}

	pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
		self.requests.lock().clone()
	}
}
impl HttpTransport for ScriptedTransport {
	type TransportError = io::Error;

	fn execute(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError> {
		Box::pin(async move {
			let (parts, body) = request.into_parts();

			self.requests.lock().push(RecordedRequest {
				method: parts.method,
				uri: parts.uri.to_string(),
				headers: parts.headers,
				body,
			});

			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			let reply = self.replies.lock().pop_front();

			match reply {
				Some(Reply::Json(status, body)) => {
					let mut response = HttpResponse::new(body.into_bytes());

					*response.status_mut() =
						StatusCode::from_u16(status).expect("Scripted status should be valid.");

					Ok(response)
				},
				Some(Reply::Fail(message)) => Err(io::Error::other(message)),
				None => Err(io::Error::other("no scripted reply left")),
			}
		})
	}
}

/// Redirect handler that counts login redirects.
#[derive(Debug, Default)]
pub(crate) struct CountingRedirect {
	on_login: AtomicBool,
	redirects: AtomicUsize,
}
impl CountingRedirect {
	pub(crate) fn on_login_view() -> Arc<Self> {
		let redirect = Self::default();

		redirect.on_login.store(true, Ordering::SeqCst);

		Arc::new(redirect)
	}

	pub(crate) fn redirects(&self) -> usize {
		self.redirects.load(Ordering::SeqCst)
	}
}
impl LoginRedirect for CountingRedirect {
	fn is_on_login_view(&self) -> bool {
		self.on_login.load(Ordering::SeqCst)
	}

	fn redirect_to_login(&self) {
		self.redirects.fetch_add(1, Ordering::SeqCst);
	}
}
