//! Session guard for API clients: credential storage, single-flight token refresh with a
//! retry ceiling, sliding-window rate limits, CSRF-aware authorized requests, and a
//! cancellable background refresh scheduler, all wired by one composition root.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod csrf;
pub mod error;
pub mod http;
pub mod limit;
pub mod obs;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod store;

#[cfg(test)] mod testing;

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
