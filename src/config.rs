//! Session configuration: API base, refresh policy, scheduler cadence, storage keys, and the
//! rate-limit table.
//!
//! Build it in code with [`SessionConfig::builder`] or load it from JSON with
//! [`SessionConfig::from_json`]; both paths run the same validation.

// self
use crate::{_prelude::*, error::ConfigError, limit::RateLimitTable, store::StorageKeys};

/// Validated configuration shared by every session component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
	/// Base URL every endpoint path is appended to.
	pub api_base: Url,
	/// Remaining lifetime below which a token is refreshed preemptively.
	pub refresh_buffer: Duration,
	/// Consecutive failed refreshes tolerated before the session is dropped.
	pub max_refresh_attempts: u32,
	/// Period of the background refresh check.
	pub check_interval: Duration,
	/// Per-request timeout applied by the built-in transport.
	pub request_timeout: Option<Duration>,
	/// Storage key names.
	pub storage_keys: StorageKeys,
	/// Per-operation rate-limit policies.
	pub rate_limits: RateLimitTable,
}
impl SessionConfig {
	/// Default preemptive refresh buffer.
	pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::seconds(300);
	/// Default refresh ceiling.
	pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 3;
	/// Default scheduler period.
	pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::seconds(60);

	/// Creates a builder for the provided API base.
	pub fn builder(api_base: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(api_base)
	}

	/// Parses and validates a JSON configuration document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let file: SessionConfigFile =
			serde_path_to_error::deserialize(&mut de).map_err(ConfigError::Parse)?;
		let api_base = Url::parse(&file.api_base)
			.map_err(|source| ConfigError::InvalidUrl { value: file.api_base.clone(), source })?;
		let mut builder = Self::builder(api_base)
			.refresh_buffer(Duration::seconds(file.refresh_buffer_secs))
			.max_refresh_attempts(file.max_refresh_attempts)
			.check_interval(Duration::seconds(file.check_interval_secs))
			.storage_keys(file.storage_keys);

		if let Some(secs) = file.request_timeout_secs {
			builder = builder.request_timeout(Duration::seconds(secs));
		}
		if let Some(table) = file.rate_limits {
			builder = builder.rate_limits(table);
		}

		builder.build()
	}

	/// Resolves an endpoint path (e.g. `auth/refresh`) against the API base.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let joined = format!(
			"{}/{}",
			self.api_base.as_str().trim_end_matches('/'),
			path.trim_start_matches('/')
		);

		Url::parse(&joined).map_err(|source| ConfigError::InvalidUrl { value: joined, source })
	}
}

/// Builder for [`SessionConfig`].
#[derive(Clone, Debug)]
pub struct SessionConfigBuilder {
	config: SessionConfig,
}
impl SessionConfigBuilder {
	fn new(api_base: Url) -> Self {
		Self {
			config: SessionConfig {
				api_base,
				refresh_buffer: SessionConfig::DEFAULT_REFRESH_BUFFER,
				max_refresh_attempts: SessionConfig::DEFAULT_MAX_REFRESH_ATTEMPTS,
				check_interval: SessionConfig::DEFAULT_CHECK_INTERVAL,
				request_timeout: None,
				storage_keys: StorageKeys::default(),
				rate_limits: RateLimitTable::default(),
			},
		}
	}

	/// Overrides the preemptive refresh buffer (defaults to 300 seconds).
	pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
		self.config.refresh_buffer = buffer;

		self
	}

	/// Overrides the refresh ceiling (defaults to 3).
	pub fn max_refresh_attempts(mut self, attempts: u32) -> Self {
		self.config.max_refresh_attempts = attempts;

		self
	}

	/// Overrides the scheduler period (defaults to 60 seconds).
	pub fn check_interval(mut self, interval: Duration) -> Self {
		self.config.check_interval = interval;

		self
	}

	/// Sets a per-request timeout for the built-in transport.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = Some(timeout);

		self
	}

	/// Overrides storage key names.
	pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
		self.config.storage_keys = keys;

		self
	}

	/// Replaces the rate-limit table.
	pub fn rate_limits(mut self, table: RateLimitTable) -> Self {
		self.config.rate_limits = table;

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<SessionConfig, ConfigError> {
		let config = self.config;

		if config.api_base.cannot_be_a_base() || !matches!(config.api_base.scheme(), "http" | "https")
		{
			return Err(ConfigError::UnsupportedBase(config.api_base.to_string()));
		}
		if config.max_refresh_attempts == 0 {
			return Err(ConfigError::ZeroRefreshAttempts);
		}
		if config.refresh_buffer.is_negative() {
			return Err(ConfigError::NonPositiveDuration { field: "refresh_buffer" });
		}
		if !config.check_interval.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "check_interval" });
		}
		if config.request_timeout.is_some_and(|timeout| !timeout.is_positive()) {
			return Err(ConfigError::NonPositiveDuration { field: "request_timeout" });
		}

		config.rate_limits.validate()?;

		Ok(config)
	}
}

#[derive(Debug, Deserialize)]
struct SessionConfigFile {
	api_base: String,
	#[serde(default = "default_refresh_buffer_secs")]
	refresh_buffer_secs: i64,
	#[serde(default = "default_max_refresh_attempts")]
	max_refresh_attempts: u32,
	#[serde(default = "default_check_interval_secs")]
	check_interval_secs: i64,
	#[serde(default)]
	request_timeout_secs: Option<i64>,
	#[serde(default)]
	storage_keys: StorageKeys,
	#[serde(default)]
	rate_limits: Option<RateLimitTable>,
}

fn default_refresh_buffer_secs() -> i64 {
	SessionConfig::DEFAULT_REFRESH_BUFFER.whole_seconds()
}

fn default_max_refresh_attempts() -> u32 {
	SessionConfig::DEFAULT_MAX_REFRESH_ATTEMPTS
}

fn default_check_interval_secs() -> i64 {
	SessionConfig::DEFAULT_CHECK_INTERVAL.whole_seconds()
}
