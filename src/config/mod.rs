use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub telemetry: TelemetryConfig,
	pub server: ServerConfig,
	pub storage: StorageConfig,
	pub wado: WadoConfig,
}

impl AppConfig {
	/// Loads the configuration from the embedded defaults, an optional `config.toml`
	/// in the working directory and `DICOM_WADO_*` environment variables, in that order.
	pub fn new() -> Result<Self, config::ConfigError> {
		use config::Config;
		let s = Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(config::File::with_name("config.toml").required(false))
			.add_source(
				config::Environment::with_prefix("DICOM_WADO")
					.prefix_separator("_")
					.separator("__"),
			)
			.build()?;

		s.try_deserialize()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	/// Default log level. `RUST_LOG` directives take precedence.
	#[serde(deserialize_with = "deserialize_level")]
	pub level: tracing::Level,
	/// Sentry DSN. Error tracking is disabled if unset.
	pub sentry: Option<String>,
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<tracing::Level, D::Error>
where
	D: Deserializer<'de>,
{
	let value = String::deserialize(deserializer)?;
	tracing::Level::from_str(&value).map_err(D::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	pub http: HttpServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
	// The interface the WADO-RS server will be listening on
	pub interface: IpAddr,
	pub port: u16,
	pub base_path: String,
	/// Upper bound for a whole request including the streamed body, in seconds.
	pub request_timeout: u64,
	pub graceful_shutdown: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
	/// Directory that is scanned for DICOM Part 10 files on startup.
	pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WadoConfig {
	/// Keep private attributes in metadata responses.
	pub include_private: bool,
	/// Template for entry names of ZIP responses.
	pub zip_entry_name_format: String,
	/// Parent of the per-request spool directories. Falls back to the OS temp directory.
	pub spool_directory: Option<PathBuf>,
	pub max_concurrent_retrievals: usize,
	pub chunk_size: usize,
	pub channel_capacity: usize,
}

impl Default for WadoConfig {
	fn default() -> Self {
		Self {
			include_private: true,
			zip_entry_name_format: String::from(
				"DICOM/{0020000D,hash}/{0020000E,hash}/{00080018,hash}.dcm",
			),
			spool_directory: None,
			max_concurrent_retrievals: 16,
			chunk_size: 64 * 1024,
			channel_capacity: 16,
		}
	}
}
