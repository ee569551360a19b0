//! Viewer configuration.
//!
//! Values start from [`ViewerConfig::default`], are overridden by
//! `CASTVIEW_*` environment variables, and finally by command line flags
//! (`--port 5000` or `--port=5000`). Both layers go through
//! [`ViewerConfig::apply`], so a key means the same thing in either place:
//!
//! | Key               | Env var                      | Default      |
//! |-------------------|------------------------------|--------------|
//! | `group`           | `CASTVIEW_GROUP`             | `230.0.0.0`  |
//! | `port`            | `CASTVIEW_PORT`              | `4446`       |
//! | `capacity`        | `CASTVIEW_CAPACITY`          | `65000`      |
//! | `interface`       | `CASTVIEW_INTERFACE`         | `0.0.0.0`    |
//! | `framing`         | `CASTVIEW_FRAMING`           | `short`      |
//! | `width`           | `CASTVIEW_WIDTH`             | surface width |
//! | `screen-width`    | `CASTVIEW_SCREEN_WIDTH`      | `1920`       |
//! | `screen-height`   | `CASTVIEW_SCREEN_HEIGHT`     | `1080`       |
//! | `read-timeout-ms` | `CASTVIEW_READ_TIMEOUT_MS`   | `0` (none)   |
//! | `recv-buffer`     | `CASTVIEW_RECV_BUFFER`       | OS default   |
//! | `retry-delay-ms`  | `CASTVIEW_RETRY_DELAY_MS`    | `100`        |
//! | `filter`          | `CASTVIEW_FILTER`            | `lanczos3`   |

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use image::imageops::FilterType;
use thiserror::Error;

use crate::codec::DEFAULT_FILTER;
use crate::net::endpoint::{DEFAULT_CAPACITY, DEFAULT_GROUP, DEFAULT_PORT};
use crate::net::{EndpointError, MulticastEndpoint};
use crate::receiver::{Framing, FramingError, MulticastTransport};

/// Prefix of the environment variables read by [`ViewerConfig::from_env`].
pub const ENV_PREFIX: &str = "CASTVIEW_";

/// Keys accepted by [`ViewerConfig::apply`].
pub const KEYS: &[&str] = &[
    "group",
    "port",
    "capacity",
    "interface",
    "framing",
    "width",
    "screen-width",
    "screen-height",
    "read-timeout-ms",
    "recv-buffer",
    "retry-delay-ms",
    "filter",
];

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not in [`KEYS`].
    #[error("unknown option {0:?}")]
    UnknownKey(String),
    /// A flag was given without its value.
    #[error("missing value for --{0}")]
    MissingValue(String),
    /// Value did not parse for its key.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    /// The endpoint parameters are inconsistent.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    /// Unknown framing mode.
    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// Everything the `castview` viewer needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Multicast group to join.
    pub group: Ipv4Addr,
    /// UDP port.
    pub port: u16,
    /// Per-read buffer capacity; also the short-datagram threshold.
    pub capacity: usize,
    /// Local interface for the group membership.
    pub interface: Ipv4Addr,
    /// End-of-message policy.
    pub framing: Framing,
    /// Scaling target width. `None` uses the surface width.
    pub target_width: Option<u32>,
    /// Requested surface size in pixels.
    pub screen_size: (u32, u32),
    /// Bound on each blocking read. `None` blocks forever.
    pub read_timeout: Option<Duration>,
    /// Kernel receive buffer size to request.
    pub recv_buffer_size: Option<usize>,
    /// Pause after a transport failure before the next cycle.
    pub retry_delay: Duration,
    /// Resampling filter for scaling.
    pub filter: FilterType,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            interface: Ipv4Addr::UNSPECIFIED,
            framing: Framing::ShortDatagram,
            target_width: None,
            screen_size: (1920, 1080),
            read_timeout: None,
            recv_buffer_size: None,
            retry_delay: Duration::from_millis(100),
            filter: DEFAULT_FILTER,
        }
    }
}

impl ViewerConfig {
    /// Defaults overridden by any `CASTVIEW_*` variables in the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overridden by `CASTVIEW_*` entries of `vars`. Other entries
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a matching entry holds an invalid value or names
    /// an unknown key.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (name, value) in vars {
            let Some(key) = name.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase().replace('_', "-");
            config.apply(&key, value.as_ref())?;
        }
        Ok(config)
    }

    /// Sets one option by its key.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown key or a value that does not parse.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "group" => self.group = parse(key, value)?,
            "port" => self.port = parse(key, value)?,
            "capacity" => self.capacity = parse(key, value)?,
            "interface" => self.interface = parse(key, value)?,
            "framing" => self.framing = value.parse()?,
            "width" => self.target_width = Some(parse_nonzero(key, value)?),
            "screen-width" => self.screen_size.0 = parse_nonzero(key, value)?,
            "screen-height" => self.screen_size.1 = parse_nonzero(key, value)?,
            "read-timeout-ms" => {
                let ms: u64 = parse(key, value)?;
                self.read_timeout = (ms > 0).then(|| Duration::from_millis(ms));
            }
            "recv-buffer" => self.recv_buffer_size = Some(parse(key, value)?),
            "retry-delay-ms" => self.retry_delay = Duration::from_millis(parse(key, value)?),
            "filter" => {
                self.filter = parse_filter(value)
                    .ok_or_else(|| invalid(key, value, "not a known resampling filter"))?;
            }
            other => return Err(ConfigError::UnknownKey(other.to_owned())),
        }
        Ok(())
    }

    /// Applies `--key value` and `--key=value` options for the keys in
    /// [`KEYS`]. Any other argument is returned, in order, for the caller to
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns an error if an option is missing its value or the value does
    /// not parse.
    pub fn apply_args<I>(&mut self, args: I) -> Result<Vec<String>, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut rest = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let Some(option) = arg.strip_prefix("--").map(str::to_owned) else {
                rest.push(arg);
                continue;
            };
            let (key, inline) = match option.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (option.as_str(), None),
            };
            if !KEYS.contains(&key) {
                rest.push(arg);
                continue;
            }

            let value = match inline {
                Some(value) => value.to_owned(),
                None => args
                    .next()
                    .ok_or_else(|| ConfigError::MissingValue(key.to_owned()))?,
            };
            self.apply(key, &value)?;
        }

        Ok(rest)
    }

    /// Sets `read_timeout` to `tick` unless one is already configured.
    ///
    /// A window only services its events between reads, so the windowed
    /// viewer needs reads to return periodically even when nothing arrives.
    pub fn ensure_read_timeout(&mut self, tick: Duration) {
        if self.read_timeout.is_none() {
            self.read_timeout = Some(tick);
        }
    }

    /// The validated multicast endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the group is not multicast or the capacity is out
    /// of range.
    pub fn endpoint(&self) -> Result<MulticastEndpoint, ConfigError> {
        let endpoint = MulticastEndpoint::new(self.group, self.port, self.capacity)?;
        Ok(endpoint.with_interface(self.interface))
    }

    /// Socket options for the receive transport.
    #[must_use]
    pub const fn transport(&self) -> MulticastTransport {
        MulticastTransport {
            read_timeout: self.read_timeout,
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn parse_nonzero(key: &str, value: &str) -> Result<u32, ConfigError> {
    match parse::<u32>(key, value)? {
        0 => Err(invalid(key, value, "must be greater than zero")),
        n => Ok(n),
    }
}

/// Parses a resampling filter name.
#[must_use]
pub fn parse_filter(name: &str) -> Option<FilterType> {
    match name.trim() {
        "nearest" => Some(FilterType::Nearest),
        "triangle" => Some(FilterType::Triangle),
        "catmull-rom" => Some(FilterType::CatmullRom),
        "gaussian" => Some(FilterType::Gaussian),
        "lanczos3" => Some(FilterType::Lanczos3),
        _ => None,
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}
