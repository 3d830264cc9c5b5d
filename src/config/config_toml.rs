use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::SocketAddr,
    num::{NonZeroU64, NonZeroU8},
    path::Path,
    str::FromStr,
};

/// How queries are exchanged with the forward server.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExchangeMode {
    /// One ephemeral socket per exchange.
    #[default]
    Message,
    /// One long-lived socket for all exchanges. Replies are matched by transaction id.
    SharedSocket,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ConfigToml {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub upstream: Upstream,
    #[serde(default)]
    pub cache: Cache,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "default_socket")]
    pub socket: SocketAddr,

    #[serde(default = "default_forward")]
    pub forward: SocketAddr,

    #[serde(default = "default_false")]
    pub verbose: bool,
}

impl Default for General {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            forward: default_forward(),
            verbose: default_false(),
        }
    }
}

fn default_socket() -> SocketAddr {
    "0.0.0.0:53".parse().expect("Valid socket address.")
}

fn default_forward() -> SocketAddr {
    "8.8.8.8:53".parse().expect("Valid socket address.")
}

fn default_false() -> bool {
    false
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Upstream {
    /// How often a query is sent before the exchange fails.
    #[serde(default = "default_attempts")]
    pub attempts: NonZeroU8,

    /// How long one attempt waits for a reply.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    #[serde(default)]
    pub mode: ExchangeMode,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            mode: ExchangeMode::default(),
        }
    }
}

fn default_attempts() -> NonZeroU8 {
    NonZeroU8::new(5).expect("Non zero.")
}

fn default_attempt_timeout_ms() -> u64 {
    1100
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Cache {
    /// Upper bound of the cache size. Unbounded if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_mb: Option<NonZeroU64>,

    /// Lowercase names before they are used as cache keys.
    #[serde(default = "default_false")]
    pub case_insensitive_keys: bool,
}

impl ConfigToml {
    /// Reads the config from a toml file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: ConfigToml = raw.parse()?;
        Ok(config)
    }

    /// Default config with every line commented out.
    /// Written as the initial config file so users see all available options.
    pub fn commented_out_sample() -> String {
        let full_config = toml::to_string(&ConfigToml::default()).expect("Valid toml config.");
        let mut lines: Vec<String> = full_config
            .lines()
            .map(|line| {
                if line.starts_with('[') || line.is_empty() {
                    // Don't comment out sections and empty lines.
                    line.to_string()
                } else {
                    format!("# {line}")
                }
            })
            .collect();

        // Unset by default so serde skips it.
        if let Some(index) = lines.iter().position(|line| line == "[cache]") {
            lines.insert(index + 1, "# max_size_mb = 100".to_string());
        }

        format!("# cachedns configuration file\n\n{}\n", lines.join("\n"))
    }

    /// Config for tests. Listens on a random localhost port.
    #[cfg(test)]
    pub fn test() -> Self {
        let mut config = Self::default();
        config.general.socket = "127.0.0.1:0".parse().expect("Valid socket address.");
        config.upstream.attempts = NonZeroU8::new(2).expect("Non zero.");
        config.upstream.attempt_timeout_ms = 500;
        config
    }
}

impl FromStr for ConfigToml {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}
