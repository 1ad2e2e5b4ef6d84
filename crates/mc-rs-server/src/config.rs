use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub workers: WorkersSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub motd: String,
    pub max_players: u32,
    pub online_mode: bool,
    /// Path to a 64x64 PNG shown in the server list.
    #[serde(default)]
    pub favicon: Option<String>,
}

fn default_port() -> u16 {
    25565
}

#[derive(Debug, Deserialize)]
pub struct NetworkSection {
    /// Packets of at least this many bytes are zlib-compressed. Negative
    /// disables compression.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: i32,
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_secs: u64,
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout_secs: u64,
    /// Time a client has from connecting to reaching the play state.
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
}

fn default_compression_threshold() -> i32 {
    256
}

fn default_max_frame_length() -> usize {
    mc_rs_proto::frame::MAX_FRAME_LENGTH
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_keep_alive_timeout() -> u64 {
    30
}

fn default_login_timeout() -> u64 {
    30
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            compression_threshold: default_compression_threshold(),
            max_frame_length: default_max_frame_length(),
            keep_alive_interval_secs: default_keep_alive_interval(),
            keep_alive_timeout_secs: default_keep_alive_timeout(),
            login_timeout_secs: default_login_timeout(),
        }
    }
}

impl NetworkSection {
    /// The threshold as an enabled/disabled value.
    pub fn compression(&self) -> Option<usize> {
        usize::try_from(self.compression_threshold).ok()
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkersSection {
    /// Worker thread count. Defaults to the available parallelism.
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// World names, assigned to workers round-robin. The first is where
    /// players spawn.
    #[serde(default = "default_worlds")]
    pub worlds: Vec<String>,
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_worlds() -> Vec<String> {
    vec!["world".into()]
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            worlds: default_worlds(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    pub level: String,
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.workers.count == 0 {
            return Err("[workers] count must be at least 1".into());
        }
        if self.workers.worlds.is_empty() {
            return Err("[workers] worlds must name at least one world".into());
        }
        if self.network.keep_alive_timeout_secs <= self.network.keep_alive_interval_secs {
            return Err("keep_alive_timeout_secs must exceed keep_alive_interval_secs".into());
        }
        if self.network.login_timeout_secs == 0 {
            return Err("login_timeout_secs must be at least 1".into());
        }
        Ok(())
    }
}
