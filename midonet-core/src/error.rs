use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Ambient error domain for the surrounding (non-simulation) surface: config
/// loading, capability-handle setup, CLI/daemon bootstrap. The simulation
/// path itself never returns `Result` — see [`crate::result::SimulationResult`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("topology cache unavailable: {0}")]
    TopologyUnavailable(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
