use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => bail!("invalid log format {s:?}, expected plain or json"),
        }
    }
}

impl LogFormat {
    /// Installs the global subscriber.
    pub fn try_init(self, level: &str) -> Result<()> {
        let filter =
            EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?;
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        match self {
            Self::Plain => builder.try_init(),
            Self::Json => builder.json().try_init(),
        }
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
    }
}
