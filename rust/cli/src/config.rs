use serde::{Deserialize, Serialize};
use std::fs;

/// Defaults for headless runs. Command-line flags override these per invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub seed: Option<u64>,
    pub players: usize,
    pub games: u32,
    pub ai_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Default,
    File,
    Env,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigSources {
    pub seed: ValueSource,
    pub players: ValueSource,
    pub games: ValueSource,
    pub ai_level: ValueSource,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self {
            seed: ValueSource::Default,
            players: ValueSource::Default,
            games: ValueSource::Default,
            ai_level: ValueSource::Default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigResolved {
    pub config: Config,
    pub sources: ConfigSources,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: None,
            players: 4,
            games: 13,
            ai_level: 2,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}
impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "cannot parse config file: {}", e),
            ConfigError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

/// Resolves the configuration: defaults, then the TOML file named by `MEXTRAIN_CONFIG`,
/// then `MEXTRAIN_SEED`, `MEXTRAIN_PLAYERS`, `MEXTRAIN_GAMES` and `MEXTRAIN_AI_LEVEL`.
pub fn load_with_sources() -> Result<ConfigResolved, ConfigError> {
    let mut cfg = Config::default();
    let mut sources = ConfigSources::default();

    if let Ok(path) = std::env::var("MEXTRAIN_CONFIG")
        && !path.is_empty()
    {
        let s = fs::read_to_string(path)?;
        let f: FileConfig = toml::from_str(&s)?;
        if let Some(v) = f.seed {
            cfg.seed = Some(v);
            sources.seed = ValueSource::File;
        }
        if let Some(v) = f.players {
            cfg.players = v;
            sources.players = ValueSource::File;
        }
        if let Some(v) = f.games {
            cfg.games = v;
            sources.games = ValueSource::File;
        }
        if let Some(v) = f.ai_level {
            cfg.ai_level = v;
            sources.ai_level = ValueSource::File;
        }
    }

    if let Ok(seed) = std::env::var("MEXTRAIN_SEED")
        && !seed.is_empty()
    {
        cfg.seed = Some(
            seed.parse()
                .map_err(|_| ConfigError::Invalid("Invalid seed".into()))?,
        );
        sources.seed = ValueSource::Env;
    }
    if let Ok(players) = std::env::var("MEXTRAIN_PLAYERS")
        && !players.is_empty()
    {
        cfg.players = players
            .parse()
            .map_err(|_| ConfigError::Invalid("Invalid players".into()))?;
        sources.players = ValueSource::Env;
    }
    if let Ok(games) = std::env::var("MEXTRAIN_GAMES")
        && !games.is_empty()
    {
        cfg.games = games
            .parse()
            .map_err(|_| ConfigError::Invalid("Invalid games".into()))?;
        sources.games = ValueSource::Env;
    }
    if let Ok(level) = std::env::var("MEXTRAIN_AI_LEVEL")
        && !level.is_empty()
    {
        cfg.ai_level = level
            .parse()
            .map_err(|_| ConfigError::Invalid("Invalid ai_level".into()))?;
        sources.ai_level = ValueSource::Env;
    }

    validate(&cfg)?;
    Ok(ConfigResolved {
        config: cfg,
        sources,
    })
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    players: Option<usize>,
    #[serde(default)]
    games: Option<u32>,
    #[serde(default)]
    ai_level: Option<u8>,
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if !(2..=8).contains(&cfg.players) {
        return Err(ConfigError::Invalid(
            "Invalid configuration: players must be between 2 and 8".into(),
        ));
    }
    if !(1..=100).contains(&cfg.games) {
        return Err(ConfigError::Invalid(
            "Invalid configuration: games must be between 1 and 100".into(),
        ));
    }
    if !(mextrain_ai::MIN_SKILL_LEVEL..=mextrain_ai::MAX_SKILL_LEVEL).contains(&cfg.ai_level) {
        return Err(ConfigError::Invalid(
            "Invalid configuration: ai_level must be between 1 and 5".into(),
        ));
    }
    Ok(())
}
