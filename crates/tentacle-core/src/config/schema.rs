use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from the fleet's TOML config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TentacleConfig {
    pub github_token: String,
    pub repo_full_name: String,
    pub branches_dir: String,
    pub filter_mode: FilterMode,
    pub filter_branches: Vec<String>,
    pub commands: CommandsConfig,
    pub enabled_log_levels: LogLevelFilter,
    pub webhook_update: bool,
    pub clear_redundant_local_branches: bool,
}

impl Default for TentacleConfig {
    fn default() -> Self {
        Self {
            github_token: String::new(),
            repo_full_name: String::new(),
            branches_dir: "branches".to_string(),
            filter_mode: FilterMode::Exclude,
            filter_branches: Vec::new(),
            commands: CommandsConfig::default(),
            enabled_log_levels: LogLevelFilter::All,
            webhook_update: true,
            clear_redundant_local_branches: true,
        }
    }
}

/// Whether `filter_branches` names the only branches to watch, or the ones to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Include,
    Exclude,
}

/// Build/start command templates. `build` accepts either a single template
/// or an ordered list; both are normalized to a `Vec<String>` on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CommandsConfig {
    #[serde(deserialize_with = "one_or_many")]
    pub build: Vec<String>,
    pub start: String,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// A single level a structured system-log entry can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Header,
    Progressbar,
}

/// `"all"`, or an explicit allow-list of levels to retain in the system log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LogLevelFilter {
    All,
    Levels(Vec<LogLevel>),
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        LogLevelFilter::All
    }
}

impl LogLevelFilter {
    pub fn allows(&self, level: LogLevel) -> bool {
        match self {
            LogLevelFilter::All => true,
            LogLevelFilter::Levels(levels) => levels.contains(&level),
        }
    }
}

// Unit variant `All` can't be matched by an untagged derive against the
// string "all" (untagged only shape-matches newtype/struct/seq variants),
// so the wire format (string-or-list, per §6) is deserialized by hand via
// this intermediate representation.
impl<'de> Deserialize<'de> for LogLevelFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            List(Vec<LogLevel>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Str(s) if s == "all" => Ok(LogLevelFilter::All),
            Repr::Str(other) => Err(serde::de::Error::custom(format!(
                "enabled_log_levels: expected \"all\" or a list of levels, got \"{other}\""
            ))),
            Repr::List(levels) => Ok(LogLevelFilter::Levels(levels)),
        }
    }
}
