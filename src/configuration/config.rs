#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::BackendName;
use crate::domain::models::SenderRole;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    Backend,
    BackendURL,
    ConfigFile,
    ConversationID,
    FetchTimeout,
    FixtureFile,
    PageSize,
    RealtimeBatchSize,
    Role,
    UnreadCount,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        let default_backend = BackendName::Memory.to_string();
        let default_role = SenderRole::Trainer.to_string();

        let config_path = dirs::config_dir()
            .unwrap_or_default()
            .join("convofeed/config.toml");
        let config_path = config_path.to_string_lossy();

        let res: &str = match key {
            ConfigKey::Backend => &default_backend,
            ConfigKey::BackendURL => "http://localhost:8080",
            ConfigKey::FetchTimeout => "10000",
            ConfigKey::FixtureFile => "",
            ConfigKey::PageSize => "30",
            ConfigKey::RealtimeBatchSize => "16",
            ConfigKey::Role => &default_role,

            // Special
            ConfigKey::ConfigFile => &config_path,
            ConfigKey::ConversationID => "demo",
            ConfigKey::UnreadCount => "0",
        };

        return res.to_string();
    }

    /// Rejects values the feed could not run with. Keys without constraints
    /// accept anything.
    pub fn validate(key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::PageSize | ConfigKey::RealtimeBatchSize | ConfigKey::FetchTimeout => {
                match value.parse::<u64>() {
                    Ok(0) | Err(_) => {
                        bail!(format!(
                            "Invalid value for '{key}': {value}\nExpected a whole number greater than 0"
                        ));
                    }
                    Ok(_) => {}
                }
            }
            ConfigKey::UnreadCount => {
                if value.parse::<u32>().is_err() {
                    bail!(format!(
                        "Invalid value for '{key}': {value}\nExpected a whole number"
                    ));
                }
            }
            ConfigKey::Role => {
                if SenderRole::parse(value).is_none() {
                    bail!(format!(
                        "Invalid value for '{key}': {value}\nPossible values are: trainer, counterpart"
                    ));
                }
            }
            ConfigKey::Backend => {
                if BackendName::parse(value.to_string()).is_none() {
                    bail!(format!(
                        "Invalid value for '{key}': {value}\nPossible values are: memory, http"
                    ));
                }
            }
            _ => {}
        }

        return Ok(());
    }

    fn set_validated(key: ConfigKey, value: &str) -> Result<()> {
        Config::validate(key, value)?;
        Config::set(key, value);
        return Ok(());
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if let Some(val) = doc.get(&key.to_string()) {
                    // Use clap value parsers to do validation.
                    let mut possible_values = vec![];
                    if let Some(arg) = cmd
                        .get_arguments()
                        .find(|e| return e.get_long() == Some(key.to_string().as_str()))
                    {
                        possible_values = arg
                            .get_possible_values()
                            .iter()
                            .map(|e| return e.get_name().to_string())
                            .collect::<Vec<String>>();
                    }

                    if let Some(val_int) = val.as_integer() {
                        Config::set_validated(key, &val_int.to_string())?;
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        if !possible_values.is_empty()
                            && !possible_values.contains(&val_str.to_string())
                        {
                            bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                        }
                        Config::set_validated(key, val_str)?;
                    } else {
                        bail!(format!(
                            "config.toml has an invalid value for key '{key}': {val}"
                        ));
                    }
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set_validated(key, val)?;
                }
            }
        }

        tracing::debug!(
            backend = Config::get(ConfigKey::Backend),
            backend_url = Config::get(ConfigKey::BackendURL),
            conversation_id = Config::get(ConfigKey::ConversationID),
            page_size = Config::get(ConfigKey::PageSize),
            fetch_timeout = Config::get(ConfigKey::FetchTimeout),
            role = Config::get(ConfigKey::Role),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {}]", possible_values);
                }

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
