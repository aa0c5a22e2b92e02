use crate::errors::QuantlabError;
use crate::GlobalOpts;
use clap::Subcommand;
use colored::Colorize;
use quantlab_config::config::KEYS;
use quantlab_config::{AppPaths, Config, ConfigError};
use quantlab_logger as logger;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print every value set in the config file
    Show,
    /// Print one value
    Get { key: String },
    /// Set a value and save the config file
    Set { key: String, value: String },
    /// Print the config file location
    Path,
}

pub fn handle_config(action: Option<ConfigAction>, opts: &GlobalOpts) -> Result<(), QuantlabError> {
    let paths = AppPaths::resolve(opts.app_dir.as_deref())?;
    let config_path = paths.config_file();

    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = Config::load_from_path(&config_path)?;
            logger::print(&format!("{}", "Configuration:".bold().green()));
            if config.is_empty() {
                logger::print(&format!("  {}", "(defaults)".yellow()));
            } else {
                for (key, value) in config.values_iter() {
                    logger::print(&format!("  {}: {}", key.cyan(), value));
                }
            }
        }
        ConfigAction::Get { key } => {
            let config = Config::load_from_path(&config_path)?;
            if !KEYS.contains(&key.as_str()) {
                return Err(ConfigError::UnknownKey(key).into());
            }
            match config.get(&key) {
                Some(value) => logger::print(&value),
                None => logger::print(&format!("{} is not set", key)),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from_path(&config_path)?;
            config.set(&key, value.clone())?;
            config.save_to_path(&config_path)?;
            logger::success(&format!("Set {} = {}", key, value));
        }
        ConfigAction::Path => {
            logger::print(&config_path.display().to_string());
        }
    }
    Ok(())
}
