//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, LogOutput, LoggingConfig, PewterConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &PewterConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bot_config(&config.bot)?;

    if config.scheduler.tick_ms == 0 {
        return Err(ConfigError::validation(
            "Scheduler tick must be greater than 0",
        ));
    }

    for name in config.access.rules.keys() {
        if name.trim().is_empty() {
            return Err(ConfigError::validation("Access rule names cannot be empty"));
        }
    }

    for name in &config.startup.activate {
        if name.trim().is_empty() {
            return Err(ConfigError::validation(
                "Startup plugin names cannot be empty",
            ));
        }
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    validate_prefix(&bot.prefix)?;
    for prefix in &bot.alt_prefixes {
        validate_prefix(prefix)?;
    }

    if bot.max_concurrent_handlers == 0 {
        return Err(ConfigError::validation(
            "max_concurrent_handlers must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_prefix(prefix: &str) -> ConfigResult<()> {
    if prefix.is_empty() {
        return Err(ConfigError::validation("Command prefix cannot be empty"));
    }
    if prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "Command prefix cannot contain whitespace: {prefix:?}"
        )));
    }
    Ok(())
}
