//! CLI subcommands.

pub mod get;
pub mod parts;

use std::path::Path;

use davfetch::config::{default_config_path, ConfigFile};

use crate::error::CliError;

/// Load the config file named on the command line, or the default one.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, CliError> {
    match explicit {
        Some(path) => Ok(ConfigFile::load(path)?),
        None => match default_config_path() {
            Some(path) => Ok(ConfigFile::load_or_default(&path)?),
            None => Ok(ConfigFile::default()),
        },
    }
}
