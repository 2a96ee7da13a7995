use std::path::PathBuf;

use etcetera::BaseStrategy;

pub const CONFIG_FILE_NAME: &str = "strap.toml";

/// `$XDG_CONFIG_HOME/strap` or the platform equivalent
pub fn user_config_dir() -> Option<PathBuf> {
    etcetera::choose_base_strategy()
        .ok()
        .map(|strategy| strategy.config_dir().join("strap"))
}

pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}
