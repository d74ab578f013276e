use platform_dirs::AppDirs;
use serde::Deserialize;
use serde::Serialize;

use crate::account::Credentials;

#[derive(Deserialize, Serialize, Clone)]
pub struct Config {
    pub email: String,
    pub password: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl: i64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_session_ttl() -> i64 {
    // 30 minutes, matching the site's server-side session window
    1800
}

fn default_cache_dir() -> String {
    let app_dirs = AppDirs::new(Some("aihl-session"), false).unwrap();
    app_dirs.cache_dir.to_str().unwrap().to_string()
}

impl Config {
    pub fn load() -> Self {
        let app_dirs = AppDirs::new(Some("aihl-session"), false).unwrap();
        let config_path = app_dirs.config_dir.join("Conf.toml");
        if let Ok(content) = std::fs::read_to_string(config_path) {
            if let Ok(config) = toml::from_str(&content) {
                return config;
            }
        }
        let config = Config {
            email: String::new(),
            password: String::new(),
            session_ttl: default_session_ttl(),
            debug: false,
            cache_dir: default_cache_dir(),
        };
        config.save();
        config
    }

    pub fn save(&self) {
        let content = toml::to_string(&self).unwrap();
        let app_dirs = AppDirs::new(Some("aihl-session"), false).unwrap();
        std::fs::create_dir_all(&app_dirs.config_dir).unwrap();
        let config_path = app_dirs.config_dir.join("Conf.toml");
        std::fs::write(config_path, content).unwrap();
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.email, &self.password)
    }
}
