use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "instabuy", about = "Server for a location-based marketplace")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub listing: ListingConfig,
    pub tasks: TasksConfig,
    pub admin: AdminConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Graph API endpoint used to resolve an access token to a user id.
    pub facebook_graph_url: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ListingConfig {
    /// Items returned per listing request.
    pub items_per_request: usize,
    /// Documents pulled from the search index per page while filling a listing.
    pub items_per_page: usize,
    /// Users loaded per page while scrubbing seen lists.
    pub users_per_page: usize,
    /// Upper bound (exclusive) on the number of item ids an updates poll may check.
    pub max_update_item_ids: usize,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct TasksConfig {
    /// Wait for fire-and-forget work before responding as well.
    pub join_detached: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount `/clear_all`. Development only.
    pub enable_clear_all: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            facebook_graph_url: "https://graph.facebook.com/v2.2/me".to_string(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            items_per_request: 5,
            items_per_page: 50,
            users_per_page: 300,
            max_update_item_ids: 100,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        config.resolve_paths(&data_dir);
        Ok(config)
    }

    /// Fill in database and blob paths relative to the data dir.
    pub fn resolve_paths(&mut self, data_dir: &std::path::Path) {
        if self.database.path.is_none() {
            self.database.path = Some(data_dir.join("instabuy.db"));
        }
        if self.storage.path.is_none() {
            self.storage.path = Some(data_dir.join("blobs"));
        }
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".instabuy")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("instabuy.db"))
    }

    pub fn blobs_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("blobs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.listing.items_per_request, 5);
        assert_eq!(config.listing.items_per_page, 50);
        assert_eq!(config.listing.users_per_page, 300);
        assert!(!config.tasks.join_detached);
        assert!(!config.admin.enable_clear_all);
        assert!(config.database.path.is_none());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(PathBuf::from("/tmp/test-instabuy")),
        };
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-instabuy"));
    }

    #[test]
    fn data_dir_defaults_to_home_dot_instabuy() {
        let cli = Cli {
            config: None,
            host: None,
            port: None,
            data_dir: None,
        };
        assert!(Config::data_dir(&cli).ends_with(".instabuy"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(tmp.path().to_path_buf()),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.db_path(), tmp.path().join("instabuy.db"));
        assert_eq!(config.blobs_path(), tmp.path().join("blobs"));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
port = 9000

[listing]
items_per_request = 10
users_per_page = 20

[admin]
enable_clear_all = true
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: None,
            port: None,
            data_dir: Some(tmp.path().to_path_buf()),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.listing.items_per_request, 10);
        assert_eq!(config.listing.users_per_page, 20);
        // Unset keys in a present section keep their defaults.
        assert_eq!(config.listing.items_per_page, 50);
        assert!(config.admin.enable_clear_all);
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
    }
}
