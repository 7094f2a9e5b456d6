use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Public URL of this server (e.g., https://chat.example.com).
    /// Used for CORS configuration.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
            jwt_expiry_seconds: default_jwt_expiry(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Worker id baked into generated message ids. Must differ per
    /// instance when several gateways share one database.
    #[serde(default)]
    pub worker_id: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { worker_id: 0 }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".into()
}

fn default_database_url() -> String {
    "sqlite://./data/cohort.db?mode=rwc".into()
}

fn default_max_connections() -> u32 {
    10
}

fn default_jwt_expiry() -> u64 {
    86400
}

fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from_digit(idx as u32, 16).unwrap_or('0')
        })
        .collect()
}

impl Config {
    /// Loads the config, writing a freshly generated one (including a
    /// random JWT secret) when the file does not exist yet.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            let _ = harden_secret_file_permissions(path);
            tracing::info!("Generated default config at '{}'", path);
            config
        };
        let _ = harden_secret_file_permissions(path);

        // Environment variable overrides
        if let Ok(value) = std::env::var("COHORT_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("COHORT_PUBLIC_URL") {
            config.server.public_url = Some(value);
        }
        if let Ok(value) = std::env::var("COHORT_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("COHORT_JWT_SECRET") {
            config.auth.jwt_secret = value;
        }
        if let Ok(value) = std::env::var("COHORT_WORKER_ID") {
            if let Ok(worker_id) = value.trim().parse() {
                config.gateway.worker_id = worker_id;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_generates_defaults_with_a_secret() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cohort.toml");
        let path = path.to_str().expect("utf8 path");

        let config = Config::load(path).expect("load");
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.auth.jwt_secret.len(), 64);

        // A second load reads the same generated secret back.
        let reloaded = Config::load(path).expect("reload");
        assert_eq!(reloaded.auth.jwt_secret, config.auth.jwt_secret);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cohort.toml");
        fs::write(
            &path,
            "[server]\nbind_address = \"127.0.0.1:9999\"\n\n[auth]\njwt_secret = \"s\"\n",
        )
        .expect("write");

        let config = Config::load(path.to_str().expect("utf8 path")).expect("load");
        assert_eq!(config.server.bind_address, "127.0.0.1:9999");
        assert_eq!(config.auth.jwt_secret, "s");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.gateway.worker_id, 0);
    }

    #[cfg(unix)]
    #[test]
    fn generated_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cohort.toml");
        Config::load(path.to_str().expect("utf8 path")).expect("load");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
