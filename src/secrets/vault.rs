//! HashiCorp Vault KV v2 backend.
//!
//! Each secret is stored as a map with a single `value` field.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::client::SecretsClient;
use super::error::{Result, SecretsError};

/// Connection settings for the Vault backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    pub address: String,

    pub token: Option<String>,

    /// Vault Enterprise namespace
    pub namespace: Option<String>,

    /// KV v2 mount path (default: "secret")
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
}

fn default_mount_path() -> String {
    "secret".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            mount_path: default_mount_path(),
        }
    }
}

impl VaultConfig {
    /// Load from `VAULT_ADDR`, `VAULT_TOKEN`, `VAULT_NAMESPACE` and
    /// `VAULT_MOUNT_PATH`. Returns `None` when `VAULT_ADDR` is unset.
    pub fn from_env() -> Option<Self> {
        let address = std::env::var("VAULT_ADDR").ok().filter(|a| !a.trim().is_empty())?;
        Some(Self {
            address,
            token: std::env::var("VAULT_TOKEN").ok(),
            namespace: std::env::var("VAULT_NAMESPACE").ok(),
            mount_path: std::env::var("VAULT_MOUNT_PATH").unwrap_or_else(|_| default_mount_path()),
        })
    }
}

/// [`SecretsClient`] backed by a Vault KV v2 mount.
pub struct VaultSecretsClient {
    client: VaultClient,
    mount_path: String,
}

impl VaultSecretsClient {
    /// Build a client and probe Vault's health endpoint.
    ///
    /// An unreachable Vault is only logged; each read or write reports its
    /// own failure once the backend is used.
    pub async fn new(config: VaultConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(SecretsError::config_error("Vault address cannot be empty"));
        }

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token);
        }

        if let Some(namespace) = config.namespace.clone() {
            settings_builder.namespace(Some(namespace));
        }

        let settings = settings_builder.build().map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(settings).map_err(|e| {
            SecretsError::connection_failed(format!("Failed to create Vault client: {}", e))
        })?;

        match vaultrs::sys::health(&client).await {
            Ok(_) => {
                tracing::info!(address = %config.address, mount_path = %config.mount_path, "Connected to Vault")
            }
            Err(e) => tracing::warn!(
                error = %e,
                address = %config.address,
                "Vault health check failed, backup secret may be unavailable"
            ),
        }

        Ok(Self { client, mount_path: config.mount_path })
    }
}

#[async_trait]
impl SecretsClient for VaultSecretsClient {
    async fn get_secret(&self, key: &str) -> Result<String> {
        let secret: HashMap<String, String> =
            kv2::read(&self.client, &self.mount_path, key).await.map_err(|e| match e {
                ClientError::APIError { code: 404, .. } => SecretsError::not_found(key),
                e => {
                    tracing::warn!(error = %e, key = %key, "Failed to read secret from Vault");
                    SecretsError::backend_error(format!("Failed to read secret '{}': {}", key, e))
                }
            })?;

        secret.get("value").cloned().ok_or_else(|| {
            SecretsError::invalid_value(format!("secret '{}' has no 'value' field", key))
        })
    }

    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        let mut data = HashMap::new();
        data.insert("value".to_string(), value.to_string());

        kv2::set(&self.client, &self.mount_path, key, &data).await.map_err(|e| {
            tracing::error!(error = %e, key = %key, "Failed to write secret to Vault");
            SecretsError::backend_error(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::debug!(key = %key, mount_path = %self.mount_path, "Stored secret in Vault");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_vault_config_default() {
        let config = VaultConfig::default();
        assert_eq!(config.address, "http://127.0.0.1:8200");
        assert_eq!(config.mount_path, "secret");
        assert!(config.token.is_none());
    }

    #[test]
    fn test_vault_config_mount_path_defaults_when_deserializing() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"address":"https://vault:8200","token":null,"namespace":null}"#)
                .unwrap();
        assert_eq!(config.mount_path, "secret");
    }

    fn config(address: &str) -> VaultConfig {
        VaultConfig { address: address.to_string(), token: Some("root".into()), ..VaultConfig::default() }
    }

    #[tokio::test]
    async fn test_unreachable_vault_still_builds_client() {
        let client = VaultSecretsClient::new(config("http://127.0.0.1:1")).await.unwrap();

        let err = client.get_secret("identity-backup").await.unwrap_err();
        assert!(matches!(err, SecretsError::BackendError { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_missing_secret_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/identity-backup"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({ "errors": [] })))
            .mount(&server)
            .await;

        let client = VaultSecretsClient::new(config(&server.uri())).await.unwrap();
        let err = client.get_secret("identity-backup").await.unwrap_err();
        assert!(matches!(err, SecretsError::NotFound { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_server_error_is_not_reported_as_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/identity-backup"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({ "errors": ["storage unavailable"] })),
            )
            .mount(&server)
            .await;

        let client = VaultSecretsClient::new(config(&server.uri())).await.unwrap();
        let err = client.get_secret("identity-backup").await.unwrap_err();
        assert!(matches!(err, SecretsError::BackendError { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_empty_address_is_rejected() {
        let config = VaultConfig { address: String::new(), ..VaultConfig::default() };
        let err = VaultSecretsClient::new(config).await.err().expect("must fail");
        assert!(matches!(err, SecretsError::ConfigError { .. }));
    }
}
