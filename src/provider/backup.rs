//! Identity backup kept in a secret backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{IssuedIdentity, ProviderError};
use crate::domain::InstanceIdentity;
use crate::secrets::{SecretString, SecretsClient, SecretsError};

/// Stored document. The key is serialized explicitly because
/// [`SecretString`] redacts itself on serialization.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupDocument {
    #[serde(flatten)]
    identity: InstanceIdentity,
    private_key_pem: String,
}

/// Reads and writes the identity backup under one secret name.
#[derive(Clone)]
pub struct BackupSecretStore {
    client: Arc<dyn SecretsClient>,
    secret_name: String,
}

impl BackupSecretStore {
    pub fn new(client: Arc<dyn SecretsClient>, secret_name: impl Into<String>) -> Self {
        Self { client, secret_name: secret_name.into() }
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// `Ok(None)` when the secret is missing or holds no usable identity.
    pub async fn read(&self) -> Result<Option<IssuedIdentity>, ProviderError> {
        let raw = match self.client.get_secret(&self.secret_name).await {
            Ok(raw) => raw,
            Err(SecretsError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let document: BackupDocument =
            serde_json::from_str(&raw).map_err(SecretsError::SerializationError)?;
        let issued =
            IssuedIdentity::new(document.identity, SecretString::new(document.private_key_pem));

        Ok(issued.is_usable().then_some(issued))
    }

    pub async fn write(&self, issued: &IssuedIdentity) -> Result<(), ProviderError> {
        let document = BackupDocument {
            identity: issued.identity.clone(),
            private_key_pem: issued.key.expose_secret().to_string(),
        };
        let raw = serde_json::to_string(&document).map_err(SecretsError::SerializationError)?;
        self.client.set_secret(&self.secret_name, &raw).await?;
        Ok(())
    }
}

impl std::fmt::Debug for BackupSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupSecretStore").field("secret_name", &self.secret_name).finish()
    }
}
