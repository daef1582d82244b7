//! Token workflow.
//!
//! Each cycle authenticates with the certificate and key currently on disk,
//! fetches a role token and an access token per target, replaces the cached
//! slots and writes the whole cache out. The token endpoint runs while the
//! engine is steady.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info};
use zeroize::Zeroizing;

use super::{write_files, PendingFile};
use crate::api::{ApiState, TokenServer};
use crate::backoff::BackoffPolicy;
use crate::cache::{TokenCache, TokenSnapshot};
use crate::config::IdentityConfig;
use crate::engine::{EngineSettings, Workflow};
use crate::errors::Result;
use crate::observability::RefreshMetrics;
use crate::provider::ProviderClient;
use crate::utils::PUBLIC_FILE_MODE;

pub struct TokenWorkflow {
    config: Arc<IdentityConfig>,
    provider: Arc<dyn ProviderClient>,
    cache: Arc<TokenCache>,
    server: Mutex<Option<TokenServer>>,
    metrics: RefreshMetrics,
}

impl TokenWorkflow {
    pub fn new(
        config: Arc<IdentityConfig>,
        provider: Arc<dyn ProviderClient>,
        cache: Arc<TokenCache>,
    ) -> Self {
        Self { config, provider, cache, server: Mutex::new(None), metrics: RefreshMetrics::new() }
    }

    /// Refresh every `token_refresh` with no startup jitter. The retry
    /// budget follows the certificate refresh interval.
    pub fn engine_settings(config: &IdentityConfig) -> EngineSettings {
        EngineSettings {
            interval: config.token_refresh,
            jitter_bound: Duration::ZERO,
            init_only: config.init,
            backoff: BackoffPolicy::for_refresh(config.refresh),
        }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Address of the running token endpoint.
    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(TokenServer::local_addr)
    }

    fn pending_files(&self, snapshot: &TokenSnapshot) -> Vec<PendingFile> {
        let access = snapshot.access_tokens.iter().map(|token| {
            PendingFile::new(
                self.config.access_token_path(&token.target()),
                PUBLIC_FILE_MODE,
                token.token.as_bytes(),
            )
        });
        let role = snapshot.role_tokens.iter().map(|token| {
            PendingFile::new(
                self.config.role_token_path(&token.target()),
                PUBLIC_FILE_MODE,
                token.token.as_bytes(),
            )
        });
        access.chain(role).collect()
    }
}

/// Missing files yield empty bytes; the token request then fails.
async fn read_or_empty(path: &str, what: &str) -> Zeroizing<Vec<u8>> {
    match tokio::fs::read(Path::new(path)).await {
        Ok(bytes) => Zeroizing::new(bytes),
        Err(e) => {
            error!(path, error = %e, "Failed to read {} from local file", what);
            Zeroizing::new(Vec::new())
        }
    }
}

#[async_trait]
impl Workflow for TokenWorkflow {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn run_cycle(&self) -> Result<()> {
        if self.config.has_targets() {
            let cert = read_or_empty(&self.config.cert_file, "certificate").await;
            let key = read_or_empty(&self.config.key_file, "private key").await;
            let tokens = self
                .provider
                .issue_tokens(&cert, &key, &self.config.target_domain_roles)
                .await
                .inspect_err(|e| error!(error = %e, "Failed to retrieve tokens"))?;

            let (role_count, access_count) = (tokens.role_tokens.len(), tokens.access_tokens.len());
            for token in tokens.role_tokens {
                self.cache.store_role_token(token);
            }
            for token in tokens.access_tokens {
                self.cache.store_access_token(token);
            }
            info!(role_tokens = role_count, access_tokens = access_count, "Tokens refreshed");
        } else {
            info!("No target roles configured, skipping token request");
        }

        self.metrics.set_cached_tokens(self.cache.len());

        let files = self.pending_files(&self.cache.snapshot());
        let written = write_files(files).await?;
        info!(files = written, dir = %self.config.token_dir, "Token files written");
        Ok(())
    }

    async fn on_start(&self) -> Result<()> {
        let server = TokenServer::bind(
            &self.config.token_server_addr,
            ApiState::new(self.cache.clone()),
            self.config.shutdown_grace,
        )
        .await?;
        *self.server.lock().await = Some(server);
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<()> {
        match self.server.lock().await.take() {
            Some(server) => server.shutdown().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessToken, DomainRole, RoleToken};
    use crate::store::Lookup;
    use crate::workflows::test_support::ScriptedProvider;

    fn config(dir: &Path) -> IdentityConfig {
        let cert_file = dir.join("service.cert.pem");
        let key_file = dir.join("service.key.pem");
        std::fs::write(&cert_file, "CERT").unwrap();
        std::fs::write(&key_file, "KEY").unwrap();

        IdentityConfig {
            cert_file: cert_file.display().to_string(),
            key_file: key_file.display().to_string(),
            token_dir: dir.join("tokens").display().to_string(),
            target_domain_roles: vec![
                DomainRole::new("media.prod", "readers"),
                DomainRole::new("media.prod", "writers"),
            ],
            token_server_addr: "127.0.0.1:0".into(),
            shutdown_grace: Duration::from_secs(2),
            ..IdentityConfig::default()
        }
    }

    fn workflow(config: IdentityConfig, provider: Arc<ScriptedProvider>) -> TokenWorkflow {
        TokenWorkflow::new(Arc::new(config), provider, Arc::new(TokenCache::new()))
    }

    #[tokio::test]
    async fn test_cycle_fills_cache_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::default());
        let workflow = workflow(config(dir.path()), provider.clone());

        workflow.run_cycle().await.unwrap();

        let pair = workflow.cache().lookup("media.prod", "readers").found().unwrap();
        assert_eq!(pair.access_token, "at-media.prod:role.readers-0");
        assert_eq!(pair.role_token, "rt-media.prod:role.readers-0");
        assert_eq!(workflow.cache().len(), 4);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tokens/media.prod:role.writers.accesstoken")).unwrap(),
            "at-media.prod:role.writers-0"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tokens/media.prod:role.writers.roletoken")).unwrap(),
            "rt-media.prod:role.writers-0"
        );
    }

    #[tokio::test]
    async fn test_whole_cache_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(config(dir.path()), Arc::new(ScriptedProvider::default()));
        let other = DomainRole::new("sports", "viewers");
        workflow.cache().store_access_token(AccessToken::new(&other, "at-old"));
        workflow.cache().store_role_token(RoleToken::new(&other, "rt-old"));

        workflow.run_cycle().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("tokens/sports:role.viewers.accesstoken")).unwrap(),
            "at-old"
        );
    }

    #[tokio::test]
    async fn test_refresh_replaces_slots() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(config(dir.path()), Arc::new(ScriptedProvider::default()));

        workflow.run_cycle().await.unwrap();
        workflow.run_cycle().await.unwrap();

        let pair = workflow.cache().lookup("media.prod", "readers").found().unwrap();
        assert_eq!(pair.access_token, "at-media.prod:role.readers-1");
        assert_eq!(workflow.cache().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.key_file = dir.path().join("missing.key.pem").display().to_string();
        let workflow = workflow(config, Arc::new(ScriptedProvider::default()));

        assert!(workflow.run_cycle().await.is_err());
        assert!(matches!(workflow.cache().lookup("media.prod", "readers"), Lookup::DomainNotFound));
        assert!(!dir.path().join("tokens").exists());
    }

    #[tokio::test]
    async fn test_no_targets_skips_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.target_domain_roles.clear();
        let provider = Arc::new(ScriptedProvider::default());

        workflow(config, provider.clone()).run_cycle().await.unwrap();
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_targets_does_not_need_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.target_domain_roles.clear();
        std::fs::remove_file(&config.cert_file).unwrap();
        std::fs::remove_file(&config.key_file).unwrap();
        let provider = Arc::new(ScriptedProvider::default());
        let workflow = workflow(config, provider.clone());

        workflow.run_cycle().await.unwrap();
        assert!(provider.calls().is_empty());
        assert!(workflow.cache().is_empty());
        assert!(!dir.path().join("tokens").exists());
    }

    #[test]
    fn test_engine_settings() {
        let config = IdentityConfig {
            refresh: Duration::from_secs(3600),
            token_refresh: Duration::from_secs(600),
            delay_jitter_seconds: 30,
            ..IdentityConfig::default()
        };
        let settings = TokenWorkflow::engine_settings(&config);
        assert_eq!(settings.interval, Duration::from_secs(600));
        assert_eq!(settings.jitter_bound, Duration::ZERO);
        assert_eq!(settings.backoff.max_elapsed, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(config(dir.path()), Arc::new(ScriptedProvider::default()));
        workflow.run_cycle().await.unwrap();

        workflow.on_start().await.unwrap();
        let addr = workflow.server_addr().await.unwrap();

        let response = reqwest::Client::new()
            .get(format!("http://{}/", addr))
            .header("X-Athenz-Domain", "media.prod")
            .header("X-Athenz-Role", "writers")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["authorization"], "bearer at-media.prod:role.writers-0");
        drop(response);

        workflow.on_shutdown().await.unwrap();
        assert!(workflow.server_addr().await.is_none());
        assert!(workflow.on_shutdown().await.is_ok());
    }
}
