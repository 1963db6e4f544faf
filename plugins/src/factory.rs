use std::sync::Arc;

use anyhow::{Context, Result};

use pbench_core::api::{AppConfig, ClientConfig, ClientError, ClientFactory, QueryClient};

use crate::presto::PrestoClient;

/// Creates one HTTP client, with its own connection pool, per request.
pub struct PrestoClientFactory {
    config: ClientConfig,
}

impl PrestoClientFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for PrestoClientFactory {
    fn new_client(&self) -> Result<Arc<dyn QueryClient>, ClientError> {
        tracing::debug!(server_url = %self.config.server_url, user = %self.config.user, "creating client");
        Ok(Arc::new(PrestoClient::new(&self.config)?))
    }
}

pub fn build_client_factory(cfg: &AppConfig) -> Result<Arc<dyn ClientFactory>> {
    let url = reqwest::Url::parse(&cfg.client.server_url)
        .with_context(|| format!("invalid server url: {}", cfg.client.server_url))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("unsupported server url scheme: {}", url.scheme());
    }
    Ok(Arc::new(PrestoClientFactory::new(cfg.client.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_server_url() {
        let mut cfg = AppConfig::default();
        cfg.client.server_url = "not a url".to_string();
        assert!(build_client_factory(&cfg).is_err());

        cfg.client.server_url = "ftp://coordinator:8080".to_string();
        let err = build_client_factory(&cfg).err().unwrap();
        assert!(err.to_string().contains("unsupported server url scheme"));
    }

    #[test]
    fn builds_fresh_clients_with_empty_session() {
        let factory = build_client_factory(&AppConfig::default()).unwrap();
        let first = factory.new_client().unwrap();
        let second = factory.new_client().unwrap();

        assert_eq!(first.session(), second.session());
        assert!(first.session().catalog.is_none());
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
