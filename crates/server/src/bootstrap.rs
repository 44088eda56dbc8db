use std::sync::Arc;

use dealbridge_core::config::{AppConfig, ConfigError, LoadOptions};
use dealbridge_crm::{HubSpotContacts, HubSpotStore, StoreError};
use dealbridge_engine::ReconciliationEngine;
use dealbridge_extract::MessageParser;
use thiserror::Error;
use tracing::info;

use crate::webhook::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("crm client construction failed: {0}")]
    CrmClient(StoreError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let store = HubSpotStore::new(&config.crm).map_err(BootstrapError::CrmClient)?;
    let contacts = HubSpotContacts::new(&config.crm).map_err(BootstrapError::CrmClient)?;
    let engine = ReconciliationEngine::new(Arc::new(store), &config.cache);
    info!(
        event_name = "system.bootstrap.crm_client_ready",
        correlation_id = "bootstrap",
        base_url = %config.crm.base_url,
        pipeline = %config.crm.pipeline,
        "crm client configured"
    );

    let state = AppState {
        engine: Arc::new(engine),
        contacts: Arc::new(contacts),
        parser: MessageParser::new(),
    };
    Ok(Application { config, state })
}

#[cfg(test)]
mod tests {
    use dealbridge_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_crm_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                crm_access_token: Some(String::new()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("crm.access_token"));
    }

    #[tokio::test]
    async fn bootstrap_succeeds_with_a_token_override() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                crm_access_token: Some("pat-na1-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let app = result.expect("bootstrap should succeed with a token");
        assert_eq!(app.config.crm.pipeline, "default");
    }
}
