//! Backend selection: one adapter, chosen once at startup from configuration.

use std::sync::Arc;

use parley_config::{AppConfig, BackendMode};
use parley_core::backend::Backend;
use parley_core::error::BackendError;
use tracing::info;

use crate::chat::ChatBackend;
use crate::gateway::GatewayBackend;
use crate::tgi::TgiBackend;

/// Build the configured backend.
///
/// `local` mode needs the crate's `local` feature; without it the call fails
/// with [`BackendError::NotConfigured`].
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Backend>, BackendError> {
    let backend: Arc<dyn Backend> = match config.backend {
        BackendMode::Gateway => Arc::new(GatewayBackend::from_config(&config.gateway)?),
        BackendMode::Tgi => Arc::new(TgiBackend::from_config(&config.tgi)?),
        BackendMode::Chat => Arc::new(ChatBackend::from_config(&config.chat)?),
        BackendMode::Local => build_local(config)?,
    };

    info!(backend = backend.name(), "Inference backend selected");
    Ok(backend)
}

#[cfg(feature = "local")]
fn build_local(config: &AppConfig) -> Result<Arc<dyn Backend>, BackendError> {
    Ok(Arc::new(crate::local::LocalBackend::from_config(&config.local)?))
}

#[cfg(not(feature = "local"))]
fn build_local(_config: &AppConfig) -> Result<Arc<dyn Backend>, BackendError> {
    Err(BackendError::NotConfigured(
        "local inference requires building with --features local".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_selects_gateway() {
        let backend = build_from_config(&AppConfig::default()).unwrap();
        assert_eq!(backend.name(), "gateway");
    }

    #[test]
    fn selects_tgi() {
        let config = AppConfig {
            backend: BackendMode::Tgi,
            ..AppConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "tgi");
    }

    #[test]
    fn chat_without_key_fails() {
        let config = AppConfig {
            backend: BackendMode::Chat,
            ..AppConfig::default()
        };
        assert!(build_from_config(&config).is_err());
    }

    #[test]
    fn chat_with_key() {
        let mut config = AppConfig {
            backend: BackendMode::Chat,
            ..AppConfig::default()
        };
        config.chat.api_key = Some("sk-test".into());
        assert_eq!(build_from_config(&config).unwrap().name(), "chat");
    }

    #[cfg(not(feature = "local"))]
    #[test]
    fn local_without_feature_is_not_configured() {
        let mut config = AppConfig {
            backend: BackendMode::Local,
            ..AppConfig::default()
        };
        config.local.model_path = Some("/models/tiny.gguf".into());
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }
}
