//! Base type for generated API services.
//!
//! # Design
//! `HttpClient` holds only the shared config and a transport handle. Each
//! service method builds an `ApiRequestOptions` and hands it to
//! [`HttpClient::do_request`], which runs the pipeline on its own task.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cancelable::CancelableFuture;
use crate::config::ApiConfig;
use crate::descriptor::ApiRequestOptions;
use crate::error::TransportError;
use crate::request;
use crate::transport::{ReqwestTransport, Transport};

#[derive(Clone)]
pub struct HttpClient {
    config: Arc<ApiConfig>,
    transport: Arc<dyn Transport>,
}

impl HttpClient {
    /// Client over the default `reqwest` transport configured from `config`.
    pub fn new(config: ApiConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ApiConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn do_request<T>(&self, options: ApiRequestOptions) -> CancelableFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        request::request(Arc::clone(&self.config), options, Arc::clone(&self.transport))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
