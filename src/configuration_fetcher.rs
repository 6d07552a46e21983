//! An HTTP client that fetches configuration from the server.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use reqwest::{blocking, StatusCode};
use url::Url;

use crate::{flags::FlagsConfiguration, Error, Result};

/// A collaborator that produces full configuration snapshots.
///
/// A call either succeeds with a complete snapshot or fails with an error; there is no
/// streaming and no partial result. Retry and backoff policy is up to the implementation.
pub trait ConfigurationProvider: Send + Sync {
    /// Fetch and parse a fresh configuration snapshot.
    fn fetch_configuration(&self) -> Result<FlagsConfiguration>;
}

impl<T: ConfigurationProvider + ?Sized> ConfigurationProvider for Arc<T> {
    fn fetch_configuration(&self) -> Result<FlagsConfiguration> {
        (**self).fetch_configuration()
    }
}

/// Parameters for [`ConfigurationFetcher`].
#[allow(missing_docs)]
pub struct ConfigurationFetcherConfig {
    pub host: String,
    pub sdk_key: String,
    /// SDK name, reported to the server.
    pub sdk_name: String,
    /// Version of SDK.
    pub sdk_version: String,
}

const CONFIGURATION_ENDPOINT: &str = "/flag-config/v1/config";

/// The default [`ConfigurationProvider`]: fetches configuration over HTTP.
pub struct ConfigurationFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: blocking::Client,
    config: ConfigurationFetcherConfig,
    /// If we receive a 401 Unauthorized error during a request, it means the SDK key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: AtomicBool,
}

impl ConfigurationFetcher {
    /// Create a new fetcher.
    pub fn new(config: ConfigurationFetcherConfig) -> ConfigurationFetcher {
        ConfigurationFetcher {
            client: blocking::Client::new(),
            config,
            unauthorized: AtomicBool::new(false),
        }
    }
}

impl ConfigurationProvider for ConfigurationFetcher {
    fn fetch_configuration(&self) -> Result<FlagsConfiguration> {
        if self.unauthorized.load(Ordering::Acquire) {
            return Err(Error::Unauthorized);
        }

        let url = Url::parse_with_params(
            &format!("{}{}", self.config.host, CONFIGURATION_ENDPOINT),
            &[
                ("sdkKey", &*self.config.sdk_key),
                ("sdkName", &*self.config.sdk_name),
                ("sdkVersion", &*self.config.sdk_version),
            ],
        )
        .map_err(|_| Error::InvalidHost)?;

        log::debug!(target: "flaglet", "fetching flags configuration");
        let response = self.client.get(url).send().map_err(Error::fetch_failed)?;

        let response = response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "flaglet", "client is not authorized. Check your SDK key");
                self.unauthorized.store(true, Ordering::Release);
                Error::Unauthorized
            } else {
                log::warn!(target: "flaglet", "received non-200 response while fetching new configuration: {:?}", err);
                Error::fetch_failed(err)
            }
        })?;

        let configuration = response.json().map_err(Error::fetch_failed)?;

        log::debug!(target: "flaglet", "successfully fetched flags configuration");

        Ok(configuration)
    }
}
