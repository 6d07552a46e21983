use std::{collections::HashMap, sync::Arc};

use chrono::Utc;

use crate::{
    assignment_cache::AssignmentCacheKey,
    assignment_logger::AssignmentEvent,
    configuration_fetcher::{
        ConfigurationFetcher, ConfigurationFetcherConfig, ConfigurationProvider,
    },
    configuration_store::ConfigurationStore,
    eval::{evaluate_flag, FlagEvaluation},
    flags::{AssignmentValue, Timestamp, TryParse, VariationType},
    lifecycle::ConfigurationLifecycle,
    sharder::Md5Sharder,
    Attributes, ClientConfig, Error, Result,
};

/// SDK name reported in assignment event metadata.
const SDK_NAME: &str = "flaglet";

/// A client for flag assignment.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Loading
///
/// Before evaluating assignments, call [`Client::load`] to fetch the configuration; any
/// getter called earlier fails with [`Error::NotLoaded`]. `load(false)` is idempotent once a
/// load has succeeded. While a forced reload is in flight, getters keep serving the previous
/// snapshot.
///
/// # Examples
/// ```no_run
/// # use flaglet::{Client, ClientConfig};
/// let client = Client::new(ClientConfig::new("sdk-key", "https://flags.example.com"));
/// client.load(false)?;
/// let on = client.get_boolean_assignment("checkout-flow", "user-42", &Default::default(), false)?;
/// # Ok::<(), flaglet::Error>(())
/// ```
pub struct Client {
    config: ClientConfig,
    provider: Box<dyn ConfigurationProvider>,
    configuration_store: Arc<ConfigurationStore>,
    lifecycle: ConfigurationLifecycle,
}

impl Client {
    /// Create a new `Client` fetching configuration over HTTP from the configured host.
    pub fn new(config: ClientConfig) -> Client {
        let provider = Box::new(ConfigurationFetcher::new(ConfigurationFetcherConfig {
            host: config.host.clone(),
            sdk_key: config.sdk_key.clone(),
            sdk_name: SDK_NAME.to_owned(),
            sdk_version: env!("CARGO_PKG_VERSION").to_owned(),
        }));
        Client::with_provider(config, provider)
    }

    /// Create a new `Client` using a custom configuration provider instead of the HTTP
    /// fetcher.
    pub fn with_provider(config: ClientConfig, provider: Box<dyn ConfigurationProvider>) -> Client {
        Client {
            config,
            provider,
            configuration_store: Arc::new(ConfigurationStore::new()),
            lifecycle: ConfigurationLifecycle::new(),
        }
    }

    /// Load configuration from the provider.
    ///
    /// With `force` false this is idempotent: once a load has succeeded, subsequent calls
    /// return immediately without fetching. With `force` true a fresh fetch is performed even
    /// if configuration is already loaded. Either way at most one fetch is attempted per
    /// call, and a call that observes another in-flight load returns without fetching.
    ///
    /// On failure the load state rolls back to its pre-call value: the last good snapshot (if
    /// any) remains queryable and a later `load` call may retry.
    pub fn load(&self, force: bool) -> Result<()> {
        let Some(prior) = self.lifecycle.try_begin_load(force) else {
            return Ok(());
        };
        match self.configuration_store.fetch_and_store(&*self.provider) {
            Ok(()) => {
                self.lifecycle.complete_load();
                Ok(())
            }
            Err(err) => {
                log::warn!(target: "flaglet", "failed to load configuration: {err}");
                self.lifecycle.fail_load(prior);
                Err(err)
            }
        }
    }

    /// Retrieves the assignment for a given feature flag and subject as a string value.
    ///
    /// Returns `default` if the subject is not eligible for any allocation. Structural
    /// failures (not loaded, unknown flag, type mismatch, invalid input) are returned as
    /// errors; see [`Error`].
    pub fn get_string_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: String,
    ) -> Result<String> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::String,
            default,
            |value| match value {
                AssignmentValue::String(s) => Some(s),
                _ => None,
            },
        )
    }

    /// Retrieves the assignment for a given feature flag and subject as a boolean value.
    ///
    /// Returns `default` if the subject is not eligible for any allocation.
    pub fn get_boolean_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: bool,
    ) -> Result<bool> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Boolean,
            default,
            |value| value.as_boolean(),
        )
    }

    /// Retrieves the assignment for a given feature flag and subject as an integer value.
    ///
    /// Returns `default` if the subject is not eligible for any allocation.
    pub fn get_integer_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: i64,
    ) -> Result<i64> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Integer,
            default,
            |value| value.as_integer(),
        )
    }

    /// Retrieves the assignment for a given feature flag and subject as a numeric value.
    ///
    /// Returns `default` if the subject is not eligible for any allocation.
    pub fn get_numeric_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: f64,
    ) -> Result<f64> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Numeric,
            default,
            |value| value.as_numeric(),
        )
    }

    /// Retrieves the assignment for a given feature flag and subject as a JSON value.
    ///
    /// Returns `default` if the subject is not eligible for any allocation.
    pub fn get_json_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Json,
            default,
            |value| match value {
                AssignmentValue::Json(v) => Some(v),
                _ => None,
            },
        )
    }

    fn get_assignment_inner<T>(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: VariationType,
        default: T,
        convert: impl FnOnce(AssignmentValue) -> Option<T>,
    ) -> Result<T> {
        if !self.lifecycle.is_ready() {
            return Err(Error::NotLoaded);
        }
        if self.config.sdk_key.is_empty() {
            return Err(Error::InvalidSdkKey);
        }
        if self.config.host.is_empty() {
            return Err(Error::InvalidHost);
        }
        if subject_key.is_empty() {
            return Err(Error::MissingSubjectKey);
        }
        if flag_key.is_empty() {
            return Err(Error::MissingFlagKey);
        }

        // The ready flag only flips after the store is populated, so this lookup can fail
        // only on lock poisoning.
        let configuration = self
            .configuration_store
            .get_configuration()
            .ok_or(Error::NotLoaded)?;

        let flag = match configuration.get_flag(flag_key, self.config.is_obfuscated) {
            Some(TryParse::Parsed(flag)) => flag,
            Some(TryParse::ParseFailed(_)) => return Err(Error::ConfigurationParseError),
            None => {
                return Err(Error::FlagConfigNotFound {
                    flag_key: flag_key.to_owned(),
                })
            }
        };

        if flag.variation_type != expected_type {
            return Err(Error::DeclaredTypeMismatch {
                expected: expected_type,
                found: flag.variation_type,
            });
        }

        let now = Utc::now();
        let evaluation = evaluate_flag(
            flag,
            subject_key,
            subject_attributes,
            &Md5Sharder,
            self.config.is_obfuscated,
            now,
        );

        log::trace!(target: "flaglet",
                    flag_key,
                    subject_key,
                    variation:serde = evaluation.variation.as_ref().map(|v| &v.key);
                    "evaluated a flag");

        let Some(variation) = &evaluation.variation else {
            return Ok(default);
        };

        let value = variation
            .value
            .to_assignment_value(expected_type)
            .ok_or(Error::ActualValueTypeMismatch {
                expected: expected_type,
            })?;

        self.log_assignment(flag_key, subject_key, subject_attributes, &evaluation, now);

        convert(value).ok_or(Error::ActualValueTypeMismatch {
            expected: expected_type,
        })
    }

    /// Deliver the decision to the assignment logger unless the cache says this exact
    /// decision was the last one logged. Best-effort: never fails the lookup.
    fn log_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        evaluation: &FlagEvaluation,
        now: Timestamp,
    ) {
        if !evaluation.do_log {
            return;
        }
        let (Some(allocation_key), Some(variation)) =
            (&evaluation.allocation_key, &evaluation.variation)
        else {
            return;
        };

        let cache_key = AssignmentCacheKey {
            subject_key: subject_key.to_owned(),
            flag_key: flag_key.to_owned(),
            allocation_key: allocation_key.clone(),
            variation_key: variation.key.clone(),
        };
        if self
            .config
            .assignment_cache
            .as_ref()
            .is_some_and(|cache| cache.has_logged_assignment(&cache_key))
        {
            return;
        }

        let event = AssignmentEvent {
            feature_flag: flag_key.to_owned(),
            allocation: allocation_key.clone(),
            experiment: format!("{}-{}", flag_key, allocation_key),
            variation: variation.key.clone(),
            subject: subject_key.to_owned(),
            subject_attributes: subject_attributes.clone(),
            timestamp: now.to_rfc3339(),
            meta_data: HashMap::from([
                ("sdkName".to_owned(), SDK_NAME.to_owned()),
                (
                    "sdkVersion".to_owned(),
                    env!("CARGO_PKG_VERSION").to_owned(),
                ),
                (
                    "obfuscated".to_owned(),
                    self.config.is_obfuscated.to_string(),
                ),
            ]),
            extra_logging: evaluation.extra_logging.clone(),
        };
        log::trace!(target: "flaglet", event:serde; "logging assignment");
        self.config.assignment_logger.log_assignment(event);

        if let Some(cache) = &self.config.assignment_cache {
            cache.set_last_logged_assignment(&cache_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use crate::{
        assignment_logger::AssignmentEvent,
        configuration_fetcher::ConfigurationProvider,
        flags::{Allocation, Flag, FlagsConfiguration, Split, TryParse, Variation, VariationType},
        Client, ClientConfig, Error, Result,
    };

    /// Serves a canned configuration, counting fetches and failing on demand.
    struct TestProvider {
        configuration: Mutex<FlagsConfiguration>,
        fail: AtomicBool,
        fetch_count: AtomicUsize,
    }

    impl TestProvider {
        fn new(configuration: FlagsConfiguration) -> Arc<TestProvider> {
            Arc::new(TestProvider {
                configuration: Mutex::new(configuration),
                fail: AtomicBool::new(false),
                fetch_count: AtomicUsize::new(0),
            })
        }
    }

    impl ConfigurationProvider for TestProvider {
        fn fetch_configuration(&self) -> Result<FlagsConfiguration> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(Error::Unauthorized)
            } else {
                Ok(self.configuration.lock().unwrap().clone())
            }
        }
    }

    fn flag(key: &str, variation_type: VariationType, variation: Variation) -> Flag {
        Flag {
            key: key.to_owned(),
            enabled: true,
            variation_type,
            variations: [(variation.key.clone(), variation)].into(),
            allocations: vec![Allocation {
                key: "rollout".to_owned(),
                rules: vec![],
                start_at: None,
                end_at: None,
                splits: vec![Split {
                    shards: vec![],
                    variation_key: "true".to_owned(),
                    extra_logging: HashMap::new(),
                }],
                do_log: true,
            }],
            total_shards: 10_000,
        }
    }

    fn checkout_flow_configuration() -> FlagsConfiguration {
        let flag = flag(
            "checkout-flow",
            VariationType::Boolean,
            Variation {
                key: "true".to_owned(),
                value: true.into(),
            },
        );
        FlagsConfiguration {
            flags: [("checkout-flow".to_owned(), TryParse::Parsed(flag))].into(),
        }
    }

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn logging_client(
        configuration: FlagsConfiguration,
    ) -> (Client, Arc<TestProvider>, Arc<Mutex<Vec<AssignmentEvent>>>) {
        init_log();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let config = ClientConfig::new("sdk-key", "https://flags.example.com")
            .assignment_logger(move |event: AssignmentEvent| sink.lock().unwrap().push(event));
        let provider = TestProvider::new(configuration);
        let client = Client::with_provider(config, Box::new(provider.clone()));
        (client, provider, events)
    }

    #[test]
    fn not_loaded_before_load() {
        let (client, _provider, _events) = logging_client(checkout_flow_configuration());

        let result =
            client.get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false);
        assert!(matches!(result, Err(Error::NotLoaded)));
    }

    #[test]
    fn load_is_idempotent_unless_forced() {
        let (client, provider, _events) = logging_client(checkout_flow_configuration());

        client.load(false).unwrap();
        client.load(false).unwrap();
        assert_eq!(provider.fetch_count.load(Ordering::SeqCst), 1);

        client.load(true).unwrap();
        assert_eq!(provider.fetch_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_load_rolls_back_and_allows_retry() {
        let (client, provider, _events) = logging_client(checkout_flow_configuration());
        provider.fail.store(true, Ordering::SeqCst);

        assert!(client.load(false).is_err());
        assert!(matches!(
            client.get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false),
            Err(Error::NotLoaded)
        ));

        provider.fail.store(false, Ordering::SeqCst);
        client.load(false).unwrap();
        assert_eq!(provider.fetch_count.load(Ordering::SeqCst), 2);
        assert_eq!(
            client
                .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
                .unwrap(),
            true
        );
    }

    #[test]
    fn failed_reload_keeps_serving_previous_snapshot() {
        let (client, provider, _events) = logging_client(checkout_flow_configuration());
        client.load(false).unwrap();

        provider.fail.store(true, Ordering::SeqCst);
        assert!(client.load(true).is_err());

        assert_eq!(
            client
                .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
                .unwrap(),
            true
        );
    }

    #[test]
    fn full_rollout_assigns_and_logs_once() {
        let (client, _provider, events) = logging_client(checkout_flow_configuration());
        client.load(false).unwrap();

        let result = client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();
        assert_eq!(result, true);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].feature_flag, "checkout-flow");
        assert_eq!(events[0].allocation, "rollout");
        assert_eq!(events[0].variation, "true");
        assert_eq!(events[0].subject, "user-42");
        assert_eq!(
            events[0].meta_data.get("sdkName").map(String::as_str),
            Some("flaglet")
        );
        assert_eq!(
            events[0].meta_data.get("obfuscated").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn repeated_decision_is_logged_once_with_cache() {
        let (client, _provider, events) = logging_client(checkout_flow_configuration());
        client.load(false).unwrap();

        client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();
        client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();

        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn repeated_decision_is_logged_twice_without_cache() {
        init_log();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let config = ClientConfig::new("sdk-key", "https://flags.example.com")
            .assignment_logger(move |event: AssignmentEvent| sink.lock().unwrap().push(event))
            .no_assignment_cache();
        let provider = TestProvider::new(checkout_flow_configuration());
        let client = Client::with_provider(config, Box::new(provider));
        client.load(false).unwrap();

        client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();
        client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();

        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn reverted_decision_is_logged_again() {
        let (client, provider, events) = logging_client(checkout_flow_configuration());
        client.load(false).unwrap();
        client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();

        // Same flag, different variation wins after a reconfiguration.
        let mut other = checkout_flow_configuration();
        if let Some(TryParse::Parsed(flag)) = other.flags.get_mut("checkout-flow") {
            flag.variations.insert(
                "false".to_owned(),
                Variation {
                    key: "false".to_owned(),
                    value: false.into(),
                },
            );
            flag.allocations[0].splits[0].variation_key = "false".to_owned();
        }
        *provider.configuration.lock().unwrap() = other;
        client.load(true).unwrap();
        client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), true)
            .unwrap();

        // And back to the original variation.
        *provider.configuration.lock().unwrap() = checkout_flow_configuration();
        client.load(true).unwrap();
        client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();

        assert_eq!(events.lock().unwrap().len(), 3);
    }

    #[test]
    fn declared_type_mismatch_is_raised_before_evaluation() {
        let (client, _provider, events) = logging_client(checkout_flow_configuration());
        client.load(false).unwrap();

        let result = client.get_string_assignment(
            "checkout-flow",
            "user-42",
            &HashMap::new(),
            "fallback".to_owned(),
        );
        assert!(matches!(
            result,
            Err(Error::DeclaredTypeMismatch {
                expected: VariationType::String,
                found: VariationType::Boolean,
            })
        ));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn actual_value_type_mismatch_is_raised_after_evaluation() {
        let flag = flag(
            "rollout-percent",
            VariationType::Integer,
            Variation {
                key: "true".to_owned(),
                value: 1.5.into(),
            },
        );
        let configuration = FlagsConfiguration {
            flags: [("rollout-percent".to_owned(), TryParse::Parsed(flag))].into(),
        };
        let (client, _provider, _events) = logging_client(configuration);
        client.load(false).unwrap();

        let result = client.get_integer_assignment("rollout-percent", "user-42", &HashMap::new(), 0);
        assert!(matches!(
            result,
            Err(Error::ActualValueTypeMismatch {
                expected: VariationType::Integer,
            })
        ));
    }

    #[test]
    fn unknown_flag_is_an_error_not_a_default() {
        let (client, _provider, _events) = logging_client(checkout_flow_configuration());
        client.load(false).unwrap();

        let result = client.get_boolean_assignment("does-not-exist", "user-42", &HashMap::new(), false);
        assert!(
            matches!(result, Err(Error::FlagConfigNotFound { flag_key }) if flag_key == "does-not-exist")
        );
    }

    #[test]
    fn empty_inputs_fail_fast() {
        let config = ClientConfig::new("", "https://flags.example.com");
        let provider = TestProvider::new(checkout_flow_configuration());
        let client = Client::with_provider(config, Box::new(provider));
        client.load(false).unwrap();

        assert!(matches!(
            client.get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false),
            Err(Error::InvalidSdkKey)
        ));

        let config = ClientConfig::new("sdk-key", "");
        let provider = TestProvider::new(checkout_flow_configuration());
        let client = Client::with_provider(config, Box::new(provider));
        client.load(false).unwrap();

        assert!(matches!(
            client.get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false),
            Err(Error::InvalidHost)
        ));

        let (client, _provider, _events) = logging_client(checkout_flow_configuration());
        client.load(false).unwrap();
        assert!(matches!(
            client.get_boolean_assignment("checkout-flow", "", &HashMap::new(), false),
            Err(Error::MissingSubjectKey)
        ));
        assert!(matches!(
            client.get_boolean_assignment("", "user-42", &HashMap::new(), false),
            Err(Error::MissingFlagKey)
        ));
    }

    #[test]
    fn unmatched_subject_gets_the_default_without_logging() {
        let mut configuration = checkout_flow_configuration();
        if let Some(TryParse::Parsed(flag)) = configuration.flags.get_mut("checkout-flow") {
            flag.allocations.clear();
        }
        let (client, _provider, events) = logging_client(configuration);
        client.load(false).unwrap();

        let result = client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();
        assert_eq!(result, false);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn obfuscated_lookup_uses_hashed_flag_keys() {
        init_log();
        // md5("checkout-flow") = 689bb38a0345a57fcd70e6c4ef06d069
        let flag = flag(
            "689bb38a0345a57fcd70e6c4ef06d069",
            VariationType::Boolean,
            Variation {
                key: "true".to_owned(),
                value: true.into(),
            },
        );
        let configuration = FlagsConfiguration {
            flags: [(
                "689bb38a0345a57fcd70e6c4ef06d069".to_owned(),
                TryParse::Parsed(flag),
            )]
            .into(),
        };

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let config = ClientConfig::new("sdk-key", "https://flags.example.com")
            .obfuscated(true)
            .assignment_logger(move |event: AssignmentEvent| sink.lock().unwrap().push(event));
        let provider = TestProvider::new(configuration);
        let client = Client::with_provider(config, Box::new(provider));
        client.load(false).unwrap();

        let result = client
            .get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false)
            .unwrap();
        assert_eq!(result, true);

        // Events carry the caller-visible flag key, not the hashed one.
        let events = events.lock().unwrap();
        assert_eq!(events[0].feature_flag, "checkout-flow");
        assert_eq!(
            events[0].meta_data.get("obfuscated").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn parse_failed_flag_surfaces_a_parse_error() {
        let configuration = FlagsConfiguration {
            flags: [(
                "checkout-flow".to_owned(),
                TryParse::ParseFailed(serde_json::json!({"variationType": "NEW_TYPE"})),
            )]
            .into(),
        };
        let (client, _provider, _events) = logging_client(configuration);
        client.load(false).unwrap();

        assert!(matches!(
            client.get_boolean_assignment("checkout-flow", "user-42", &HashMap::new(), false),
            Err(Error::ConfigurationParseError)
        ));
    }
}
