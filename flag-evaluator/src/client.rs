use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::capture::{CaptureEvent, CaptureSink, ReportedFlags};
use crate::config::Config;
use crate::decide::{DecideRequest, DecideResponse, RemoteDecider};
use crate::definitions::{DefinitionStore, FlagDefinitions};
use crate::errors::{log_error_handler, ErrorHandler, FlagError};
use crate::flags::flag_matching::{EvaluationContext, FeatureFlagMatcher};
use crate::flags::flag_models::{FeatureFlag, FlagValue};
use crate::properties::property_matching::FlagMatchingError;

/// Client-wide defaults, the runtime subset of [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub max_reported_flags: u64,
    pub send_feature_flag_events: bool,
    pub disable_geoip: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            max_reported_flags: 50_000,
            send_feature_flag_events: true,
            disable_geoip: false,
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        ClientOptions {
            max_reported_flags: config.max_reported_flags,
            send_feature_flag_events: *config.send_feature_flag_events,
            disable_geoip: *config.disable_geoip,
        }
    }
}

/// Per-call switches. `None` means the client default.
#[derive(Debug, Clone, Default)]
pub struct FlagEvaluationOptions {
    pub only_evaluate_locally: bool,
    pub send_feature_flag_events: Option<bool>,
    pub disable_geoip: Option<bool>,
}

impl FlagEvaluationOptions {
    pub fn local_only() -> Self {
        FlagEvaluationOptions {
            only_evaluate_locally: true,
            ..Default::default()
        }
    }
}

pub type FlagsAndPayloads = DecideResponse;

pub struct FlagsClient {
    definitions: Arc<DefinitionStore>,
    decider: Option<Arc<dyn RemoteDecider>>,
    capture_sink: Option<Arc<dyn CaptureSink>>,
    reported_flags: ReportedFlags,
    options: ClientOptions,
    on_error: ErrorHandler,
}

impl FlagsClient {
    pub fn new(definitions: Arc<DefinitionStore>, options: ClientOptions) -> Self {
        FlagsClient {
            definitions,
            decider: None,
            capture_sink: None,
            reported_flags: ReportedFlags::new(options.max_reported_flags),
            options,
            on_error: log_error_handler(),
        }
    }

    pub fn with_decider(mut self, decider: Arc<dyn RemoteDecider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn with_capture_sink(mut self, capture_sink: Arc<dyn CaptureSink>) -> Self {
        self.capture_sink = Some(capture_sink);
        self
    }

    pub fn with_error_handler(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn definitions(&self) -> Arc<DefinitionStore> {
        self.definitions.clone()
    }

    pub fn reported_flags(&self) -> &ReportedFlags {
        &self.reported_flags
    }

    /// Returns the flag value: `false`, `true` or a variant key. `None` when it can't be
    /// decided, i.e. local evaluation was inconclusive and the remote wasn't (or couldn't be) asked.
    #[instrument(skip_all, fields(flag_key = %key, distinct_id = %context.distinct_id))]
    pub async fn get_feature_flag(
        &self,
        key: &str,
        context: &EvaluationContext,
        options: &FlagEvaluationOptions,
    ) -> Option<FlagValue> {
        let definitions = self.snapshot();
        let mut response = None;

        if let Some(flag) = definitions.get_flag(key) {
            match compute_flag_locally(flag, context, &definitions) {
                Ok(value) => {
                    tracing::debug!("Successfully computed flag locally: {} -> {}", key, value);
                    response = Some(value);
                }
                Err(e) => {
                    tracing::debug!("Failed to compute flag {} locally: {}", key, e);
                }
            }
        }

        let locally_evaluated = response.is_some();

        if response.is_none() && !options.only_evaluate_locally {
            if let Some(decide) = self.decide(context, options).await {
                // the remote not knowing the flag means it's off
                response = Some(
                    decide
                        .feature_flags
                        .get(key)
                        .cloned()
                        .unwrap_or(FlagValue::Boolean(false)),
                );
                tracing::debug!("Successfully computed flag remotely: {:?}", response);
            }
        }

        if let Some(value) = &response {
            self.capture_flag_called(key, value, locally_evaluated, context, options)
                .await;
        }

        response
    }

    /// Any variant counts as enabled.
    pub async fn feature_enabled(
        &self,
        key: &str,
        context: &EvaluationContext,
        options: &FlagEvaluationOptions,
    ) -> Option<bool> {
        self.get_feature_flag(key, context, options)
            .await
            .map(|value| value.is_enabled())
    }

    /// Returns the payload attached to the flag value `match_value`, computing the value locally
    /// (without capturing) when it isn't given.
    #[instrument(skip_all, fields(flag_key = %key, distinct_id = %context.distinct_id))]
    pub async fn get_feature_flag_payload(
        &self,
        key: &str,
        context: &EvaluationContext,
        match_value: Option<FlagValue>,
        options: &FlagEvaluationOptions,
    ) -> Option<Value> {
        let match_value = match match_value {
            Some(value) => Some(value),
            None => {
                let local_options = FlagEvaluationOptions {
                    only_evaluate_locally: true,
                    send_feature_flag_events: Some(false),
                    disable_geoip: options.disable_geoip,
                };
                self.get_feature_flag(key, context, &local_options).await
            }
        };

        let definitions = self.definitions.snapshot();
        let mut payload = match_value.as_ref().and_then(|value| {
            definitions
                .get_flag(key)
                .and_then(|flag| flag.get_payload(value))
                .cloned()
        });

        if payload.is_none() && !options.only_evaluate_locally {
            if let Some(mut decide) = self.decide(context, options).await {
                payload = decide.feature_flag_payloads.remove(key);
            }
        }

        payload
    }

    pub async fn get_all_flags(
        &self,
        context: &EvaluationContext,
        options: &FlagEvaluationOptions,
    ) -> HashMap<String, FlagValue> {
        self.get_all_flags_and_payloads(context, options)
            .await
            .feature_flags
    }

    /// Evaluates every known flag. If any of them is inconclusive (or none are known), the
    /// remote answer replaces the local one as a whole. No events are captured.
    #[instrument(skip_all, fields(distinct_id = %context.distinct_id))]
    pub async fn get_all_flags_and_payloads(
        &self,
        context: &EvaluationContext,
        options: &FlagEvaluationOptions,
    ) -> FlagsAndPayloads {
        let definitions = self.snapshot();
        let (local, fallback_to_remote) = compute_all_flags_locally(context, &definitions);

        if fallback_to_remote && !options.only_evaluate_locally {
            if let Some(remote) = self.decide(context, options).await {
                return remote;
            }
        }

        local
    }

    async fn decide(
        &self,
        context: &EvaluationContext,
        options: &FlagEvaluationOptions,
    ) -> Option<DecideResponse> {
        let Some(decider) = &self.decider else {
            tracing::debug!("No remote decider configured, can't fall back");
            return None;
        };

        let request = DecideRequest::from_context(context, self.disable_geoip(options));
        match decider.decide(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                (self.on_error)(&e);
                None
            }
        }
    }

    async fn capture_flag_called(
        &self,
        key: &str,
        value: &FlagValue,
        locally_evaluated: bool,
        context: &EvaluationContext,
        options: &FlagEvaluationOptions,
    ) {
        let send_events = options
            .send_feature_flag_events
            .unwrap_or(self.options.send_feature_flag_events);
        if !send_events {
            return;
        }

        let Some(sink) = &self.capture_sink else {
            return;
        };

        if !self.reported_flags.first_report(&context.distinct_id, key) {
            return;
        }

        let event = CaptureEvent::feature_flag_called(
            &context.distinct_id,
            key,
            value,
            locally_evaluated,
            &context.groups,
            self.disable_geoip(options),
        );
        if let Err(e) = sink.capture(event).await {
            // not delivered, so the next call for this pair tries again
            self.reported_flags.forget(&context.distinct_id, key);
            (self.on_error)(&e);
        }
    }

    /// The current snapshot. Before the first load it's empty, which is reported since every
    /// flag will be undecided locally.
    fn snapshot(&self) -> Arc<FlagDefinitions> {
        if !self.definitions.is_loaded() {
            (self.on_error)(&FlagError::DefinitionsUnavailable);
        }
        self.definitions.snapshot()
    }

    fn disable_geoip(&self, options: &FlagEvaluationOptions) -> bool {
        options.disable_geoip.unwrap_or(self.options.disable_geoip)
    }
}

pub fn compute_flag_locally(
    flag: &FeatureFlag,
    context: &EvaluationContext,
    definitions: &FlagDefinitions,
) -> Result<FlagValue, FlagMatchingError> {
    let flag_match =
        FeatureFlagMatcher::new(context, &definitions.group_type_mapping, &definitions.cohorts)
            .get_match(flag)?;
    tracing::debug!(
        "Flag {} matched locally with reason {} (condition {:?})",
        flag.key,
        flag_match.reason,
        flag_match.condition_index
    );
    Ok(flag_match.get_flag_value())
}

/// Returns the local flags and payloads, and whether the remote should be asked instead.
pub fn compute_all_flags_locally(
    context: &EvaluationContext,
    definitions: &FlagDefinitions,
) -> (FlagsAndPayloads, bool) {
    let mut result = FlagsAndPayloads::default();

    if definitions.is_empty() {
        return (result, true);
    }

    let mut fallback_to_remote = false;
    for flag in &definitions.flags {
        match compute_flag_locally(flag, context, definitions) {
            Ok(value) => {
                if let Some(payload) = flag.get_payload(&value) {
                    result
                        .feature_flag_payloads
                        .insert(flag.key.clone(), payload.clone());
                }
                result.feature_flags.insert(flag.key.clone(), value);
            }
            Err(e) => {
                tracing::debug!("Failed to compute flag {} locally: {}", flag.key, e);
                fallback_to_remote = true;
            }
        }
    }

    (result, fallback_to_remote)
}
