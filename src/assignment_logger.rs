//! Delivery of assignment decisions to the application's analytics storage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Attributes;

/// A single assignment decision, as delivered to the analytics sink.
///
/// Created fresh per qualifying evaluation and never mutated after construction; the logger
/// callback owns it once passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    /// The key of the feature flag being assigned, as supplied by the caller.
    pub feature_flag: String,
    /// The key of the allocation the subject was assigned to.
    pub allocation: String,
    /// The key of the experiment associated with the assignment.
    pub experiment: String,
    /// The key of the variation assigned to the subject.
    pub variation: String,
    /// The key identifying the subject receiving the assignment.
    pub subject: String,
    /// Custom attributes of the subject relevant to the assignment.
    pub subject_attributes: Attributes,
    /// RFC 3339 timestamp of the evaluation.
    pub timestamp: String,
    /// Additional metadata. Contains at least `sdkName`, `sdkVersion`, and `obfuscated`.
    pub meta_data: HashMap<String, String>,
    /// Additional user-defined logging fields for capturing extra information related to the
    /// assignment.
    #[serde(flatten)]
    pub extra_logging: HashMap<String, String>,
}

/// Callback that receives assignment events for delivery to analytics storage.
///
/// Invoked synchronously on the evaluating thread. The core never retries a failed delivery,
/// and a failing logger never fails an assignment lookup that otherwise succeeded.
pub trait AssignmentLogger {
    /// Deliver one assignment event.
    fn log_assignment(&self, event: AssignmentEvent);
}

pub(crate) struct NoopAssignmentLogger;
impl AssignmentLogger for NoopAssignmentLogger {
    fn log_assignment(&self, _event: AssignmentEvent) {}
}

impl<T: Fn(AssignmentEvent)> AssignmentLogger for T {
    fn log_assignment(&self, event: AssignmentEvent) {
        self(event);
    }
}
