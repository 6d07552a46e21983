//! Pure flag evaluation.
//!
//! [`evaluate_flag`] combines a flag configuration entry, subject key and attributes, and a
//! [`Sharder`] into a [`FlagEvaluation`]. It has no side effects and no awareness of caching
//! or logging; the client layers those on top.

use std::collections::HashMap;

use crate::{
    flags::{Allocation, Flag, Shard, Split, Timestamp, Variation},
    sharder::Sharder,
    Attributes,
};

/// Transient result of evaluating one flag for one subject.
#[derive(Debug, Clone)]
pub struct FlagEvaluation {
    /// The selected variation, or `None` if the subject didn't qualify for any allocation.
    pub variation: Option<Variation>,
    /// Key of the allocation the variation came from.
    pub allocation_key: Option<String>,
    /// Whether this decision should be logged to the analytics sink.
    pub do_log: bool,
    /// Opaque analytics enrichment supplied by the matched split.
    pub extra_logging: HashMap<String, String>,
}

impl FlagEvaluation {
    fn none() -> FlagEvaluation {
        FlagEvaluation {
            variation: None,
            allocation_key: None,
            do_log: false,
            extra_logging: HashMap::new(),
        }
    }
}

/// Evaluate `flag` for the given subject.
///
/// Walks the flag's allocations in declared order and selects the first one whose time window
/// and rules are satisfied; within it, the sharder buckets the subject into the allocation's
/// shard space to pick a variation. First match wins; there is no overlap resolution.
///
/// `obfuscated` signals that the configuration was fetched in obfuscated form, so rule
/// comparisons must normalize the subject side the same way (see [`crate::rules`]).
pub fn evaluate_flag(
    flag: &Flag,
    subject_key: &str,
    subject_attributes: &Attributes,
    sharder: &impl Sharder,
    obfuscated: bool,
    now: Timestamp,
) -> FlagEvaluation {
    if !flag.enabled {
        return FlagEvaluation::none();
    }

    // Augmenting subject_attributes with id, so that subject_key can be used in the rules.
    let augmented_subject_attributes = {
        let mut sa = subject_attributes.clone();
        sa.entry("id".into()).or_insert_with(|| subject_key.into());
        sa
    };

    let Some((allocation, split)) = flag.allocations.iter().find_map(|allocation| {
        allocation
            .get_matching_split(
                subject_key,
                &augmented_subject_attributes,
                sharder,
                flag.total_shards,
                obfuscated,
                now,
            )
            .map(|split| (allocation, split))
    }) else {
        return FlagEvaluation::none();
    };

    let Some(variation) = flag.variations.get(&split.variation_key) else {
        log::warn!(target: "flaglet",
                   flag_key:display = flag.key,
                   subject_key,
                   variation_key:display = split.variation_key;
                   "internal: unable to find variation");
        return FlagEvaluation::none();
    };

    FlagEvaluation {
        variation: Some(variation.clone()),
        allocation_key: Some(allocation.key.clone()),
        do_log: allocation.do_log,
        extra_logging: split.extra_logging.clone(),
    }
}

impl Allocation {
    fn get_matching_split(
        &self,
        subject_key: &str,
        augmented_subject_attributes: &Attributes,
        sharder: &impl Sharder,
        total_shards: u64,
        obfuscated: bool,
        now: Timestamp,
    ) -> Option<&Split> {
        if self.is_allowed_by_time(now)
            && self.is_allowed_by_rules(augmented_subject_attributes, obfuscated)
        {
            self.splits
                .iter()
                .find(|split| split.matches(subject_key, sharder, total_shards))
        } else {
            None
        }
    }

    fn is_allowed_by_time(&self, now: Timestamp) -> bool {
        let forbidden = matches!(self.start_at, Some(t) if now < t)
            || matches!(self.end_at, Some(t) if now > t);
        !forbidden
    }

    fn is_allowed_by_rules(
        &self,
        augmented_subject_attributes: &Attributes,
        obfuscated: bool,
    ) -> bool {
        self.rules.is_empty()
            || self
                .rules
                .iter()
                .any(|rule| rule.eval(augmented_subject_attributes, obfuscated))
    }
}

impl Split {
    /// Return `true` if `subject_key` matches the given split under the provided `sharder`.
    ///
    /// To match a split, subject must match all underlying shards.
    fn matches(&self, subject_key: &str, sharder: &impl Sharder, total_shards: u64) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.matches(subject_key, sharder, total_shards))
    }
}

impl Shard {
    /// Return `true` if `subject_key` matches the given shard under the provided `sharder`.
    fn matches(&self, subject_key: &str, sharder: &impl Sharder, total_shards: u64) -> bool {
        // A snapshot may carry an explicit zero shard total; no bucket exists then.
        if total_shards == 0 {
            return false;
        }
        let h = sharder.get_shard(format!("{}-{}", self.salt, subject_key), total_shards);
        self.ranges.iter().any(|range| range.contains(h))
    }
}
