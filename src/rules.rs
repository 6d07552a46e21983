//! Targeting rules for allocations.
//!
//! A rule matches when all of its conditions match. When the configuration was fetched in
//! obfuscated form, attribute names and set-membership values arrive md5-hashed and scalar
//! literals arrive base64-encoded; comparisons then normalize the subject side through the
//! same transformations before comparing.

use derive_more::From;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{attributes::AttributeValue, flags::Value, obfuscation, Attributes};

/// A list of conditions that must all be satisfied for an allocation to match.
#[derive(Debug, Serialize, Deserialize, From, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[allow(missing_docs)]
    pub conditions: Vec<Condition>,
}

impl Rule {
    pub(crate) fn eval(&self, attributes: &Attributes, obfuscated: bool) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(attributes, obfuscated))
    }
}

/// `Condition` is a check that given subject `attribute` matches the condition `value` under
/// the given `operator`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Condition {
    pub operator: Operator,
    pub attribute: String,
    pub value: ConditionValue,
}

impl Condition {
    pub(crate) fn eval(&self, attributes: &Attributes, obfuscated: bool) -> bool {
        let attribute = if obfuscated {
            // Attribute names in the configuration are hashed, subject attribute names are
            // not, so the subject side gets hashed for the lookup.
            attributes
                .iter()
                .find(|(name, _)| obfuscation::hex_md5(name) == self.attribute)
                .map(|(_, value)| value)
        } else {
            attributes.get(&self.attribute)
        };
        self.operator.eval(attribute, &self.value, obfuscated)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConditionValue {
    Multiple(Vec<Value>),
    Single(Value),
}

impl<T: Into<Value>> From<T> for ConditionValue {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl<T: Into<Value>> From<Vec<T>> for ConditionValue {
    fn from(value: Vec<T>) -> Self {
        Self::Multiple(value.into_iter().map(Into::into).collect())
    }
}

/// Possible condition operators.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Matches regex. Condition value must be a regex string.
    Matches,
    /// Regex does not match. Condition value must be a regex string.
    NotMatches,
    /// Greater than or equal. Attribute and condition value must either be numbers or semver
    /// strings.
    Gte,
    /// Greater than. Attribute and condition value must either be numbers or semver strings.
    Gt,
    /// Less than or equal. Attribute and condition value must either be numbers or semver
    /// strings.
    Lte,
    /// Less than. Attribute and condition value must either be numbers or semver strings.
    Lt,
    /// One of values. Condition value must be a list of strings. Match is case-sensitive.
    OneOf,
    /// Not one of values. Condition value must be a list of strings. Match is case-sensitive.
    ///
    /// Null/absent attributes fail this condition automatically. (i.e., `null NOT_ONE_OF
    /// ["hello"]` is `false`)
    NotOneOf,
    /// Null check.
    ///
    /// Condition value must be a boolean. If it's `true`, this is a null check. If it's
    /// `false`, this is a not null check.
    IsNull,
}

impl Operator {
    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied or
    /// there's a misconfiguration.
    pub(crate) fn eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
        obfuscated: bool,
    ) -> bool {
        self.try_eval(attribute, condition_value, obfuscated)
            .unwrap_or(false)
    }

    /// Try applying `Operator` to the values, returning `None` if the operator cannot be
    /// applied.
    fn try_eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
        obfuscated: bool,
    ) -> Option<bool> {
        match self {
            Self::Matches | Self::NotMatches => {
                let s = match attribute {
                    Some(AttributeValue::String(s)) => s,
                    _ => return None,
                };
                let pattern = match condition_value {
                    ConditionValue::Single(Value::String(s)) => {
                        if obfuscated {
                            obfuscation::decode_base64(s)?
                        } else {
                            s.clone()
                        }
                    }
                    _ => return None,
                };
                let regex = Regex::new(&pattern).ok()?;
                let matches = regex.is_match(s);
                Some(if matches!(self, Self::Matches) {
                    matches
                } else {
                    !matches
                })
            }

            Self::OneOf | Self::NotOneOf => {
                let s = match attribute {
                    Some(AttributeValue::String(s)) => s.clone(),
                    Some(AttributeValue::Number(n)) => n.to_string(),
                    Some(AttributeValue::Boolean(b)) => b.to_string(),
                    _ => return None,
                };
                // Obfuscated membership lists store digests, so the subject side gets hashed
                // before comparison.
                let s = if obfuscated { obfuscation::hex_md5(&s) } else { s };
                let values = match condition_value {
                    ConditionValue::Multiple(v) => v,
                    _ => return None,
                };
                let is_one_of = values
                    .iter()
                    .any(|v| matches!(v, Value::String(v) if v == &s));
                Some(if *self == Self::OneOf {
                    is_one_of
                } else {
                    !is_one_of
                })
            }

            Self::IsNull => {
                let is_null =
                    attribute.is_none() || attribute.is_some_and(|v| v == &AttributeValue::Null);
                let check_null = match condition_value {
                    ConditionValue::Single(Value::Boolean(b)) => *b,
                    ConditionValue::Single(Value::String(s)) if obfuscated => {
                        if *s == obfuscation::hex_md5("true") {
                            true
                        } else if *s == obfuscation::hex_md5("false") {
                            false
                        } else {
                            return None;
                        }
                    }
                    _ => return None,
                };
                Some(if check_null { is_null } else { !is_null })
            }

            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                let condition_string = match condition_value {
                    ConditionValue::Single(Value::String(s)) => Some(if obfuscated {
                        obfuscation::decode_base64(s)?
                    } else {
                        s.clone()
                    }),
                    _ => None,
                };

                let condition_version = condition_string
                    .as_deref()
                    .and_then(|s| Version::parse(s).ok());

                if let Some(condition_version) = condition_version {
                    // semver comparison

                    let attribute_version = match attribute {
                        Some(AttributeValue::String(s)) => Version::parse(s).ok(),
                        _ => None,
                    }?;

                    Some(match self {
                        Self::Gt => attribute_version > condition_version,
                        Self::Gte => attribute_version >= condition_version,
                        Self::Lt => attribute_version < condition_version,
                        Self::Lte => attribute_version <= condition_version,
                        _ => {
                            // unreachable
                            return None;
                        }
                    })
                } else {
                    // numeric comparison
                    let condition_number: f64 = match (&condition_string, condition_value) {
                        (Some(s), _) => s.parse().ok()?,
                        (None, ConditionValue::Single(Value::Number(n))) => *n,
                        _ => return None,
                    };

                    let attribute_number: f64 = match attribute {
                        Some(AttributeValue::Number(n)) => *n,
                        Some(AttributeValue::String(s)) => s.parse().ok()?,
                        _ => return None,
                    };

                    Some(match self {
                        Self::Gt => attribute_number > condition_number,
                        Self::Gte => attribute_number >= condition_number,
                        Self::Lt => attribute_number < condition_number,
                        Self::Lte => attribute_number <= condition_number,
                        _ => {
                            // unreachable
                            return None;
                        }
                    })
                }
            }
        }
    }
}
