use derive_more::From;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{RequestContext, TargetingPredicate, TargetingPredicateResult};

/// A declarative targeting predicate over request attributes.
///
/// Rules are usually deserialized from configuration but can be built directly:
///
/// ```
/// # use ad_selection::{Operator, RequestAttribute, RulePredicate};
/// let rule = RulePredicate::new(
///     RequestAttribute::MarketplaceId,
///     Operator::OneOf,
///     vec!["us".to_owned(), "ca".to_owned()],
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePredicate {
    attribute: RequestAttribute,
    operator: Operator,
    value: RuleValue,
}

impl RulePredicate {
    /// Create a rule applying `operator` to `attribute` and `value`.
    pub fn new(attribute: RequestAttribute, operator: Operator, value: impl Into<RuleValue>) -> Self {
        RulePredicate {
            attribute,
            operator,
            value: value.into(),
        }
    }
}

impl TargetingPredicate for RulePredicate {
    fn evaluate(&self, request: &RequestContext) -> TargetingPredicateResult {
        let attribute = self.attribute.get(request);
        match self.operator.try_eval(attribute, &self.value) {
            Some(result) => result.into(),
            None => {
                log::debug!(target: "ad_selection",
                            attribute:serde = self.attribute,
                            operator:serde = self.operator;
                            "rule cannot be applied, evaluating as indeterminate");
                TargetingPredicateResult::Indeterminate
            }
        }
    }
}

/// Request attribute a rule is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestAttribute {
    /// [`RequestContext::customer_id`].
    CustomerId,
    /// [`RequestContext::marketplace_id`].
    MarketplaceId,
}

impl RequestAttribute {
    fn get(self, request: &RequestContext) -> &str {
        match self {
            Self::CustomerId => request.customer_id(),
            Self::MarketplaceId => request.marketplace_id(),
        }
    }
}

/// Value a rule compares the attribute with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum RuleValue {
    /// List of values, for `ONE_OF` and `NOT_ONE_OF`.
    Multiple(Vec<String>),
    /// Regular expression, for `MATCHES` and `NOT_MATCHES`.
    Single(String),
    /// Expected emptiness, for `IS_EMPTY`.
    Flag(bool),
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

/// Comparison applied by a rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Attribute matches the regular expression.
    Matches,
    /// Attribute does not match the regular expression.
    NotMatches,
    /// Attribute is one of the listed values.
    OneOf,
    /// Attribute is none of the listed values.
    NotOneOf,
    /// Attribute is empty (`true`) or not empty (`false`).
    IsEmpty,
}

impl Operator {
    /// Try applying `Operator` to the values, returning `None` if the operator cannot be applied
    /// (invalid regex or a value of the wrong shape).
    fn try_eval(&self, attribute: &str, value: &RuleValue) -> Option<bool> {
        match self {
            Self::Matches | Self::NotMatches => {
                let regex = match value {
                    RuleValue::Single(s) => Regex::new(s).ok()?,
                    _ => return None,
                };
                let matches = regex.is_match(attribute);
                Some(if *self == Self::Matches {
                    matches
                } else {
                    !matches
                })
            }

            Self::OneOf | Self::NotOneOf => {
                let values = match value {
                    RuleValue::Multiple(v) => v,
                    _ => return None,
                };
                let is_one_of = values.iter().any(|v| v == attribute);
                Some(if *self == Self::OneOf {
                    is_one_of
                } else {
                    !is_one_of
                })
            }

            Self::IsEmpty => match value {
                RuleValue::Flag(expect_empty) => Some(attribute.is_empty() == *expect_empty),
                _ => None,
            },
        }
    }
}
