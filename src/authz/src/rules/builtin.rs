//! Built-in business rules

use super::error::{Result, RuleError};
use super::{BusinessRule, RuleContext};
use serde_json::Value;

/// Kind name of [`AlwaysAllow`]
pub const ALWAYS_ALLOW: &str = "always_allow";

/// Kind name of [`NotGuest`]
pub const NOT_GUEST: &str = "not_guest";

/// Default rule: never vetoes a path
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllow;

impl BusinessRule for AlwaysAllow {
    fn evaluate(&self, _ctx: &RuleContext<'_>) -> Result<bool> {
        Ok(true)
    }
}

/// Passes only for an authenticated (non-anonymous) identity
///
/// Typically attached to a `user` role sitting between privileged roles and
/// the `guest` role, so guests keep only what is granted below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotGuest;

impl BusinessRule for NotGuest {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<bool> {
        Ok(!ctx.anonymous)
    }
}

/// Passes when the params bag holds `expected` under `key`
///
/// A missing key is an error, which the evaluator turns into `false`.
///
/// ```
/// use rolegate_authz::rules::ParamEquals;
/// use serde_json::json;
///
/// let rule = ParamEquals::new("flag", json!(true));
/// assert_eq!(rule.key(), "flag");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEquals {
    key: String,
    expected: Value,
}

impl ParamEquals {
    pub fn new(key: impl Into<String>, expected: Value) -> Self {
        Self {
            key: key.into(),
            expected,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl BusinessRule for ParamEquals {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<bool> {
        let value = ctx
            .params
            .get(&self.key)
            .ok_or_else(|| RuleError::MissingParam(self.key.clone()))?;

        Ok(*value == self.expected)
    }
}
