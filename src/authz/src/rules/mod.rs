//! Business rules attached to items
//!
//! An item stores only the *kind name* of its rule. Kinds are registered on
//! the [`RuleEvaluator`] with a factory; the factory runs once per kind and the
//! instance is reused for every evaluation. Unknown kinds, rule errors and
//! panics all evaluate to `false` (fail-closed) and are logged.

pub mod builtin;
pub mod error;
pub mod identity;

pub use builtin::{AlwaysAllow, NotGuest, ParamEquals, ALWAYS_ALLOW, NOT_GUEST};
pub use error::{Result, RuleError};
pub use identity::{AnonymousIdentity, IdentityProvider, SessionIdentity};

use crate::types::{Item, Params};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Inputs available to a rule
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Principal being authorized
    pub principal: &'a str,

    /// Item whose rule is evaluated
    pub item: &'a Item,

    /// Parameter bag of the check, unmodified
    pub params: &'a Params,

    /// Whether the current identity is anonymous
    pub anonymous: bool,
}

/// Predicate gating an item
///
/// Rules must be pure: they never touch the graph or assignments.
pub trait BusinessRule: Send + Sync {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<bool>;
}

impl<F> BusinessRule for F
where
    F: Fn(&RuleContext<'_>) -> Result<bool> + Send + Sync,
{
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<bool> {
        self(ctx)
    }
}

/// Constructor for a rule kind
pub type RuleFactory = Arc<dyn Fn() -> Arc<dyn BusinessRule> + Send + Sync>;

/// A registered kind: its factory and the instance built from it
///
/// The instance lives in the same entry as the factory, so replacing a kind
/// drops both together and an instance can only come from its own factory.
struct RegisteredRule {
    factory: RuleFactory,
    instance: OnceCell<Arc<dyn BusinessRule>>,
}

impl RegisteredRule {
    fn new(factory: RuleFactory) -> Self {
        Self {
            factory,
            instance: OnceCell::new(),
        }
    }

    fn instance(&self) -> Arc<dyn BusinessRule> {
        self.instance.get_or_init(|| (self.factory)()).clone()
    }
}

/// Registry and dispatcher for business rules
pub struct RuleEvaluator {
    /// Registered rule kinds (thread-safe)
    rules: DashMap<String, Arc<RegisteredRule>>,
}

impl RuleEvaluator {
    /// Evaluator with the built-in `always_allow` and `not_guest` kinds
    pub fn new() -> Self {
        let evaluator = Self::empty();
        evaluator.register(ALWAYS_ALLOW, || AlwaysAllow);
        evaluator.register(NOT_GUEST, || NotGuest);
        evaluator
    }

    /// Evaluator without any registered kind
    pub fn empty() -> Self {
        Self {
            rules: DashMap::new(),
        }
    }

    /// Register (or replace) a rule kind
    pub fn register<R, F>(&self, kind: impl Into<String>, factory: F)
    where
        R: BusinessRule + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let factory: RuleFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn BusinessRule>);
        self.register_factory(kind, factory);
    }

    /// Register a type-erased factory
    pub fn register_factory(&self, kind: impl Into<String>, factory: RuleFactory) {
        let kind = kind.into();
        debug!("Registering business rule kind '{}'", kind);
        self.rules.insert(kind, Arc::new(RegisteredRule::new(factory)));
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.rules.contains_key(kind)
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.rules.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }

    /// Evaluate an item's rule; no rule means `true`
    ///
    /// Never fails: unknown kinds, rule errors and panics yield `false`.
    pub fn evaluate(&self, rule: Option<&str>, ctx: &RuleContext<'_>) -> bool {
        let Some(kind) = rule else {
            return true;
        };

        let Some(instance) = self.instance(kind) else {
            let e = RuleError::UnknownRule(kind.to_string());
            warn!("{} (item '{}'), denying", e, ctx.item.name);
            return false;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| instance.evaluate(ctx))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(
                    "Business rule '{}' on item '{}' failed for principal '{}': {}",
                    kind, ctx.item.name, ctx.principal, e
                );
                false
            }
            Err(payload) => {
                let e = RuleError::Panicked(panic_message(payload.as_ref()));
                warn!(
                    "Business rule '{}' on item '{}' failed for principal '{}': {}",
                    kind, ctx.item.name, ctx.principal, e
                );
                false
            }
        }
    }

    fn instance(&self, kind: &str) -> Option<Arc<dyn BusinessRule>> {
        // Clone the entry out so the factory never runs under a map shard lock
        let entry = self.rules.get(kind)?.value().clone();
        Some(entry.instance())
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
