//! Path search behind `check`
//!
//! A principal holds `target` iff some directly assigned item reaches it over
//! child edges and every rule on that path (both ends included) passes. The
//! search is a depth-first walk from each assignment. A node's rule result
//! depends only on the node, so each rule runs at most once per search and a
//! node whose subtree was exhausted is never walked again.

use crate::error::{AuthzError, Result};
use crate::rules::{RuleContext, RuleEvaluator};
use crate::store::Snapshot;
use crate::types::{ItemName, Params};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub(crate) struct PathSearch<'a> {
    snapshot: &'a Snapshot,
    rules: &'a RuleEvaluator,
    principal: &'a str,
    target: &'a str,
    params: &'a Params,
    anonymous: bool,

    /// Rule outcome per evaluated node
    passed: HashMap<&'a str, bool>,

    /// Nodes whose subtree holds no satisfying path
    exhausted: HashSet<&'a str>,
}

impl<'a> PathSearch<'a> {
    pub(crate) fn new(
        snapshot: &'a Snapshot,
        rules: &'a RuleEvaluator,
        principal: &'a str,
        target: &'a str,
        params: &'a Params,
        anonymous: bool,
    ) -> Self {
        Self {
            snapshot,
            rules,
            principal,
            target,
            params,
            anonymous,
            passed: HashMap::new(),
            exhausted: HashSet::new(),
        }
    }

    /// First satisfying path `[assigned, …, target]`, if any
    pub(crate) fn run(mut self) -> Result<Option<Vec<ItemName>>> {
        let snapshot = self.snapshot;
        if !snapshot.graph.contains(self.target) {
            return Err(AuthzError::NotFound(self.target.to_string()));
        }

        let Some(assigned) = snapshot.assignments.items_of(self.principal) else {
            debug!("Principal '{}' has no assignments", self.principal);
            return Ok(None);
        };

        for start in assigned {
            // Assignments always name existing items; skip defensively if not
            if !snapshot.graph.contains(start) {
                continue;
            }
            if let Some(path) = self.visit(start) {
                return Ok(Some(path.into_iter().map(str::to_string).collect()));
            }
        }

        Ok(None)
    }

    /// Depth-first walk from `start` with an explicit frame stack
    ///
    /// `path` holds the nodes entered so far; `frontier[i]` holds the children
    /// of `path[i]` still to be tried, in reverse so `pop` yields them sorted.
    fn visit(&mut self, start: &'a str) -> Option<Vec<&'a str>> {
        if self.exhausted.contains(start) || !self.rule_passes(start) {
            return None;
        }
        if start == self.target {
            return Some(vec![start]);
        }

        let mut path: Vec<&'a str> = vec![start];
        let mut frontier: Vec<Vec<&'a str>> = vec![self.pending_children(start)];

        while let Some(pending) = frontier.last_mut() {
            let Some(next) = pending.pop() else {
                frontier.pop();
                if let Some(done) = path.pop() {
                    self.exhausted.insert(done);
                }
                continue;
            };

            if self.exhausted.contains(next) || !self.rule_passes(next) {
                continue;
            }

            path.push(next);
            if next == self.target {
                return Some(path);
            }
            frontier.push(self.pending_children(next));
        }

        None
    }

    fn pending_children(&self, node: &'a str) -> Vec<&'a str> {
        let snapshot = self.snapshot;
        let mut children: Vec<&'a str> = snapshot.graph.children(node).collect();
        children.reverse();
        children
    }

    fn rule_passes(&mut self, node: &'a str) -> bool {
        if let Some(passed) = self.passed.get(node) {
            return *passed;
        }

        let passed = match self.snapshot.graph.get(node) {
            Some(item) => {
                let ctx = RuleContext {
                    principal: self.principal,
                    item,
                    params: self.params,
                    anonymous: self.anonymous,
                };
                self.rules.evaluate(item.rule.as_deref(), &ctx)
            }
            None => false,
        };

        if !passed {
            debug!(
                "Rule on '{}' rejected principal '{}'",
                node, self.principal
            );
        }
        self.passed.insert(node, passed);
        passed
    }
}
