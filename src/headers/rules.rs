//! Compiled header rules.
//!
//! # Responsibilities
//! - Validate a `RequestHeaderRule` (exactly one of `matching` / `named`)
//! - Compile `matching` patterns once, at configuration time
//! - Copy matching client headers (or a default) onto an outbound header map
//!
//! # Design Decisions
//! - Patterns are tested against the canonical `Title-Case` header name, the
//!   form configuration authors write, with an unanchored search
//! - Hop-by-hop and transport-managed headers are never matched, nor are
//!   headers the client nominated in its `Connection` header

use std::fmt;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderName, InvalidHeaderValue};
use regex::Regex;
use thiserror::Error;

use crate::config::schema::{HeaderOperation, RequestHeaderRule};
use crate::security::headers::{is_hop_by_hop, is_transport_managed};

/// Which rule chain a rule belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    All,
    Subgraph(String),
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::All => write!(f, "all"),
            RuleScope::Subgraph(name) => write!(f, "subgraph `{}`", name),
        }
    }
}

/// Errors raised while compiling header rules.
#[derive(Debug, Error)]
pub enum HeaderRuleError {
    #[error("header rule #{index} ({scope}): `matching` and `named` are mutually exclusive")]
    AmbiguousMatcher { scope: RuleScope, index: usize },

    #[error("header rule #{index} ({scope}): one of `matching` or `named` is required")]
    MissingMatcher { scope: RuleScope, index: usize },

    #[error("header rule #{index} ({scope}): invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        scope: RuleScope,
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("header rule #{index} ({scope}): invalid header name `{name}`")]
    InvalidName {
        scope: RuleScope,
        index: usize,
        name: String,
        #[source]
        source: InvalidHeaderName,
    },

    #[error("header rule #{index} ({scope}): invalid default value")]
    InvalidDefault {
        scope: RuleScope,
        index: usize,
        #[source]
        source: InvalidHeaderValue,
    },
}

#[derive(Debug, Clone)]
enum HeaderMatcher {
    Named(HeaderName),
    Matching(Regex),
}

/// A validated, immutable header rule.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    op: HeaderOperation,
    matcher: HeaderMatcher,
    default: Option<HeaderValue>,
}

impl CompiledRule {
    /// Compile the rule at position `index` of the chain identified by `scope`.
    pub fn compile(
        scope: &RuleScope,
        index: usize,
        rule: &RequestHeaderRule,
    ) -> Result<Self, HeaderRuleError> {
        let matching = rule.matching.as_deref().filter(|p| !p.is_empty());
        let named = rule.named.as_deref().filter(|n| !n.is_empty());

        let matcher = match (matching, named) {
            (Some(_), Some(_)) => {
                return Err(HeaderRuleError::AmbiguousMatcher {
                    scope: scope.clone(),
                    index,
                })
            }
            (None, None) => {
                return Err(HeaderRuleError::MissingMatcher {
                    scope: scope.clone(),
                    index,
                })
            }
            (Some(pattern), None) => {
                let regex = Regex::new(pattern).map_err(|source| HeaderRuleError::InvalidPattern {
                    scope: scope.clone(),
                    index,
                    pattern: pattern.to_string(),
                    source,
                })?;
                HeaderMatcher::Matching(regex)
            }
            (None, Some(name)) => {
                let name = HeaderName::try_from(name).map_err(|source| HeaderRuleError::InvalidName {
                    scope: scope.clone(),
                    index,
                    name: name.to_string(),
                    source,
                })?;
                HeaderMatcher::Named(name)
            }
        };

        let default = match rule.default.as_deref().filter(|d| !d.is_empty()) {
            None => None,
            Some(_) if matches!(matcher, HeaderMatcher::Matching(_)) => {
                tracing::warn!(
                    scope = %scope,
                    index,
                    "Ignoring `default` on a `matching` header rule"
                );
                None
            }
            Some(value) => Some(HeaderValue::try_from(value).map_err(|source| {
                HeaderRuleError::InvalidDefault {
                    scope: scope.clone(),
                    index,
                    source,
                }
            })?),
        };

        Ok(Self {
            op: rule.op,
            matcher,
            default,
        })
    }

    /// Apply the rule, reading from `inbound` and writing to `outbound`.
    /// Names in `connection_scoped` are treated as absent from `inbound`.
    pub fn apply(
        &self,
        inbound: &HeaderMap,
        connection_scoped: &[HeaderName],
        outbound: &mut HeaderMap,
    ) {
        match self.op {
            HeaderOperation::Propagate => self.propagate(inbound, connection_scoped, outbound),
        }
    }

    fn propagate(
        &self,
        inbound: &HeaderMap,
        connection_scoped: &[HeaderName],
        outbound: &mut HeaderMap,
    ) {
        match &self.matcher {
            HeaderMatcher::Named(name) => {
                if !is_propagatable(name) {
                    return;
                }
                if inbound.contains_key(name) && !connection_scoped.contains(name) {
                    copy_values(name, inbound, outbound);
                } else if let Some(default) = &self.default {
                    if !outbound.contains_key(name) {
                        outbound.insert(name.clone(), default.clone());
                    }
                }
            }
            HeaderMatcher::Matching(regex) => {
                for name in inbound.keys() {
                    if is_propagatable(name)
                        && !connection_scoped.contains(name)
                        && regex.is_match(&canonical_name(name))
                    {
                        copy_values(name, inbound, outbound);
                    }
                }
            }
        }
    }
}

fn is_propagatable(name: &HeaderName) -> bool {
    !is_hop_by_hop(name) && !is_transport_managed(name)
}

/// Replace any values already set for `name` with every inbound value.
fn copy_values(name: &HeaderName, inbound: &HeaderMap, outbound: &mut HeaderMap) {
    outbound.remove(name);
    for value in inbound.get_all(name) {
        outbound.append(name.clone(), value.clone());
    }
}

/// `x-request-id` → `X-Request-Id`.
pub fn canonical_name(name: &HeaderName) -> String {
    let mut canonical = String::with_capacity(name.as_str().len());
    let mut upper = true;
    for c in name.as_str().chars() {
        if upper {
            canonical.push(c.to_ascii_uppercase());
        } else {
            canonical.push(c);
        }
        upper = c == '-';
    }
    canonical
}

/// Compile an ordered chain of rules.
pub fn compile_chain(
    scope: RuleScope,
    rules: &[RequestHeaderRule],
) -> Result<Vec<CompiledRule>, HeaderRuleError> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| CompiledRule::compile(&scope, index, rule))
        .collect()
}
