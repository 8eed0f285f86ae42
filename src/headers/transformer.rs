//! Outbound header transformation.
//!
//! # Pipeline
//! ```text
//! client headers ──▶ [all rules] ──▶ [subgraph rules] ──▶ [strip hop-by-hop] ──▶ outbound
//! ```
//! The stage order is fixed in `PIPELINE`; stripping always runs last.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, Request};

use crate::config::schema::HeaderRules;
use crate::gateway::context::RequestContext;
use crate::headers::rules::{compile_chain, CompiledRule, HeaderRuleError, RuleScope};
use crate::security::headers::{connection_nominated, strip_hop_by_hop};

#[derive(Debug, Clone, Copy)]
enum Stage {
    All,
    SubgraphOverlay,
    StripHopByHop,
}

const PIPELINE: [Stage; 3] = [Stage::All, Stage::SubgraphOverlay, Stage::StripHopByHop];

/// Compiled header rules for every destination.
///
/// Immutable once built; share it behind an `Arc` and replace it wholesale
/// when the rules change.
#[derive(Debug, Clone, Default)]
pub struct HeaderTransformer {
    all: Vec<CompiledRule>,
    subgraphs: HashMap<String, Vec<CompiledRule>>,
}

impl HeaderTransformer {
    /// Compile `rules`. Fails on the first invalid rule; nothing is built in
    /// that case.
    pub fn new(rules: &HeaderRules) -> Result<Self, HeaderRuleError> {
        let all = compile_chain(RuleScope::All, &rules.all.request)?;

        let subgraphs = rules
            .subgraphs
            .iter()
            .map(|(name, rule)| {
                let chain = compile_chain(RuleScope::Subgraph(name.clone()), &rule.request)?;
                Ok((name.clone(), chain))
            })
            .collect::<Result<HashMap<_, _>, HeaderRuleError>>()?;

        tracing::debug!(
            all_rules = all.len(),
            subgraph_overrides = subgraphs.len(),
            "Header rules compiled"
        );

        Ok(Self { all, subgraphs })
    }

    /// Set the headers of an outbound subgraph request from the client
    /// request held by `ctx`.
    pub fn on_origin_request<B>(&self, mut request: Request<B>, ctx: &RequestContext) -> Request<B> {
        let subgraph = ctx.subgraph_for(request.uri());
        let client = ctx.client_headers();
        let scoped = connection_nominated(client);
        let outbound = request.headers_mut();

        for stage in PIPELINE {
            match stage {
                Stage::All => apply_chain(&self.all, client, &scoped, outbound),
                Stage::SubgraphOverlay => {
                    if let Some(chain) = subgraph.and_then(|s| self.subgraphs.get(&s.name)) {
                        apply_chain(chain, client, &scoped, outbound);
                    }
                }
                Stage::StripHopByHop => strip_hop_by_hop(outbound),
            }
        }

        tracing::trace!(
            subgraph = subgraph.map(|s| s.name.as_str()).unwrap_or("unknown"),
            headers = outbound.len(),
            "Outbound headers prepared"
        );

        request
    }
}

fn apply_chain(
    chain: &[CompiledRule],
    client: &HeaderMap,
    scoped: &[HeaderName],
    outbound: &mut HeaderMap,
) {
    for rule in chain {
        rule.apply(client, scoped, outbound);
    }
}
