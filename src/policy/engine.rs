//! Request classification.
//!
//! The engine is an ordered list of stages, each pairing a rule with the
//! decision it produces. The first matching stage wins; a request matching
//! no stage is blocked as an unknown API. Concealment stages come before
//! allowance stages so that a concealed path under a known prefix is still
//! blocked.

use axum::http::{HeaderMap, StatusCode};
use percent_encoding::percent_decode_str;

use crate::config::PolicyConfig;
use crate::observability::metrics::FilterResult;
use crate::policy::rules::{
    ExactPaths, ForwardedHeaderRule, PathPatterns, PathPrefixes, RecursiveQueryRule, RequestView,
    Rule,
};

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockReason {
    ForwardedHeader,
    Recursive,
    Concealed,
    UnknownApi,
}

impl BlockReason {
    /// Short label, also the first words of the response body.
    pub fn label(&self) -> &'static str {
        match self {
            BlockReason::ForwardedHeader => "header not allowed",
            BlockReason::Recursive => "recursive not allowed",
            BlockReason::Concealed => "concealed",
            BlockReason::UnknownApi => "unknown API not allowed",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            BlockReason::ForwardedHeader => {
                "Calls with X-Forwarded-For header are not allowed by the metadata proxy."
            }
            BlockReason::Recursive => "?recursive calls are not allowed by the metadata proxy.",
            BlockReason::Concealed => "This metadata endpoint is concealed.",
            BlockReason::UnknownApi => "This metadata API is not allowed by the metadata proxy.",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Blocked {
        status: StatusCode,
        reason: BlockReason,
    },
    Proxied,
}

impl Decision {
    pub fn forbidden(reason: BlockReason) -> Self {
        Decision::Blocked {
            status: StatusCode::FORBIDDEN,
            reason,
        }
    }

    pub fn filter_result(&self) -> FilterResult {
        match self {
            Decision::Blocked { .. } => FilterResult::Blocked,
            Decision::Proxied => FilterResult::Proxied,
        }
    }

    pub fn is_proxied(&self) -> bool {
        matches!(self, Decision::Proxied)
    }
}

/// Error building an engine from configuration.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid concealed pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Pair a rule with the decision it produces.
pub fn stage(rule: impl Rule + 'static, decision: Decision) -> (Box<dyn Rule>, Decision) {
    (Box::new(rule), decision)
}

#[derive(Debug)]
struct Stage {
    rule: Box<dyn Rule>,
    decision: Decision,
}

/// Stateless request classifier. Build once, share via `Arc`.
#[derive(Debug)]
pub struct PolicyEngine {
    stages: Vec<Stage>,
    fallback: Decision,
}

impl PolicyEngine {
    /// Compile the rule tables into the fixed stage order.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        let concealed_patterns = PathPatterns::new("concealed-patterns", &config.concealed_patterns)?;

        Ok(Self::new(vec![
            stage(ForwardedHeaderRule, Decision::forbidden(BlockReason::ForwardedHeader)),
            stage(RecursiveQueryRule, Decision::forbidden(BlockReason::Recursive)),
            stage(
                ExactPaths::new("concealed-paths", config.concealed_paths.iter().cloned()),
                Decision::forbidden(BlockReason::Concealed),
            ),
            stage(concealed_patterns, Decision::forbidden(BlockReason::Concealed)),
            stage(
                PathPrefixes::new("allowed-prefixes", config.allowed_prefixes.iter().cloned()),
                Decision::Proxied,
            ),
            stage(
                ExactPaths::new("discovery-paths", config.discovery_paths.iter().cloned()),
                Decision::Proxied,
            ),
        ]))
    }

    /// Build an engine from explicit stages; unmatched requests are unknown APIs.
    pub fn new(stages: Vec<(Box<dyn Rule>, Decision)>) -> Self {
        Self {
            stages: stages
                .into_iter()
                .map(|(rule, decision)| Stage { rule, decision })
                .collect(),
            fallback: Decision::forbidden(BlockReason::UnknownApi),
        }
    }

    /// Classify a request.
    ///
    /// `path` is the path as received on the wire; it is percent-decoded
    /// before matching. `raw_query` is the undecoded query string.
    pub fn evaluate(&self, path: &str, raw_query: Option<&str>, headers: &HeaderMap) -> Decision {
        let path = percent_decode_str(path).decode_utf8_lossy();
        let request = RequestView {
            path: &path,
            query: raw_query,
            headers,
        };

        match self.stages.iter().find(|s| s.rule.matches(&request)) {
            Some(stage) => {
                tracing::trace!(rule = stage.rule.name(), path = %request.path, "Policy rule matched");
                stage.decision
            }
            None => self.fallback,
        }
    }

    /// Names of the stages in evaluation order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.rule.name()).collect()
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        match Self::from_config(&PolicyConfig::default()) {
            Ok(engine) => engine,
            Err(e) => unreachable!("built-in policy tables are valid: {e}"),
        }
    }
}
