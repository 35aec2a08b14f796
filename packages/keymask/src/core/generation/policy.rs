//! Mask policy: phase × context → allow-set
//!
//! A pure decision function. Given the current phase, the top context
//! frame, the active trie path and the special-token sets, it produces
//! either a hard allow-set (everything else goes to negative infinity), a
//! soft preference set with a fixed additive bias, or no constraint. The
//! current logits participate only in dynamic closing-quote discovery.

use std::collections::HashSet;

use ahash::RandomState;

use super::config::ConstraintConfig;
use super::context::ContextFrame;
use super::state_machine::{Phase, StringKind};
use crate::core::special_tokens::SpecialTokenRegistry;
use crate::core::trie::{TokenTrie, TriePath};
use crate::domain::schema::SchemaKind;

/// Set of token ids
pub type TokenSet = HashSet<u32, RandomState>;

/// What the processor should do to the current logit vector
#[derive(Debug, Clone, PartialEq)]
pub enum MaskDecision {
    /// Tokens outside the set become unsampleable
    Hard(TokenSet),
    /// Tokens in the set receive the additive bias
    Soft(TokenSet, f32),
    /// Leave the logits untouched
    Unconstrained,
}

impl MaskDecision {
    /// Whether this decision forbids sampling outside a set
    pub fn is_hard(&self) -> bool {
        matches!(self, Self::Hard(_))
    }
}

/// Inputs the decision is a pure function of
pub struct PolicyInputs<'a> {
    /// Phase at step start
    pub phase: Phase,
    /// Innermost context frame, if any container is open
    pub frame: Option<&'a ContextFrame>,
    /// Trie of the innermost known object frame
    pub trie: Option<&'a TokenTrie>,
    /// Position inside the current key
    pub path: &'a TriePath,
    /// Special-token sets for this tokenizer
    pub registry: &'a SpecialTokenRegistry,
    /// Current step's logits, for dynamic quote discovery only
    pub logits: &'a [f32],
    /// Tunables (soft bias, quote top-k)
    pub config: &'a ConstraintConfig,
    /// Shape class of the schema root, if a schema was supplied
    pub root_kind: Option<SchemaKind>,
}

/// Decide the mask for one step
pub fn decide(inputs: &PolicyInputs<'_>) -> MaskDecision {
    let registry = inputs.registry;
    let bias = inputs.config.soft_bias_magnitude;

    match inputs.phase {
        Phase::Root => MaskDecision::Soft(root_preference(inputs), bias),

        Phase::ObjExpectKeyOrEnd => match (inputs.frame, inputs.trie) {
            (Some(frame @ ContextFrame::Object { node: Some(_), seen }), Some(trie)) => {
                let mut allow: TokenSet = trie
                    .first_tokens(|key| !seen.contains(key))
                    .into_iter()
                    .collect();
                allow.extend(registry.exact('"'));
                if frame.may_end() {
                    allow.extend(registry.exact('}'));
                }
                MaskDecision::Hard(allow)
            }
            _ => {
                let mut prefer = TokenSet::default();
                prefer.extend(registry.starting('"'));
                prefer.extend(registry.starting('}'));
                MaskDecision::Soft(prefer, bias)
            }
        },

        Phase::InString {
            kind: StringKind::Key,
            escaped: false,
        } => match inputs.trie {
            Some(trie) if inputs.frame.is_some_and(ContextFrame::is_known_object) => {
                let mut allow: TokenSet =
                    trie.allowed_next(inputs.path).into_iter().collect();
                if trie.at_terminal(inputs.path) {
                    allow.extend(registry.closing_quote_tokens(
                        inputs.logits,
                        inputs.config.dynamic_quote_top_k,
                    ));
                    allow.extend(registry.containing('\\'));
                }
                MaskDecision::Hard(allow)
            }
            _ => MaskDecision::Unconstrained,
        },

        // escape body and string values are free text
        Phase::InString { .. } => MaskDecision::Unconstrained,

        Phase::ObjExpectColon => {
            MaskDecision::Hard(registry.exact(':').iter().copied().collect())
        }

        Phase::ObjExpectValue => {
            let prefer = registry.value_starter_tokens().iter().copied().collect();
            MaskDecision::Soft(prefer, bias)
        }

        Phase::ObjExpectCommaOrEnd => {
            let mut allow: TokenSet = registry.exact(',').iter().copied().collect();
            allow.extend(registry.exact('}'));
            MaskDecision::Hard(allow)
        }

        Phase::ArrExpectValueOrEnd => {
            let mut prefer: TokenSet =
                registry.value_starter_tokens().iter().copied().collect();
            prefer.extend(registry.starting(']'));
            MaskDecision::Soft(prefer, bias)
        }

        Phase::ArrExpectCommaOrEnd => {
            let mut allow: TokenSet = registry.exact(',').iter().copied().collect();
            allow.extend(registry.exact(']'));
            MaskDecision::Hard(allow)
        }

        Phase::InNumber { .. } | Phase::InLiteral { .. } => MaskDecision::Unconstrained,

        Phase::Done => match registry.eos_token_id() {
            Some(eos) => MaskDecision::Hard(std::iter::once(eos).collect()),
            None => MaskDecision::Unconstrained,
        },

        // the processor short-circuits to safety logits before deciding
        Phase::Error => MaskDecision::Unconstrained,
    }
}

/// Soft preference for the schema root's opening token
fn root_preference(inputs: &PolicyInputs<'_>) -> TokenSet {
    let registry = inputs.registry;
    match inputs.root_kind {
        Some(SchemaKind::Object) => registry.starting('{').iter().copied().collect(),
        Some(SchemaKind::Array) => registry.starting('[').iter().copied().collect(),
        _ => registry.value_starter_tokens().iter().copied().collect(),
    }
}
