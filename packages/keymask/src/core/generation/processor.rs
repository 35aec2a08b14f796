//! Stateful logit processor driving the constraint pipeline
//!
//! Implements the sampler-facing contract: `on_prompt` resets per-request
//! state, `process_logits` rewrites one logit vector from the current
//! phase and context, `on_sampled_token` replays the sampled token through
//! the state machine, the trie path and the context stack. The two calls
//! strictly alternate within one generation; a processor instance is never
//! shared across sequences.

use std::sync::Arc;

use super::config::ConstraintConfig;
use super::context::{ContextFrame, ContextStack};
use super::policy::{self, MaskDecision, PolicyInputs};
use super::state_machine::{Container, JsonStateMachine, Phase, StateEvent, StringKind};
use super::stats::ConstraintStatistics;
use crate::core::index::SchemaTrieIndex;
use crate::core::special_tokens::SpecialTokenRegistry;
use crate::core::tokenizer::TokenizerAdapter;
use crate::core::trie::{TokenTrie, TriePath};
use crate::domain::error::{ConstraintError, ConstraintResult};
use crate::domain::schema::SchemaNode;

/// Scale applied to every logit when returning safety-constrained output
const SAFETY_SCALE: f32 = 0.9;

/// Schema-constrained logit processor for one decode sequence
pub struct LogitProcessor {
    schema: Option<Arc<SchemaNode>>,
    adapter: Arc<dyn TokenizerAdapter>,
    registry: Arc<SpecialTokenRegistry>,
    index: Option<Arc<SchemaTrieIndex>>,
    config: ConstraintConfig,

    machine: JsonStateMachine,
    frames: ContextStack,
    pending_key: Option<String>,
    path: TriePath,
    active_trie: Option<Arc<TokenTrie>>,

    token_log: Vec<u32>,
    text_log: String,
    error: Option<ConstraintError>,
    stats: ConstraintStatistics,
}

impl LogitProcessor {
    /// Create a processor for one generation request
    ///
    /// Builds (or fetches from the process caches) the special-token
    /// registry and, when a schema is supplied, the trie index. A `None`
    /// schema produces a processor that enforces JSON syntax only.
    pub fn new(
        schema: Option<Arc<SchemaNode>>,
        adapter: Arc<dyn TokenizerAdapter>,
        config: ConstraintConfig,
    ) -> ConstraintResult<Self> {
        let registry = SpecialTokenRegistry::for_tokenizer(adapter.as_ref())?;
        let index = match &schema {
            Some(schema) => Some(SchemaTrieIndex::cached(
                schema,
                adapter.as_ref(),
                config.schema_index_cache_max,
            )?),
            None => None,
        };
        Ok(Self {
            schema,
            adapter,
            registry,
            index,
            config,
            machine: JsonStateMachine::new(),
            frames: ContextStack::new(),
            pending_key: None,
            path: TriePath::new(),
            active_trie: None,
            token_log: Vec::new(),
            text_log: String::new(),
            error: None,
            stats: ConstraintStatistics::new(),
        })
    }

    /// Reset all per-request state before step zero
    ///
    /// The prompt tokens themselves are not replayed; generation output
    /// starts empty.
    pub fn on_prompt(&mut self, prompt_tokens: &[u32]) {
        self.machine.reset();
        self.frames.reset();
        self.pending_key = None;
        self.path.reset();
        self.active_trie = None;
        self.token_log.clear();
        self.text_log.clear();
        self.error = None;
        self.stats.reset();
        self.stats.start_generation();
        log::debug!(
            "prompt of {} tokens, schema {}",
            prompt_tokens.len(),
            self.index
                .as_ref()
                .map(|index| format!("{:016x}", index.schema_hash()))
                .unwrap_or_else(|| "none".to_string())
        );
    }

    /// Rewrite one logit vector according to the current constraint state
    ///
    /// Deterministic given the processor state and `logits`. Never fails:
    /// problems are recorded in the error cell and the returned vector is
    /// safety-constrained so the sampler terminates quickly.
    pub fn process_logits(&mut self, logits: &[f32]) -> Vec<f32> {
        if self.error.is_some() || self.machine.is_error() {
            self.stats.record_safety_step();
            return self.safety_logits(logits);
        }

        let decision = policy::decide(&PolicyInputs {
            phase: self.machine.phase(),
            frame: self.frames.top(),
            trie: self.active_trie.as_deref(),
            path: &self.path,
            registry: &self.registry,
            logits,
            config: &self.config,
            root_kind: self.schema.as_ref().map(|schema| schema.kind()),
        });

        match decision {
            MaskDecision::Hard(allow) => {
                if allow.is_empty() {
                    let partial_key = self.partial_key();
                    log::warn!(
                        "empty allow-set at phase {:?}, partial key {:?}",
                        self.machine.phase(),
                        partial_key
                    );
                    self.record_error(ConstraintError::NoValidTokens {
                        partial_key,
                        position: self.token_log.len(),
                    });
                    self.stats.record_safety_step();
                    return self.safety_logits(logits);
                }
                self.stats.record_hard_step(allow.len());
                log::trace!(
                    "hard mask: {} of {} tokens admissible at {:?}",
                    allow.len(),
                    logits.len(),
                    self.machine.phase()
                );
                let mut out = vec![f32::NEG_INFINITY; logits.len()];
                for &token in &allow {
                    if let Some(&score) = logits.get(token as usize) {
                        out[token as usize] = score;
                    }
                }
                out
            }
            MaskDecision::Soft(prefer, bias) => {
                self.stats.record_soft_step();
                let mut out = logits.to_vec();
                for &token in &prefer {
                    if let Some(score) = out.get_mut(token as usize) {
                        *score += bias;
                    }
                }
                out
            }
            MaskDecision::Unconstrained => {
                self.stats.record_unconstrained_step();
                logits.to_vec()
            }
        }
    }

    /// Observe the token the sampler actually picked
    ///
    /// Feeds each decoded character through the state machine, keeps the
    /// context stack in lockstep with brackets, advances the trie path by
    /// whole tokens while a key is open, and captures completed keys into
    /// the pending-key slot.
    pub fn on_sampled_token(&mut self, token: u32) {
        self.token_log.push(token);
        self.stats.record_token();
        if self.error.is_some() {
            return;
        }

        let piece = match self.adapter.decode_token(token) {
            Ok(piece) => piece,
            Err(e) => {
                self.record_error(e);
                return;
            }
        };

        let was_in_key = self.in_key();
        for c in piece.chars() {
            match self.machine.advance(c) {
                Some(StateEvent::KeyStarted) => {
                    self.path.reset();
                }
                Some(StateEvent::KeyFinished) => {
                    let key = self.machine.key_buffer().to_string();
                    log::debug!("key completed: {key:?}");
                    if let Some(frame) = self.frames.top_mut() {
                        frame.mark_seen(&key);
                    }
                    self.pending_key = Some(key);
                }
                Some(StateEvent::ScalarStarted) => {
                    self.pending_key = None;
                }
                Some(StateEvent::ObjectOpened) => {
                    self.open_container(Container::Object);
                }
                Some(StateEvent::ArrayOpened) => {
                    self.open_container(Container::Array);
                }
                Some(StateEvent::ContainerClosed) => {
                    self.frames.pop();
                    self.pending_key = None;
                    self.refresh_active_trie();
                    self.path.reset();
                }
                None => {}
            }
            if self.machine.is_error() {
                log::warn!("syntax broken by {c:?} in token {token}");
                break;
            }
        }
        self.text_log.push_str(&piece);

        // whole-token trie step, only while the key stayed open across the
        // entire piece
        if was_in_key && self.in_key() {
            if let Some(trie) = self.active_trie.clone() {
                if !trie.advance(&mut self.path, token) {
                    self.record_error(ConstraintError::InvalidTokenSelected {
                        token_id: token,
                        partial_key: Some(self.machine.key_buffer().to_string()),
                    });
                }
            }
        }

        if self.machine.is_done() {
            self.stats.stop_generation();
            log::debug!("generation complete: {}", self.stats.summary());
        }
    }

    /// Error recorded by a previous step, if any
    ///
    /// The driver polls this between steps and aborts on the first hit.
    pub fn last_error(&self) -> Option<&ConstraintError> {
        self.error.as_ref()
    }

    /// Concatenated decoded output so far
    pub fn generated_text(&self) -> &str {
        &self.text_log
    }

    /// Every token observed through `on_sampled_token`
    pub fn token_log(&self) -> &[u32] {
        &self.token_log
    }

    /// Whether the state machine has consumed one complete value
    pub fn is_done(&self) -> bool {
        self.machine.is_done()
    }

    /// Step statistics for this generation
    pub fn stats(&self) -> &ConstraintStatistics {
        &self.stats
    }

    /// Current phase, for driver-side logging
    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    fn in_key(&self) -> bool {
        matches!(
            self.machine.phase(),
            Phase::InString {
                kind: StringKind::Key,
                ..
            }
        )
    }

    fn partial_key(&self) -> Option<String> {
        if self.in_key() {
            Some(self.machine.key_buffer().to_string())
        } else {
            None
        }
    }

    fn open_container(&mut self, kind: Container) {
        let pending = self.pending_key.take();
        let frame = self.frames.push_for_open(
            kind,
            pending.as_deref(),
            self.schema.as_ref(),
        );
        log::debug!(
            "opened {kind:?} under key {pending:?}, schema-known: {}",
            frame.is_known_object()
        );
        self.refresh_active_trie();
        self.path.reset();
    }

    fn refresh_active_trie(&mut self) {
        self.active_trie = match (self.frames.top(), &self.index) {
            (Some(ContextFrame::Object { node: Some(node), .. }), Some(index)) => {
                index.trie_for(node.identity()).cloned()
            }
            _ => None,
        };
    }

    fn record_error(&mut self, error: ConstraintError) {
        log::warn!("constraint error recorded: {error}");
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.stats.stop_generation();
    }

    fn safety_logits(&self, logits: &[f32]) -> Vec<f32> {
        let mut out: Vec<f32> = logits.iter().map(|&score| score * SAFETY_SCALE).collect();
        if let Some(eos) = self.registry.eos_token_id() {
            if let Some(score) = out.get_mut(eos as usize) {
                *score += self.config.eos_boost_on_safety;
            }
        }
        out
    }
}
