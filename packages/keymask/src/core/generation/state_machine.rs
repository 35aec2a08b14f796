//! Character-driven JSON state machine
//!
//! Tracks the syntactic phase of the partially generated string one
//! character at a time. Deterministic, never needs lookahead: a number
//! exits on the first non-numeric character by re-dispatching that
//! character in the follow phase. The `error` phase is absorbing.

/// Whether the string being consumed is an object key or a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    /// Object key; characters accumulate in the key buffer
    Key,
    /// String value; content is unconstrained
    Value,
}

/// Sub-state of number consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberPhase {
    /// Optional sign and integer digits
    Integer,
    /// Digits after the decimal point
    Fraction,
    /// Exponent sign and digits
    Exponent,
}

/// Syntactic phase of the cursor in the partial output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing consumed yet (modulo whitespace)
    Root,
    /// Inside an object, expecting a key's opening quote or `}`
    ObjExpectKeyOrEnd,
    /// Key complete, expecting `:`
    ObjExpectColon,
    /// Colon consumed, expecting a value
    ObjExpectValue,
    /// Value complete, expecting `,` or `}`
    ObjExpectCommaOrEnd,
    /// Inside an array, expecting a value or `]`
    ArrExpectValueOrEnd,
    /// Array element complete, expecting `,` or `]`
    ArrExpectCommaOrEnd,
    /// Inside a string
    InString {
        /// Key or value string
        kind: StringKind,
        /// A backslash was just consumed
        escaped: bool,
    },
    /// Inside a number
    InNumber {
        /// Integer, fraction or exponent sub-state
        phase: NumberPhase,
    },
    /// Inside `true`, `false` or `null`
    InLiteral {
        /// The literal being matched
        literal: &'static str,
        /// Characters matched so far
        matched: usize,
    },
    /// One complete value parsed at depth zero
    Done,
    /// Syntax broken; absorbing
    Error,
}

/// Bracket stack entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// `{` frame
    Object,
    /// `[` frame
    Array,
}

/// Structural observation reported by one `advance` call
///
/// The logit processor consumes these to keep the context stack and trie
/// path in lockstep with the character stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// A key's opening quote was consumed
    KeyStarted,
    /// A key's closing quote was consumed; the key buffer holds the key
    KeyFinished,
    /// The first character of a primitive value was consumed
    ScalarStarted,
    /// `{` was consumed and an object frame pushed
    ObjectOpened,
    /// `[` was consumed and an array frame pushed
    ArrayOpened,
    /// `}` or `]` was consumed and the frame popped
    ContainerClosed,
}

/// Character-level JSON automaton with a bracket stack and key buffer
#[derive(Debug, Clone)]
pub struct JsonStateMachine {
    phase: Phase,
    stack: Vec<Container>,
    key_buffer: String,
}

impl JsonStateMachine {
    /// Fresh machine at the root phase
    pub fn new() -> Self {
        Self {
            phase: Phase::Root,
            stack: Vec::new(),
            key_buffer: String::new(),
        }
    }

    /// Reset to the root phase with an empty stack
    pub fn reset(&mut self) {
        self.phase = Phase::Root;
        self.stack.clear();
        self.key_buffer.clear();
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Bracket depth of the consumed prefix
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Innermost open container, if any
    pub fn top(&self) -> Option<Container> {
        self.stack.last().copied()
    }

    /// Key characters accumulated since the current key's opening quote
    ///
    /// Equals the literal key string from the moment the phase becomes
    /// [`Phase::ObjExpectColon`] until the colon is consumed.
    pub fn key_buffer(&self) -> &str {
        &self.key_buffer
    }

    /// Whether a complete value has been parsed
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Whether the machine is in the absorbing error phase
    pub fn is_error(&self) -> bool {
        self.phase == Phase::Error
    }

    /// Consume one character, reporting any structural event
    pub fn advance(&mut self, c: char) -> Option<StateEvent> {
        if let Phase::InNumber { phase } = self.phase {
            if let Some(next) = Self::number_transition(phase, c) {
                self.phase = Phase::InNumber { phase: next };
                return None;
            }
            // number ends without consuming c; re-dispatch in follow phase
            self.phase = self.after_value();
        }
        self.dispatch(c)
    }

    fn dispatch(&mut self, c: char) -> Option<StateEvent> {
        match self.phase {
            Phase::Root => self.dispatch_value(c, None),
            Phase::ObjExpectKeyOrEnd => match c {
                '"' => {
                    self.key_buffer.clear();
                    self.phase = Phase::InString {
                        kind: StringKind::Key,
                        escaped: false,
                    };
                    Some(StateEvent::KeyStarted)
                }
                '}' => self.close_container(),
                c if c.is_ascii_whitespace() => None,
                _ => self.fail(),
            },
            Phase::ObjExpectColon => match c {
                ':' => {
                    self.key_buffer.clear();
                    self.phase = Phase::ObjExpectValue;
                    None
                }
                c if c.is_ascii_whitespace() => None,
                _ => self.fail(),
            },
            Phase::ObjExpectValue => self.dispatch_value(c, None),
            Phase::ObjExpectCommaOrEnd => match c {
                ',' => {
                    self.phase = Phase::ObjExpectKeyOrEnd;
                    None
                }
                '}' => self.close_container(),
                c if c.is_ascii_whitespace() => None,
                _ => self.fail(),
            },
            Phase::ArrExpectValueOrEnd => self.dispatch_value(c, Some(']')),
            Phase::ArrExpectCommaOrEnd => match c {
                ',' => {
                    self.phase = Phase::ArrExpectValueOrEnd;
                    None
                }
                ']' => self.close_container(),
                c if c.is_ascii_whitespace() => None,
                _ => self.fail(),
            },
            Phase::InString { kind, escaped } => {
                if escaped {
                    if kind == StringKind::Key {
                        self.key_buffer.push(c);
                    }
                    self.phase = Phase::InString {
                        kind,
                        escaped: false,
                    };
                    None
                } else if c == '\\' {
                    self.phase = Phase::InString {
                        kind,
                        escaped: true,
                    };
                    None
                } else if c == '"' {
                    match kind {
                        StringKind::Key => {
                            self.phase = Phase::ObjExpectColon;
                            Some(StateEvent::KeyFinished)
                        }
                        StringKind::Value => {
                            self.phase = self.after_value();
                            None
                        }
                    }
                } else {
                    if kind == StringKind::Key {
                        self.key_buffer.push(c);
                    }
                    None
                }
            }
            Phase::InLiteral { literal, matched } => {
                if literal.chars().nth(matched) == Some(c) {
                    let matched = matched + 1;
                    if matched == literal.len() {
                        self.phase = self.after_value();
                    } else {
                        self.phase = Phase::InLiteral { literal, matched };
                    }
                    None
                } else {
                    self.fail()
                }
            }
            // numbers are handled in advance(); reaching here means the
            // follow phase re-dispatch already replaced the phase
            Phase::InNumber { .. } => self.fail(),
            Phase::Done => {
                if c.is_ascii_whitespace() {
                    None
                } else {
                    self.fail()
                }
            }
            Phase::Error => None,
        }
    }

    /// Handle a character in a position that admits a value
    ///
    /// `end` carries the closing bracket an array-value position also
    /// accepts.
    fn dispatch_value(&mut self, c: char, end: Option<char>) -> Option<StateEvent> {
        match c {
            '{' => {
                self.stack.push(Container::Object);
                self.phase = Phase::ObjExpectKeyOrEnd;
                Some(StateEvent::ObjectOpened)
            }
            '[' => {
                self.stack.push(Container::Array);
                self.phase = Phase::ArrExpectValueOrEnd;
                Some(StateEvent::ArrayOpened)
            }
            '"' => {
                self.phase = Phase::InString {
                    kind: StringKind::Value,
                    escaped: false,
                };
                Some(StateEvent::ScalarStarted)
            }
            '0'..='9' | '-' => {
                self.phase = Phase::InNumber {
                    phase: NumberPhase::Integer,
                };
                Some(StateEvent::ScalarStarted)
            }
            't' => self.start_literal("true"),
            'f' => self.start_literal("false"),
            'n' => self.start_literal("null"),
            c if c.is_ascii_whitespace() => None,
            c if Some(c) == end => self.close_container(),
            _ => self.fail(),
        }
    }

    fn start_literal(&mut self, literal: &'static str) -> Option<StateEvent> {
        self.phase = Phase::InLiteral {
            literal,
            matched: 1,
        };
        Some(StateEvent::ScalarStarted)
    }

    fn close_container(&mut self) -> Option<StateEvent> {
        self.stack.pop();
        self.phase = self.after_value();
        Some(StateEvent::ContainerClosed)
    }

    /// Phase following a completed value, decided by the enclosing frame
    fn after_value(&self) -> Phase {
        match self.stack.last() {
            None => Phase::Done,
            Some(Container::Object) => Phase::ObjExpectCommaOrEnd,
            Some(Container::Array) => Phase::ArrExpectCommaOrEnd,
        }
    }

    fn fail(&mut self) -> Option<StateEvent> {
        self.phase = Phase::Error;
        None
    }

    fn number_transition(phase: NumberPhase, c: char) -> Option<NumberPhase> {
        match phase {
            NumberPhase::Integer => match c {
                '0'..='9' => Some(NumberPhase::Integer),
                '.' => Some(NumberPhase::Fraction),
                'e' | 'E' => Some(NumberPhase::Exponent),
                _ => None,
            },
            NumberPhase::Fraction => match c {
                '0'..='9' => Some(NumberPhase::Fraction),
                'e' | 'E' => Some(NumberPhase::Exponent),
                _ => None,
            },
            NumberPhase::Exponent => match c {
                '0'..='9' | '+' | '-' => Some(NumberPhase::Exponent),
                _ => None,
            },
        }
    }
}

impl Default for JsonStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(machine: &mut JsonStateMachine, text: &str) -> Vec<StateEvent> {
        text.chars().filter_map(|c| machine.advance(c)).collect()
    }

    #[test]
    fn test_flat_object_reaches_done() {
        let mut machine = JsonStateMachine::new();
        let events = feed(&mut machine, r#"{"name": "ada", "age": 36}"#);
        assert!(machine.is_done());
        assert_eq!(machine.depth(), 0);
        assert_eq!(
            events,
            vec![
                StateEvent::ObjectOpened,
                StateEvent::KeyStarted,
                StateEvent::KeyFinished,
                StateEvent::ScalarStarted,
                StateEvent::KeyStarted,
                StateEvent::KeyFinished,
                StateEvent::ScalarStarted,
                StateEvent::ContainerClosed,
            ]
        );
    }

    #[test]
    fn test_key_buffer_holds_key_at_colon_time() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, r#"{"email"#);
        assert_eq!(machine.phase(), Phase::InString { kind: StringKind::Key, escaped: false });

        machine.advance('"');
        assert_eq!(machine.phase(), Phase::ObjExpectColon);
        assert_eq!(machine.key_buffer(), "email");

        machine.advance(':');
        assert_eq!(machine.key_buffer(), "");
        assert_eq!(machine.phase(), Phase::ObjExpectValue);
    }

    #[test]
    fn test_nested_structures() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, r#"{"items": [{"id": 1}, {"id": 2}], "ok": true}"#);
        assert!(machine.is_done());
    }

    #[test]
    fn test_number_exits_without_consuming() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, r#"{"age": 36"#);
        assert_eq!(
            machine.phase(),
            Phase::InNumber { phase: NumberPhase::Integer }
        );

        // '}' both ends the number and closes the object
        let event = machine.advance('}');
        assert_eq!(event, Some(StateEvent::ContainerClosed));
        assert!(machine.is_done());
    }

    #[test]
    fn test_number_subphases() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, "-12.5e+3");
        assert_eq!(
            machine.phase(),
            Phase::InNumber { phase: NumberPhase::Exponent }
        );
        machine.advance(' ');
        assert!(machine.is_done());
    }

    #[test]
    fn test_escaped_quote_stays_in_key() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, r#"{"a\"b"#);
        assert_eq!(
            machine.phase(),
            Phase::InString { kind: StringKind::Key, escaped: false }
        );
        machine.advance('"');
        assert_eq!(machine.key_buffer(), "a\"b");
    }

    #[test]
    fn test_literal_mismatch_is_error() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, "trux");
        assert!(machine.is_error());
    }

    #[test]
    fn test_error_is_absorbing() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, "}");
        assert!(machine.is_error());
        feed(&mut machine, r#"{"valid": 1}"#);
        assert!(machine.is_error());
    }

    #[test]
    fn test_root_scalar_reaches_done() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, "\"hello\" ");
        assert!(machine.is_done());

        let mut machine = JsonStateMachine::new();
        feed(&mut machine, "null");
        assert!(machine.is_done());
    }

    #[test]
    fn test_trailing_garbage_after_done() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, "true x");
        assert!(machine.is_error());
    }

    #[test]
    fn test_empty_object_and_array() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, "{}");
        assert!(machine.is_done());

        let mut machine = JsonStateMachine::new();
        feed(&mut machine, r#"{"xs": []}"#);
        assert!(machine.is_done());
    }

    #[test]
    fn test_mismatched_close_is_error() {
        let mut machine = JsonStateMachine::new();
        feed(&mut machine, r#"{"a": [1}"#);
        assert!(machine.is_error());
    }
}
