//! Integration tests for the constrained decoding pipeline
//!
//! These drive a real LogitProcessor with a deterministic table-driven
//! tokenizer and a greedy argmax sampler, validating the end-to-end flow:
//! schema → trie index → state machine → mask policy → rewritten logits.

use std::sync::Arc;

use keymask::prelude::*;

/// Deterministic tokenizer shared by the happy-path scenarios
fn tokenizer() -> Arc<VocabTokenizer> {
    Arc::new(
        VocabTokenizer::from_pieces([
            "{", "}", "[", "]", ":", ",", "\"", "\\", " ", "name", "age", "em", "ail",
            "user", "firstName", "lastName", "time", "stamp", "items", "id", "nick",
            "ada", "36", "a@b.c", "x", "1", "2", "true", "false", "null", "<eos>",
        ])
        .with_eos_piece("<eos>"),
    )
}

fn profile_schema() -> Arc<SchemaNode> {
    Arc::new(
        SchemaNode::object([
            ("name", SchemaNode::string()),
            ("age", SchemaNode::integer()),
            ("email", SchemaNode::string()),
        ])
        .with_all_required(),
    )
}

fn nested_schema() -> Arc<SchemaNode> {
    Arc::new(SchemaNode::object([
        (
            "user",
            SchemaNode::object([
                ("firstName", SchemaNode::string()),
                ("lastName", SchemaNode::string()),
            ]),
        ),
        ("timestamp", SchemaNode::string()),
    ]))
}

fn array_schema() -> Arc<SchemaNode> {
    Arc::new(SchemaNode::object([(
        "items",
        SchemaNode::array(SchemaNode::object([
            ("id", SchemaNode::integer()),
            ("name", SchemaNode::string()),
        ])),
    )]))
}

fn processor_for(schema: Arc<SchemaNode>, tok: Arc<VocabTokenizer>) -> LogitProcessor {
    let mut processor =
        LogitProcessor::new(Some(schema), tok, ConstraintConfig::new()).unwrap();
    processor.on_prompt(&[101, 102]);
    processor
}

fn argmax(scores: &[f32]) -> u32 {
    let mut best = 0usize;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }
    best as u32
}

/// Ids whose processed logit survived the mask
fn admissible(processed: &[f32]) -> Vec<u32> {
    processed
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > f32::NEG_INFINITY)
        .map(|(id, _)| id as u32)
        .collect()
}

/// Greedy sampler with the model teacher-forced toward `target`
///
/// Each step boosts the next target token; the mask decides whether the
/// model gets its wish. Asserts mask containment: the picked token's
/// rewritten logit is always finite.
fn generate_forced(
    processor: &mut LogitProcessor,
    tok: &VocabTokenizer,
    target: &str,
) -> String {
    let target_ids = tok.encode(target, false).unwrap();
    for &want in &target_ids {
        let mut logits = vec![0.0f32; tok.vocab_size()];
        logits[want as usize] = 10.0;
        let out = processor.process_logits(&logits);
        let picked = argmax(&out);
        assert!(
            out[picked as usize] > f32::NEG_INFINITY,
            "mask produced an unsampleable step"
        );
        processor.on_sampled_token(picked);
        if processor.last_error().is_some() {
            break;
        }
        if processor.is_done() {
            break;
        }
    }
    processor.generated_text().to_string()
}

/// Force a literal prefix through the processor without consulting masks
fn force_prefix(processor: &mut LogitProcessor, tok: &VocabTokenizer, prefix: &str) {
    for id in tok.encode(prefix, false).unwrap() {
        processor.on_sampled_token(id);
    }
    assert!(
        processor.last_error().is_none(),
        "prefix {prefix:?} broke the processor: {:?}",
        processor.last_error()
    );
}

/// Scenario 1: flat schema, all keys required
///
/// The model is steered toward a valid profile; the output must parse and
/// carry exactly the declared key set.
#[test]
fn flat_schema_generates_exact_key_set() {
    let tok = tokenizer();
    let mut processor = processor_for(profile_schema(), tok.clone());

    let target = r#"{"name":"ada","age":36,"email":"a@b.c"}"#;
    let output = generate_forced(&mut processor, &tok, target);

    assert_eq!(output, target);
    assert!(processor.is_done());
    assert!(processor.last_error().is_none());

    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    let keys: std::collections::BTreeSet<&str> =
        value.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["age", "email", "name"].into_iter().collect()
    );

    assert!(validate(&output, &profile_schema()).is_ok());
}

/// Determinism: identical runs produce byte-identical outputs
#[test]
fn fixed_inputs_are_deterministic() {
    let tok = tokenizer();
    let target = r#"{"name":"ada","age":36,"email":"a@b.c"}"#;

    let mut first = processor_for(profile_schema(), tok.clone());
    let mut second = processor_for(profile_schema(), tok.clone());

    assert_eq!(
        generate_forced(&mut first, &tok, target),
        generate_forced(&mut second, &tok, target)
    );
}

/// Scenario 2: nested object
///
/// After `{"user":{`, only inner-trie keys may open; after the inner
/// object closes, the mask reverts to the remaining outer keys.
#[test]
fn nested_object_switches_tries() {
    let tok = tokenizer();
    let mut processor = processor_for(nested_schema(), tok.clone());

    force_prefix(&mut processor, &tok, r#"{"user":{"#);

    let logits = vec![0.0f32; tok.vocab_size()];
    let allowed = admissible(&processor.process_logits(&logits));
    assert!(allowed.contains(&tok.id_of("firstName").unwrap()));
    assert!(allowed.contains(&tok.id_of("lastName").unwrap()));
    assert!(allowed.contains(&tok.id_of("\"").unwrap()));
    // outer keys must not leak into the inner object
    assert!(!allowed.contains(&tok.id_of("time").unwrap()));
    assert!(!allowed.contains(&tok.id_of("user").unwrap()));

    // finish the inner object and step past the separating comma
    force_prefix(&mut processor, &tok, r#""firstName":"x"},"#);

    let allowed = admissible(&processor.process_logits(&logits));
    // "user" is exhausted; "timestamp" (first token "time") remains
    assert!(allowed.contains(&tok.id_of("time").unwrap()));
    assert!(!allowed.contains(&tok.id_of("user").unwrap()));
    assert!(allowed.contains(&tok.id_of("\"").unwrap()));
}

/// Outer object may close once no required keys are outstanding
#[test]
fn nested_object_allows_close_after_comma_phase() {
    let tok = tokenizer();
    let mut processor = processor_for(nested_schema(), tok.clone());

    force_prefix(&mut processor, &tok, r#"{"user":{"firstName":"x"}"#);

    // value finished: only comma or close are admissible
    let logits = vec![0.0f32; tok.vocab_size()];
    let allowed = admissible(&processor.process_logits(&logits));
    assert_eq!(allowed.len(), 2);
    assert!(allowed.contains(&tok.id_of(",").unwrap()));
    assert!(allowed.contains(&tok.id_of("}").unwrap()));
}

/// Scenario 3: array of objects
///
/// Every `{` inside the array opens a fresh element frame drawing keys
/// from the element schema.
#[test]
fn array_elements_draw_from_element_trie() {
    let tok = tokenizer();
    let mut processor = processor_for(array_schema(), tok.clone());

    force_prefix(&mut processor, &tok, r#"{"items":[{"#);

    let logits = vec![0.0f32; tok.vocab_size()];
    let allowed = admissible(&processor.process_logits(&logits));
    assert!(allowed.contains(&tok.id_of("id").unwrap()));
    assert!(allowed.contains(&tok.id_of("name").unwrap()));
    assert!(!allowed.contains(&tok.id_of("items").unwrap()));

    // next element starts over with a fresh seen-set
    force_prefix(&mut processor, &tok, r#""id":1},{"#);

    let allowed = admissible(&processor.process_logits(&logits));
    assert!(allowed.contains(&tok.id_of("id").unwrap()));
    assert!(allowed.contains(&tok.id_of("name").unwrap()));
}

/// Scenario 4: an object node with no declared keys fails at build time
#[test]
fn empty_declared_keys_fail_before_generation() {
    let tok = tokenizer();
    let schema = Arc::new(SchemaNode::object([(
        "payload",
        SchemaNode::object(Vec::<(String, SchemaNode)>::new()),
    )]));

    let err = LogitProcessor::new(Some(schema), tok, ConstraintConfig::new())
        .err()
        .expect("build must fail");
    assert_eq!(err, ConstraintError::EmptyConstraints);
}

/// Scenario 5: tokenizer without a single-character quote token
///
/// At a key terminal the allow-set must fall back to the highest-scoring
/// quote-containing tokens.
#[test]
fn missing_exact_quote_uses_dynamic_candidates() {
    let tok = Arc::new(
        VocabTokenizer::from_pieces([
            "{\"", "na", "me", "\":", "\",", "\"}", "1", "}", ",", "<eos>",
        ])
        .with_eos_piece("<eos>"),
    );
    let schema = Arc::new(SchemaNode::object([("name", SchemaNode::integer())]));
    let mut processor =
        LogitProcessor::new(Some(schema.clone()), tok.clone(), ConstraintConfig::new())
            .unwrap();
    processor.on_prompt(&[]);

    // `{"` opens the object and the key in one token
    force_prefix(&mut processor, &tok, "{\"name");

    // at the terminal, score the quote carriers unevenly
    let mut logits = vec![0.0f32; tok.vocab_size()];
    logits[tok.id_of("\":").unwrap() as usize] = 3.0;
    let out = processor.process_logits(&logits);
    let allowed = admissible(&out);

    assert!(!allowed.is_empty());
    assert!(allowed.contains(&tok.id_of("\":").unwrap()));
    for id in &allowed {
        let piece = tok.decode(&[*id]).unwrap();
        assert!(
            piece.contains('"') || piece.contains('\\'),
            "non-quote token {piece:?} admitted at terminal"
        );
    }

    // ride the straddling token through close-quote and colon, then finish
    let output = generate_forced(&mut processor, &tok, "\":1}");
    assert_eq!(output, "{\"name\":1}");
    assert!(processor.is_done());
    assert!(validate(&output, &schema).is_ok());
}

/// Scenario 6: dead-end detection
///
/// A vocabulary with no token for a syntactically mandatory terminal
/// collapses the hard mask to the empty set; the processor must stop
/// before sampling and surface `NoValidTokens`.
#[test]
fn dead_end_surfaces_no_valid_tokens() {
    // no piece contains ':', so the colon after a key can never be emitted
    let tok = Arc::new(
        VocabTokenizer::from_pieces(["{", "}", "\"", "na", "me", "1", ",", "<eos>"])
            .with_eos_piece("<eos>"),
    );
    let schema = Arc::new(SchemaNode::object([("name", SchemaNode::integer())]));
    let mut processor =
        LogitProcessor::new(Some(schema), tok.clone(), ConstraintConfig::new()).unwrap();
    processor.on_prompt(&[]);

    force_prefix(&mut processor, &tok, "{\"name\"");

    let logits = vec![1.0f32; tok.vocab_size()];
    let out = processor.process_logits(&logits);

    match processor.last_error() {
        Some(ConstraintError::NoValidTokens { position, .. }) => {
            assert_eq!(*position, processor.token_log().len());
        }
        other => panic!("expected NoValidTokens, got {other:?}"),
    }

    // safety logits: everything scaled down, EOS boosted
    let eos = tok.id_of("<eos>").unwrap() as usize;
    assert!(out[eos] > out[0]);
    assert!(out[0] < 1.0);
}

/// Unknown frames keep structural syntax but drop key constraints
#[test]
fn unknown_object_disables_key_constraints_only() {
    let tok = tokenizer();
    // schema declares "name" as a string; the model opens an object there
    let schema = Arc::new(SchemaNode::object([("name", SchemaNode::string())]));
    let mut processor =
        LogitProcessor::new(Some(schema), tok.clone(), ConstraintConfig::new()).unwrap();
    processor.on_prompt(&[]);

    force_prefix(&mut processor, &tok, r#"{"name":{"#);

    // soft preference only: every token stays sampleable
    let logits = vec![0.0f32; tok.vocab_size()];
    let out = processor.process_logits(&logits);
    assert_eq!(admissible(&out).len(), tok.vocab_size());
    // but quote and close are preferred
    assert!(out[tok.id_of("\"").unwrap() as usize] > 0.0);
    assert!(out[tok.id_of("}").unwrap() as usize] > 0.0);

    // arbitrary keys are accepted inside the unknown object
    force_prefix(&mut processor, &tok, r#""nick":1}"#);
    assert!(processor.last_error().is_none());

    // back in the schema-known outer object: comma or close only
    let allowed = admissible(&processor.process_logits(&logits));
    assert!(allowed.contains(&tok.id_of(",").unwrap()));
    assert!(allowed.contains(&tok.id_of("}").unwrap()));
    assert_eq!(allowed.len(), 2);
}

/// The recovery driver retries validator failures with a hotter sampler
#[test]
fn recovery_retries_validator_failures() {
    let schema = profile_schema();
    let outputs = [
        r#"{"name":"ada","nick":"x"}"#,
        r#"{"name":"ada","age":36,"email":"a@b.c"}"#,
    ];
    let mut attempt_temps = Vec::new();

    let result = drive(
        &RetryPolicy::new(),
        &schema,
        0.7,
        None,
        |temperature, attempt| {
            attempt_temps.push(temperature);
            Ok(outputs[attempt.min(1)].to_string())
        },
    );

    assert_eq!(result.unwrap(), outputs[1]);
    assert_eq!(attempt_temps.len(), 2);
    assert!(attempt_temps[1] > attempt_temps[0]);
}

/// End-of-generation: once done, only EOS survives the mask
#[test]
fn done_phase_forces_eos() {
    let tok = tokenizer();
    let mut processor = processor_for(nested_schema(), tok.clone());

    force_prefix(
        &mut processor,
        &tok,
        r#"{"user":{"firstName":"x"},"timestamp":"1"}"#,
    );
    assert!(processor.is_done());

    let logits = vec![0.0f32; tok.vocab_size()];
    let allowed = admissible(&processor.process_logits(&logits));
    assert_eq!(allowed, vec![tok.id_of("<eos>").unwrap()]);
}
