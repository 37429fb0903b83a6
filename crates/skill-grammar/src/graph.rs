//! Grammar acceptor synthesis.
//!
//! The grammar has one start state and one final state. From the start state an
//! epsilon arc per intent emits that intent's tag and enters a linear chain per
//! template utterance; slot references fan out into one sub-chain per slot
//! value and rejoin at the next chain state. Every state inside a chain can
//! give up on an unknown word and fall back to the start state, emitting
//! `[restart]`, so out-of-grammar speech never wedges the decoder.

use crate::error::Result;
use crate::symbols::{display_symbol, Label, WordTable, EPSILON, RESTART, UNKNOWN};
use crate::types::{slot_reference, Intent, Skill, SlotType};
use tracing::{debug, info, warn};

pub type StateId = u32;

/// All arcs are uniform cost.
pub const ZERO_WEIGHT: f32 = 0.0;

/// Hands out state ids; ids are never reused.
#[derive(Debug, Default)]
pub struct StateAllocator {
    next: StateId,
}

impl StateAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_state(&mut self) -> StateId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of states handed out so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FstArc {
    pub src: StateId,
    pub dst: StateId,
    pub ilabel: Label,
    pub olabel: Label,
    pub weight: f32,
}

/// A token that had to be recognized as `<unk>`, in readable UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OovToken {
    pub token: String,
    pub intent: String,
    /// Set when the token came from a slot value rather than the utterance.
    pub slot_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Grammar {
    pub start: StateId,
    pub final_state: StateId,
    pub num_states: u32,
    /// In emission order; the first arc leaves the start state.
    pub arcs: Vec<FstArc>,
    pub oov: Vec<OovToken>,
}

impl Grammar {
    pub fn arcs_from(&self, state: StateId) -> impl Iterator<Item = &FstArc> + '_ {
        self.arcs.iter().filter(move |a| a.src == state)
    }
}

/// Build the grammar for `skill`, minting `[restart]` and one `[Intent]` tag
/// per intent into `words`.
pub fn build_grammar(words: &mut WordTable, skill: &Skill) -> Result<Grammar> {
    skill.validate()?;
    let eps = words.reserved(EPSILON)?;
    let unk = words.reserved(UNKNOWN)?;
    let restart = words.mint(RESTART)?;

    let mut states = StateAllocator::new();
    let start = states.next_state();
    let final_state = states.next_state();
    let mut builder = GraphBuilder {
        words,
        skill,
        eps,
        unk,
        restart,
        states,
        start,
        final_state,
        arcs: Vec::new(),
        oov: Vec::new(),
    };
    builder.add_recovery(start);

    for intent in &skill.intents {
        builder.add_intent(intent)?;
    }

    let grammar = Grammar {
        start,
        final_state,
        num_states: builder.states.count(),
        arcs: builder.arcs,
        oov: builder.oov,
    };
    info!(
        states = grammar.num_states,
        arcs = grammar.arcs.len(),
        oov = grammar.oov.len(),
        "grammar built"
    );
    Ok(grammar)
}

struct GraphBuilder<'a> {
    words: &'a mut WordTable,
    skill: &'a Skill,
    eps: Label,
    unk: Label,
    restart: Label,
    states: StateAllocator,
    start: StateId,
    final_state: StateId,
    arcs: Vec<FstArc>,
    oov: Vec<OovToken>,
}

impl GraphBuilder<'_> {
    fn push(&mut self, src: StateId, dst: StateId, ilabel: Label, olabel: Label) {
        self.arcs.push(FstArc {
            src,
            dst,
            ilabel,
            olabel,
            weight: ZERO_WEIGHT,
        });
    }

    fn add_recovery(&mut self, state: StateId) {
        self.push(state, self.start, self.unk, self.restart);
    }

    fn add_intent(&mut self, intent: &Intent) -> Result<()> {
        let tag = self.words.mint(&intent.tag())?;
        let entry = self.states.next_state();
        self.push(self.start, entry, self.eps, tag);
        debug!(
            intent = %intent.name,
            tag,
            utterances = intent.utterances.len(),
            "adding intent"
        );
        if intent.utterances.is_empty() {
            warn!(intent = %intent.name, "intent has no utterances");
        }
        for utterance in &intent.utterances {
            self.add_utterance(intent, entry, utterance)?;
        }
        Ok(())
    }

    /// Allocate the states between `from` and `to` for a path of `len` words.
    ///
    /// Returns `len + 1` states; the fresh inner ones get a recovery arc.
    fn chain(&mut self, from: StateId, to: StateId, len: usize) -> Vec<StateId> {
        let mut chain = Vec::with_capacity(len + 1);
        chain.push(from);
        for _ in 1..len {
            let state = self.states.next_state();
            self.add_recovery(state);
            chain.push(state);
        }
        chain.push(to);
        chain
    }

    fn add_utterance(&mut self, intent: &Intent, entry: StateId, utterance: &str) -> Result<()> {
        let tokens: Vec<&str> = utterance.split_ascii_whitespace().collect();
        if tokens.is_empty() {
            self.push(entry, self.final_state, self.eps, self.eps);
            return Ok(());
        }
        let skill = self.skill;
        let chain = self.chain(entry, self.final_state, tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            let (from, to) = (chain[i], chain[i + 1]);
            match slot_reference(token) {
                Some(slot) => {
                    let slot_type = skill.slot_type(intent, slot)?;
                    self.add_slot(intent, slot_type, from, to);
                }
                None => self.add_word(token, from, to, intent, None),
            }
        }
        Ok(())
    }

    /// One parallel sub-chain per slot value, all from `from` into `to`.
    fn add_slot(&mut self, intent: &Intent, slot_type: &SlotType, from: StateId, to: StateId) {
        if slot_type.values.is_empty() {
            warn!(slot_type = %slot_type.name, "slot type has no values");
        }
        for value in &slot_type.values {
            let tokens = SlotType::value_tokens(value);
            if tokens.is_empty() {
                self.push(from, to, self.eps, self.eps);
                continue;
            }
            let chain = self.chain(from, to, tokens.len());
            for (j, token) in tokens.iter().enumerate() {
                self.add_word(token, chain[j], chain[j + 1], intent, Some(slot_type));
            }
        }
    }

    fn add_word(
        &mut self,
        token: &str,
        from: StateId,
        to: StateId,
        intent: &Intent,
        slot_type: Option<&SlotType>,
    ) {
        let label = match self.words.get(token) {
            Some(id) => id,
            None => {
                let oov = OovToken {
                    token: display_symbol(token),
                    intent: display_symbol(&intent.name),
                    slot_type: slot_type.map(|ty| display_symbol(&ty.name)),
                };
                match &oov.slot_type {
                    Some(ty) => warn!(
                        token = %oov.token,
                        intent = %oov.intent,
                        slot_type = %ty,
                        "slot value token is not in the word table"
                    ),
                    None => warn!(
                        token = %oov.token,
                        intent = %oov.intent,
                        "utterance token is not in the word table"
                    ),
                }
                self.oov.push(oov);
                self.unk
            }
        };
        self.push(from, to, label, label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn arc(src: StateId, dst: StateId, ilabel: Label, olabel: Label) -> FstArc {
        FstArc {
            src,
            dst,
            ilabel,
            olabel,
            weight: ZERO_WEIGHT,
        }
    }

    fn words() -> WordTable {
        WordTable::from_entries([
            (EPSILON, 0),
            (UNKNOWN, 1),
            ("hello", 2),
            ("world", 3),
            ("fly", 4),
            ("to", 5),
            ("new", 6),
            ("york", 7),
            ("boston", 8),
        ])
        .unwrap()
    }

    fn skill(types: Vec<SlotType>, intents: Vec<Intent>) -> Skill {
        let types: BTreeMap<String, SlotType> =
            types.into_iter().map(|t| (t.name.clone(), t)).collect();
        Skill::new(types, intents).unwrap()
    }

    fn hello_skill() -> Skill {
        skill(
            vec![SlotType::new("greeting", vec!["world".into()])],
            vec![Intent::with_slots("Hi", [("target", "greeting")])
                .unwrap()
                .utterance("hello {target}")],
        )
    }

    #[test]
    fn test_hello_world_scenario() {
        let mut table = WordTable::from_entries([
            (EPSILON, 0),
            (UNKNOWN, 1),
            ("hello", 2),
            ("world", 3),
        ])
        .unwrap();
        let grammar = build_grammar(&mut table, &hello_skill()).unwrap();

        assert_eq!(table.get(RESTART), Some(4));
        assert_eq!(table.get("[Hi]"), Some(5));
        assert_eq!(grammar.start, 0);
        assert_eq!(grammar.final_state, 1);
        assert_eq!(grammar.num_states, 4);
        assert_eq!(
            grammar.arcs,
            vec![
                arc(0, 0, 1, 4),
                arc(0, 2, 0, 5),
                arc(3, 0, 1, 4),
                arc(2, 3, 2, 2),
                arc(3, 1, 3, 3),
            ]
        );
        assert!(grammar.oov.is_empty());
    }

    #[test]
    fn test_start_state_self_loop_always_present() {
        let mut table = words();
        let grammar = build_grammar(&mut table, &Skill::default()).unwrap();
        let restart = table.get(RESTART).unwrap();
        assert_eq!(grammar.arcs, vec![arc(0, 0, 1, restart)]);
        assert_ne!(grammar.start, grammar.final_state);
    }

    #[test]
    fn test_one_tag_arc_per_intent() {
        let mut table = words();
        let s = skill(
            vec![],
            vec![
                Intent::new("Greet").utterance("hello").utterance("hello world"),
                Intent::new("Leave").utterance("to"),
            ],
        );
        let grammar = build_grammar(&mut table, &s).unwrap();

        for intent in &s.intents {
            let tag = table.get(&intent.tag()).unwrap();
            let tag_arcs: Vec<&FstArc> = grammar
                .arcs_from(grammar.start)
                .filter(|a| a.olabel == tag)
                .collect();
            assert_eq!(tag_arcs.len(), 1);
            assert_eq!(tag_arcs[0].ilabel, 0);
            assert_ne!(tag_arcs[0].dst, grammar.start);
        }
        let entries: Vec<StateId> = grammar
            .arcs_from(grammar.start)
            .filter(|a| a.ilabel == 0)
            .map(|a| a.dst)
            .collect();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0], entries[1]);
    }

    #[test]
    fn test_tags_minted_in_intent_order() {
        let mut table = words();
        let s = skill(vec![], vec![Intent::new("B"), Intent::new("A")]);
        build_grammar(&mut table, &s).unwrap();
        assert_eq!(table.get(RESTART), Some(9));
        assert_eq!(table.get("[B]"), Some(10));
        assert_eq!(table.get("[A]"), Some(11));
    }

    #[test]
    fn test_slot_fan_out_matches_value_count() {
        let mut table = words();
        let s = skill(
            vec![SlotType::new(
                "CITY",
                vec!["boston".into(), "york".into(), "new".into()],
            )],
            vec![Intent::with_slots("Fly", [("to", "CITY")])
                .unwrap()
                .utterance("fly to {to}")],
        );
        let grammar = build_grammar(&mut table, &s).unwrap();

        // states: 0 start, 1 final, 2 entry, 3 after "fly", 4 after "to"
        let into_final: Vec<&FstArc> = grammar
            .arcs
            .iter()
            .filter(|a| a.src == 4 && a.dst == grammar.final_state)
            .collect();
        assert_eq!(into_final.len(), 3);
        let labels: Vec<Label> = into_final.iter().map(|a| a.ilabel).collect();
        assert_eq!(labels, vec![8, 7, 6]);
    }

    #[test]
    fn test_multi_word_value_gets_inner_state() {
        let mut table = words();
        let s = skill(
            vec![SlotType::new("CITY", vec!["new york".into()])],
            vec![Intent::with_slots("Fly", [("to", "CITY")])
                .unwrap()
                .utterance("{to}")],
        );
        let grammar = build_grammar(&mut table, &s).unwrap();
        let restart = table.get(RESTART).unwrap();

        // 0 start, 1 final, 2 entry, 3 between "new" and "york"
        assert_eq!(grammar.num_states, 4);
        assert!(grammar.arcs.contains(&arc(2, 3, 6, 6)));
        assert!(grammar.arcs.contains(&arc(3, 1, 7, 7)));
        assert!(grammar.arcs.contains(&arc(3, 0, 1, restart)));
    }

    #[test]
    fn test_every_inner_state_can_restart() {
        let mut table = words();
        let s = skill(
            vec![SlotType::new(
                "CITY",
                vec!["new york".into(), "boston".into()],
            )],
            vec![
                Intent::with_slots("Fly", [("to", "CITY")])
                    .unwrap()
                    .utterance("fly to {to}")
                    .utterance("{to} to boston"),
                Intent::new("Hi").utterance("hello world"),
            ],
        );
        let grammar = build_grammar(&mut table, &s).unwrap();
        let restart = table.get(RESTART).unwrap();

        let entries: Vec<StateId> = grammar
            .arcs_from(grammar.start)
            .filter(|a| a.ilabel == 0)
            .map(|a| a.dst)
            .collect();
        for state in 0..grammar.num_states {
            if state == grammar.final_state || entries.contains(&state) {
                continue;
            }
            assert!(
                grammar.arcs.contains(&arc(state, grammar.start, 1, restart)),
                "state {state} has no recovery arc"
            );
        }
        assert!(grammar.arcs_from(grammar.final_state).next().is_none());
    }

    #[test]
    fn test_unknown_word_becomes_unk_arc() {
        let mut table = words();
        let s = skill(vec![], vec![Intent::new("Magic").utterance("xyzzy")]);
        let grammar = build_grammar(&mut table, &s).unwrap();

        assert!(grammar.arcs.contains(&arc(2, 1, 1, 1)));
        assert_eq!(
            grammar.oov,
            vec![OovToken {
                token: "xyzzy".into(),
                intent: "Magic".into(),
                slot_type: None,
            }]
        );
    }

    #[test]
    fn test_unknown_slot_value_token_is_reported() {
        let mut table = words();
        let s = skill(
            vec![SlotType::new("CITY", vec!["new jersey".into()])],
            vec![Intent::with_slots("Fly", [("to", "CITY")])
                .unwrap()
                .utterance("{to}")],
        );
        let grammar = build_grammar(&mut table, &s).unwrap();
        assert_eq!(grammar.oov.len(), 1);
        assert_eq!(grammar.oov[0].token, "jersey");
        assert_eq!(grammar.oov[0].slot_type.as_deref(), Some("CITY"));
        assert!(grammar.arcs.contains(&arc(3, 1, 1, 1)));
    }

    #[test]
    fn test_empty_utterance_is_epsilon_path() {
        let mut table = words();
        let s = skill(vec![], vec![Intent::new("Nothing").utterance("")]);
        let grammar = build_grammar(&mut table, &s).unwrap();
        assert_eq!(grammar.num_states, 3);
        assert_eq!(grammar.arcs.last(), Some(&arc(2, 1, 0, 0)));
    }

    #[test]
    fn test_single_word_utterance_has_no_inner_state() {
        let mut table = words();
        let s = skill(vec![], vec![Intent::new("Hi").utterance("hello")]);
        let grammar = build_grammar(&mut table, &s).unwrap();
        assert_eq!(grammar.num_states, 3);
        assert_eq!(grammar.arcs.last(), Some(&arc(2, 1, 2, 2)));
    }

    #[test]
    fn test_tag_collision_is_fatal() {
        let mut table = words();
        table.mint("[Hi]").unwrap();
        let s = skill(vec![], vec![Intent::new("Hi").utterance("hello")]);
        assert!(matches!(
            build_grammar(&mut table, &s),
            Err(crate::GrammarError::SymbolCollision(ref t)) if t == "[Hi]"
        ));
    }

    #[test]
    fn test_undeclared_slot_fails_before_minting() {
        let mut table = words();
        let s = skill(vec![], vec![Intent::new("Fly").utterance("fly to {city}")]);
        assert!(matches!(
            build_grammar(&mut table, &s),
            Err(crate::GrammarError::UndeclaredSlot { .. })
        ));
        assert!(!table.contains(RESTART));
    }

    #[test]
    fn test_build_is_deterministic() {
        let s = hello_skill();
        let mut first_table = words();
        let mut second_table = words();
        let first = build_grammar(&mut first_table, &s).unwrap();
        let second = build_grammar(&mut second_table, &s).unwrap();
        assert_eq!(first.arcs, second.arcs);
        assert_eq!(first_table.sorted_by_id(), second_table.sorted_by_id());
    }

    #[test]
    fn test_state_allocator_counts_up() {
        let mut states = StateAllocator::new();
        assert_eq!(states.next_state(), 0);
        assert_eq!(states.next_state(), 1);
        assert_eq!(states.next_state(), 2);
        assert_eq!(states.count(), 3);
    }

    #[test]
    fn test_non_ascii_words_are_not_split() {
        use crate::symbols::to_symbol_form;
        // "Å" and "à" end in the bytes 0x85 and 0xA0.
        let mut table = WordTable::parse("<eps> 0\n<unk> 1\nÅse 2\nvoilà 3\n".as_bytes()).unwrap();
        let s = skill(
            vec![],
            vec![Intent::new("Hi").utterance(to_symbol_form("Åse voilà"))],
        );
        let grammar = build_grammar(&mut table, &s).unwrap();
        assert!(grammar.oov.is_empty());
        assert!(grammar.arcs.contains(&arc(2, 3, 2, 2)));
        assert!(grammar.arcs.contains(&arc(3, 1, 3, 3)));
    }

    struct WarnCapture(Arc<Mutex<Vec<String>>>);

    struct FieldText(String);

    impl Visit for FieldText {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if !self.0.is_empty() {
                self.0.push(' ');
            }
            self.0.push_str(&format!("{}={:?}", field.name(), value));
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for WarnCapture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() != tracing::Level::WARN {
                return;
            }
            let mut fields = FieldText(String::new());
            event.record(&mut fields);
            self.0.lock().unwrap().push(fields.0);
        }
    }

    #[test]
    fn test_unknown_word_logs_one_warning() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(WarnCapture(events.clone()));
        let mut table = words();
        let s = skill(vec![], vec![Intent::new("Magic").utterance("hello xyzzy")]);
        let grammar =
            tracing::subscriber::with_default(subscriber, || build_grammar(&mut table, &s)).unwrap();
        assert_eq!(grammar.oov.len(), 1);

        let events = events.lock().unwrap();
        let unknown: Vec<&String> = events.iter().filter(|e| e.contains("token=xyzzy")).collect();
        assert_eq!(unknown.len(), 1);
        assert!(unknown[0].contains("intent=Magic"));
        assert!(unknown[0].contains("not in the word table"));
        assert_eq!(events.len(), 1);
    }
}
