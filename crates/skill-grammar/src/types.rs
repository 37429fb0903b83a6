use crate::error::{GrammarError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// An enumerated slot type: one phrase per accepted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotType {
    pub name: String,
    pub values: Vec<String>,
}

impl SlotType {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Split a value phrase into the words the recognizer hears.
    ///
    /// Spaces and hyphens are both word breaks; empty pieces are dropped.
    pub fn value_tokens(value: &str) -> Vec<&str> {
        static SPLIT: OnceLock<Regex> = OnceLock::new();
        let split =
            SPLIT.get_or_init(|| Regex::new(r"[ -]").expect("Invalid regex pattern - this is a bug"));
        split.split(value).filter(|t| !t.is_empty()).collect()
    }
}

/// A voice command with its slots and template utterances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub name: String,
    /// Slot name to slot type name.
    pub slots: BTreeMap<String, String>,
    pub utterances: Vec<String>,
}

impl Intent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: BTreeMap::new(),
            utterances: Vec::new(),
        }
    }

    pub fn with_slots<I, S, T>(name: impl Into<String>, slots: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut intent = Self::new(name);
        for (slot, slot_type) in slots {
            let slot = slot.into();
            if intent.slots.contains_key(&slot) {
                return Err(GrammarError::DuplicateSlot {
                    intent: intent.name,
                    slot,
                });
            }
            intent.slots.insert(slot, slot_type.into());
        }
        Ok(intent)
    }

    pub fn utterance(mut self, utterance: impl Into<String>) -> Self {
        self.utterances.push(utterance.into());
        self
    }

    /// Output symbol the decoder emits when this intent is entered.
    pub fn tag(&self) -> String {
        format!("[{}]", self.name)
    }
}

/// `{slot}` tokens name a slot; anything else is a literal word.
pub fn slot_reference(token: &str) -> Option<&str> {
    token.strip_prefix('{')?.strip_suffix('}')
}

/// Everything the grammar is built from.
///
/// Names, values and utterances are in the word table's one-char-per-byte
/// form; words are separated by ASCII whitespace only.
#[derive(Debug, Clone, Default)]
pub struct Skill {
    pub types: BTreeMap<String, SlotType>,
    /// In definition order; tag ids are minted in this order.
    pub intents: Vec<Intent>,
}

impl Skill {
    pub fn new(types: BTreeMap<String, SlotType>, intents: Vec<Intent>) -> Result<Self> {
        let mut seen = std::collections::BTreeSet::new();
        for intent in &intents {
            if !seen.insert(intent.name.as_str()) {
                return Err(GrammarError::DuplicateIntent(intent.name.clone()));
            }
        }
        Ok(Self { types, intents })
    }

    pub fn intent_mut(&mut self, name: &str) -> Option<&mut Intent> {
        self.intents.iter_mut().find(|i| i.name == name)
    }

    /// Resolve a `{slot}` reference inside one of `intent`'s utterances.
    pub fn slot_type(&self, intent: &Intent, slot: &str) -> Result<&SlotType> {
        let type_name = intent
            .slots
            .get(slot)
            .ok_or_else(|| GrammarError::UndeclaredSlot {
                intent: intent.name.clone(),
                slot: slot.to_string(),
            })?;
        self.types
            .get(type_name)
            .ok_or_else(|| GrammarError::UnknownSlotType {
                intent: intent.name.clone(),
                slot: slot.to_string(),
                slot_type: type_name.clone(),
            })
    }

    /// Check every slot declaration and every slot reference up front.
    pub fn validate(&self) -> Result<()> {
        for intent in &self.intents {
            for slot in intent.slots.keys() {
                self.slot_type(intent, slot)?;
            }
            for utterance in &intent.utterances {
                for token in utterance.split_ascii_whitespace() {
                    if let Some(slot) = slot_reference(token) {
                        self.slot_type(intent, slot)?;
                    }
                }
            }
        }
        Ok(())
    }
}
