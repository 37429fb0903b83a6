use crate::error::GrammarError;
use crate::symbols::{decode_latin1, display_symbol, to_symbol_form};
use crate::types::{Intent, Skill, SlotType};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const INTENTS_FILE: &str = "intents.json";
pub const TYPES_DIR: &str = "alexa-types";
pub const UTTERANCES_FILE: &str = "utterences.txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSchema {
    pub intents: Vec<IntentDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDecl {
    pub intent: String,
    #[serde(default)]
    pub slots: Option<Vec<SlotDecl>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub slot_type: String,
}

/// Load `intents.json`, `alexa-types/` and `utterences.txt` from a skill directory.
///
/// Names and words come back in the word table's one-char-per-byte form, see
/// [`to_symbol_form`].
pub fn load_skill_dir(dir: impl AsRef<Path>) -> anyhow::Result<Skill> {
    let dir = dir.as_ref();
    let types = load_types_dir(dir.join(TYPES_DIR))?;
    let intents = load_intents_file(dir.join(INTENTS_FILE))?;
    let mut skill = Skill::new(types, intents)?;

    let corpus_path = dir.join(UTTERANCES_FILE);
    let corpus = fs::read(&corpus_path)
        .with_context(|| format!("reading utterances: {}", corpus_path.display()))?;
    add_utterances(&mut skill, &decode_latin1(&corpus))
        .with_context(|| format!("parsing utterances: {}", corpus_path.display()))?;

    skill
        .validate()
        .with_context(|| format!("validating skill: {}", dir.display()))?;
    Ok(skill)
}

pub fn load_intents_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<Intent>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading intents: {}", path.display()))?;
    let schema: IntentSchema =
        serde_json::from_str(&raw).with_context(|| format!("parsing json: {}", path.display()))?;
    let mut intents = Vec::with_capacity(schema.intents.len());
    for decl in schema.intents {
        let slots = decl
            .slots
            .unwrap_or_default()
            .into_iter()
            .map(|s| (to_symbol_form(&s.name), to_symbol_form(&s.slot_type)));
        intents.push(Intent::with_slots(to_symbol_form(&decl.intent), slots)?);
    }
    debug!(count = intents.len(), "loaded intents");
    Ok(intents)
}

/// One file per slot type; the file name is the type name.
pub fn load_types_dir(dir: impl AsRef<Path>) -> anyhow::Result<BTreeMap<String, SlotType>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading types dir: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_file() && !hidden {
            paths.push(path);
        }
    }
    paths.sort();

    let mut types = BTreeMap::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| to_symbol_form(&n.to_string_lossy()))
            .unwrap_or_default();
        let raw =
            fs::read(&path).with_context(|| format!("reading slot type: {}", path.display()))?;
        let slot_type = SlotType::new(name.clone(), parse_type_values(&raw));
        debug!(
            slot_type = %display_symbol(&name),
            values = slot_type.values.len(),
            "loaded slot type"
        );
        types.insert(name, slot_type);
    }
    Ok(types)
}

/// One lowercased value per non-blank line.
///
/// UTF-8 files are lowercased as text; anything else only has its ASCII
/// letters folded.
pub fn parse_type_values(raw: &[u8]) -> Vec<String> {
    let lowered = match std::str::from_utf8(raw) {
        Ok(text) => to_symbol_form(&text.to_lowercase()),
        Err(_) => decode_latin1(raw).to_ascii_lowercase(),
    };
    lowered
        .lines()
        .map(|line| trim_ascii(line).to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn trim_ascii(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_ascii_whitespace())
}

/// Append each `IntentName words...` line to its intent's utterances.
pub fn add_utterances(skill: &mut Skill, corpus: &str) -> Result<(), GrammarError> {
    for (idx, line) in corpus.lines().enumerate() {
        let line = trim_ascii(line);
        if line.is_empty() {
            continue;
        }
        let (name, utterance) = line
            .split_once(|c: char| c.is_ascii_whitespace())
            .map(|(name, rest)| (name, trim_ascii(rest)))
            .unwrap_or((line, ""));
        let intent = skill
            .intent_mut(name)
            .ok_or_else(|| GrammarError::UnknownIntent {
                line: idx + 1,
                intent: display_symbol(name),
            })?;
        debug!(intent = %display_symbol(name), utterance = %display_symbol(utterance), "utterance");
        intent.utterances.push(utterance.to_string());
    }
    Ok(())
}
