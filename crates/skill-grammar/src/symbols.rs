//! Word symbol table shared with the decoder.
//!
//! `words.txt` is read and written as latin-1: every byte maps to exactly one
//! `char`, so tokens that are raw bytes survive a load/save cycle unchanged.

use crate::error::{GrammarError, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Integer id of a word (an arc label).
pub type Label = u32;

pub const EPSILON: &str = "<eps>";
pub const UNKNOWN: &str = "<unk>";
/// Output label for "drop this word and start listening for a new utterance".
pub const RESTART: &str = "[restart]";

#[derive(Debug, Default, Clone)]
pub struct WordTable {
    ids: HashMap<String, Label>,
    used: HashSet<Label>,
    next_id: Label,
}

impl WordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Label)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (idx, (token, id)) in entries.into_iter().enumerate() {
            table.insert_loaded(idx + 1, token.into(), id)?;
        }
        Ok(table)
    }

    /// Parse the `token id` line format from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = decode_latin1(bytes);
        let mut table = Self::new();
        for (idx, line) in text.lines().enumerate() {
            let fields: Vec<&str> = line
                .split(|c: char| c.is_ascii_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            match fields.as_slice() {
                [] => continue,
                [token, id] => {
                    let id = id.parse::<Label>().map_err(|e| GrammarError::SymbolTable {
                        line: idx + 1,
                        reason: format!("bad id {id:?}: {e}"),
                    })?;
                    table.insert_loaded(idx + 1, (*token).to_string(), id)?;
                }
                _ => {
                    return Err(GrammarError::SymbolTable {
                        line: idx + 1,
                        reason: format!("expected `token id`, found {} fields", fields.len()),
                    })
                }
            }
        }
        Ok(table)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::parse(&bytes)
    }

    fn insert_loaded(&mut self, line: usize, token: String, id: Label) -> Result<()> {
        if self.ids.contains_key(&token) {
            return Err(GrammarError::SymbolTable {
                line,
                reason: format!("duplicate token {token}"),
            });
        }
        if !self.used.insert(id) {
            return Err(GrammarError::SymbolTable {
                line,
                reason: format!("id {id} is already taken"),
            });
        }
        self.next_id = self.next_id.max(id + 1);
        self.ids.insert(token, id);
        Ok(())
    }

    pub fn get(&self, token: &str) -> Option<Label> {
        self.ids.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    /// Look up a symbol the grammar cannot be built without.
    pub fn reserved(&self, token: &'static str) -> Result<Label> {
        self.get(token)
            .ok_or(GrammarError::MissingReservedSymbol(token))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id the next call to [`WordTable::mint`] will hand out.
    pub fn next_id(&self) -> Label {
        self.next_id
    }

    /// Add a new synthetic token and return its freshly allocated id.
    ///
    /// Ids count up from one past the largest id loaded. Minting a token that
    /// is already in the table is a fatal input error.
    pub fn mint(&mut self, token: &str) -> Result<Label> {
        if self.ids.contains_key(token) {
            return Err(GrammarError::SymbolCollision(token.to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.used.insert(id);
        self.ids.insert(token.to_string(), id);
        Ok(id)
    }

    pub fn sorted_by_id(&self) -> Vec<(&str, Label)> {
        let mut entries: Vec<(&str, Label)> =
            self.ids.iter().map(|(t, &id)| (t.as_str(), id)).collect();
        entries.sort_by_key(|&(_, id)| id);
        entries
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (token, id) in self.sorted_by_id() {
            out.extend(encode_latin1(token)?);
            out.extend(format!(" {id}\n").bytes());
        }
        Ok(out)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_bytes()?)?;
        Ok(())
    }
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub fn encode_latin1(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| GrammarError::NotLatin1(text.to_string())))
        .collect()
}

/// Put UTF-8 text into the table's one-char-per-byte form, so `café` from a
/// skill file matches `café` read from a UTF-8 `words.txt`.
pub fn to_symbol_form(text: &str) -> String {
    decode_latin1(text.as_bytes())
}

/// Readable form of a table token, for log lines.
pub fn display_symbol(token: &str) -> String {
    match encode_latin1(token) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => token.to_string(),
    }
}
