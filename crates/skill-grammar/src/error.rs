use thiserror::Error;

pub type Result<T, E = GrammarError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("reserved symbol missing from word table: {0}")]
    MissingReservedSymbol(&'static str),
    #[error("symbol already present in word table: {0}")]
    SymbolCollision(String),
    #[error("word table line {line}: {reason}")]
    SymbolTable { line: usize, reason: String },
    #[error("symbol cannot be written as latin-1: {0}")]
    NotLatin1(String),
    #[error("intent {intent}: slot {slot} has undefined type {slot_type}")]
    UnknownSlotType {
        intent: String,
        slot: String,
        slot_type: String,
    },
    #[error("intent {intent}: utterance references undeclared slot {{{slot}}}")]
    UndeclaredSlot { intent: String, slot: String },
    #[error("duplicate intent: {0}")]
    DuplicateIntent(String),
    #[error("intent {intent}: duplicate slot {slot}")]
    DuplicateSlot { intent: String, slot: String },
    #[error("utterance line {line}: unknown intent {intent}")]
    UnknownIntent { line: usize, intent: String },
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("toolchain configuration: {0}")]
    Toolchain(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
