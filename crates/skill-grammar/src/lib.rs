//! skill-grammar: compile Alexa-style skills into Kaldi grammar FSTs
//!
//! A skill's intents, slot types and sample utterances become a single
//! non-deterministic acceptor (`G.fst`) whose output labels tag the matched
//! intent. The arc list is compiled and composed into a decode graph by the
//! external OpenFst/Kaldi tools behind [`FstToolchain`].

mod error;
pub use error::{GrammarError, Result};

pub mod symbols;
pub use symbols::{Label, WordTable, EPSILON, RESTART, UNKNOWN};

mod types;
pub use types::{slot_reference, Intent, Skill, SlotType};

pub mod loader;
pub use loader::load_skill_dir;

pub mod graph;
pub use graph::{build_grammar, FstArc, Grammar, OovToken, StateAllocator, StateId};

pub mod fst_text;
pub use fst_text::{to_arc_list, write_arc_list};

mod traits;
pub use traits::FstToolchain;

mod kaldi;
pub use kaldi::{KaldiToolchain, ToolchainConfig};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{MockToolchain, ToolCall};

pub mod pipeline;
pub use pipeline::{run, BuildPaths, BuildReport};
