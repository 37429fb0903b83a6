use crate::fst_text::to_arc_list;
use crate::graph::{build_grammar, OovToken};
use crate::loader::load_skill_dir;
use crate::symbols::WordTable;
use crate::FstToolchain;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const WORDS_FILE: &str = "words.txt";
pub const GRAMMAR_FILE: &str = "G.fst";

#[derive(Debug, Clone)]
pub struct BuildPaths {
    pub skill_dir: PathBuf,
    pub lang_dir: PathBuf,
    pub model_dir: PathBuf,
    pub graph_dir: PathBuf,
}

impl BuildPaths {
    /// `model_dir` defaults to the directory above `graph_dir`.
    pub fn new(
        skill_dir: impl Into<PathBuf>,
        lang_dir: impl Into<PathBuf>,
        model_dir: Option<PathBuf>,
        graph_dir: impl Into<PathBuf>,
    ) -> Self {
        let graph_dir = graph_dir.into();
        let model_dir = model_dir.unwrap_or_else(|| graph_dir.join(".."));
        Self {
            skill_dir: skill_dir.into(),
            lang_dir: lang_dir.into(),
            model_dir,
            graph_dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub intents: usize,
    pub states: u32,
    pub arcs: usize,
    pub fst_bytes: usize,
    pub oov: Vec<OovToken>,
}

/// Skill definition in, `lang/G.fst` plus a decode graph and its `words.txt` out.
pub fn run(paths: &BuildPaths, toolchain: &dyn FstToolchain) -> anyhow::Result<BuildReport> {
    let words_path = paths.lang_dir.join(WORDS_FILE);
    let mut words = WordTable::load(&words_path)
        .with_context(|| format!("loading words: {}", words_path.display()))?;
    info!(words = words.len(), "loaded word table");

    let skill = load_skill_dir(&paths.skill_dir)?;
    info!(
        slot_types = skill.types.len(),
        intents = skill.intents.len(),
        "loaded skill"
    );

    let grammar = build_grammar(&mut words, &skill)
        .with_context(|| format!("building grammar for {}", paths.skill_dir.display()))?;
    let arc_list = to_arc_list(&grammar);
    info!(bytes = arc_list.len(), "serialized arc list");

    let fst = toolchain.compile_grammar(&arc_list)?;
    let fst_path = paths.lang_dir.join(GRAMMAR_FILE);
    fs::write(&fst_path, &fst).with_context(|| format!("writing {}", fst_path.display()))?;

    info!(graph = %paths.graph_dir.display(), "building decode graph");
    toolchain.make_decode_graph(&paths.lang_dir, &paths.model_dir, &paths.graph_dir)?;

    write_graph_words(&words, &paths.graph_dir)?;

    Ok(BuildReport {
        intents: skill.intents.len(),
        states: grammar.num_states,
        arcs: grammar.arcs.len(),
        fst_bytes: fst.len(),
        oov: grammar.oov,
    })
}

fn write_graph_words(words: &WordTable, graph_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(graph_dir)
        .with_context(|| format!("creating graph dir: {}", graph_dir.display()))?;
    let path = graph_dir.join(WORDS_FILE);
    words
        .save(&path)
        .with_context(|| format!("writing words: {}", path.display()))?;
    Ok(())
}
