use crate::error::Result;
use std::path::Path;

/// External tools that turn the arc list into a decode graph.
pub trait FstToolchain {
    /// Compile an OpenFst text arc list into an ilabel-sorted binary FST.
    fn compile_grammar(&self, arc_list: &str) -> Result<Vec<u8>>;

    /// Compose `lang/G.fst` with the acoustic model into a decode graph.
    fn make_decode_graph(&self, lang_dir: &Path, model_dir: &Path, graph_dir: &Path)
        -> Result<()>;
}
