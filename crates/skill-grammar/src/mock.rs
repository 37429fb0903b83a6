use crate::error::{GrammarError, Result};
use crate::FstToolchain;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    CompileGrammar { arc_list: String },
    MakeDecodeGraph {
        lang_dir: PathBuf,
        model_dir: PathBuf,
        graph_dir: PathBuf,
    },
}

/// Records calls instead of running anything; the "compiled" grammar is the
/// arc list itself.
#[derive(Debug, Default)]
pub struct MockToolchain {
    calls: RefCell<Vec<ToolCall>>,
    fail_compile: bool,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A toolchain whose compiler always exits non-zero.
    pub fn failing() -> Self {
        Self {
            fail_compile: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.borrow().clone()
    }
}

impl FstToolchain for MockToolchain {
    fn compile_grammar(&self, arc_list: &str) -> Result<Vec<u8>> {
        self.calls.borrow_mut().push(ToolCall::CompileGrammar {
            arc_list: arc_list.to_string(),
        });
        if self.fail_compile {
            return Err(GrammarError::ToolFailed {
                tool: "fstcompile".into(),
                status: "exit status: 1".into(),
                stderr: "mock compiler failure".into(),
            });
        }
        Ok(arc_list.as_bytes().to_vec())
    }

    fn make_decode_graph(
        &self,
        lang_dir: &Path,
        model_dir: &Path,
        graph_dir: &Path,
    ) -> Result<()> {
        self.calls.borrow_mut().push(ToolCall::MakeDecodeGraph {
            lang_dir: lang_dir.to_path_buf(),
            model_dir: model_dir.to_path_buf(),
            graph_dir: graph_dir.to_path_buf(),
        });
        fs::create_dir_all(graph_dir)?;
        fs::write(graph_dir.join("HCLG.fst"), b"mock")?;
        Ok(())
    }
}
