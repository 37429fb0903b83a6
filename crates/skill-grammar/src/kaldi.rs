//! Kaldi/OpenFst command-line toolchain.
//!
//! Children get `PATH` and `LC_ALL` set explicitly from [`ToolchainConfig`];
//! the parent environment is only read once, when the toolchain is built.

use crate::error::{GrammarError, Result};
use crate::FstToolchain;
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

const STANDARD_BIN_DIRS: &[&str] = &[
    "egs/wsj/s5/utils",
    "tools/openfst/bin",
    "egs/wsj/s5",
    "src/bin",
    "src/fstbin",
    "src/gmmbin",
    "src/featbin",
    "src/lmbin",
    "src/latbin",
    "src/nnet3bin",
    "src/online2bin",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Kaldi checkout the tools are found under.
    pub root: PathBuf,
    /// Searched in order; relative entries are resolved against `root`.
    #[serde(default = "default_bin_dirs")]
    pub bin_dirs: Vec<PathBuf>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_self_loop_scale")]
    pub self_loop_scale: f32,
}

fn default_bin_dirs() -> Vec<PathBuf> {
    STANDARD_BIN_DIRS.iter().map(PathBuf::from).collect()
}

fn default_locale() -> String {
    "C".to_string()
}

fn default_self_loop_scale() -> f32 {
    1.0
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self::for_root("kaldi")
    }
}

impl ToolchainConfig {
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bin_dirs: default_bin_dirs(),
            locale: default_locale(),
            self_loop_scale: default_self_loop_scale(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading toolchain config: {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing toolchain config: {}", path.display()))?;
        Ok(config)
    }

    pub fn resolved_bin_dirs(&self) -> Vec<PathBuf> {
        self.bin_dirs
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.clone()
                } else {
                    self.root.join(dir)
                }
            })
            .collect()
    }
}

pub struct KaldiToolchain {
    config: ToolchainConfig,
    bin_dirs: Vec<PathBuf>,
    search_path: OsString,
}

impl KaldiToolchain {
    pub fn new(config: ToolchainConfig) -> Result<Self> {
        let bin_dirs = config.resolved_bin_dirs();
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let search_path = std::env::join_paths(
            bin_dirs
                .iter()
                .cloned()
                .chain(std::env::split_paths(&inherited)),
        )
        .map_err(|e| GrammarError::Toolchain(format!("bad bin dir: {e}")))?;
        Ok(Self {
            config,
            bin_dirs,
            search_path,
        })
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// First configured bin dir holding `tool`, else the bare name.
    fn locate(&self, tool: &str) -> PathBuf {
        self.bin_dirs
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(tool))
    }

    /// Run one tool to completion. `Command::output` drains stdout and stderr
    /// together, so a chatty child cannot block on a full pipe.
    fn run<I, S>(&self, tool: &str, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = self.locate(tool);
        debug!(tool, program = %program.display(), "running");
        let output = Command::new(&program)
            .args(args)
            .env("PATH", &self.search_path)
            .env("LC_ALL", &self.config.locale)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GrammarError::ToolFailed {
                tool: tool.to_string(),
                status: "not started".to_string(),
                stderr: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(GrammarError::ToolFailed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        if !output.stderr.is_empty() {
            debug!(tool, stderr = %String::from_utf8_lossy(&output.stderr), "tool output");
        }
        Ok(output.stdout)
    }
}

impl FstToolchain for KaldiToolchain {
    fn compile_grammar(&self, arc_list: &str) -> Result<Vec<u8>> {
        let staging = tempfile::tempdir()?;
        let text = staging.path().join("G.txt");
        let unsorted = staging.path().join("G.unsorted.fst");
        let sorted = staging.path().join("G.fst");
        fs::write(&text, arc_list)?;

        self.run("fstcompile", [text.as_os_str(), unsorted.as_os_str()])?;
        self.run(
            "fstarcsort",
            [
                OsStr::new("--sort_type=ilabel"),
                unsorted.as_os_str(),
                sorted.as_os_str(),
            ],
        )?;
        let fst = fs::read(&sorted)?;
        info!(bytes = fst.len(), "compiled grammar fst");
        Ok(fst)
    }

    fn make_decode_graph(
        &self,
        lang_dir: &Path,
        model_dir: &Path,
        graph_dir: &Path,
    ) -> Result<()> {
        let scale = self.config.self_loop_scale.to_string();
        self.run(
            "mkgraph.sh",
            [
                OsStr::new("--self-loop-scale"),
                OsStr::new(&scale),
                lang_dir.as_os_str(),
                model_dir.as_os_str(),
                graph_dir.as_os_str(),
            ],
        )?;
        Ok(())
    }
}
