//! OpenFst text format: `src dst ilabel olabel weight` per arc, then
//! `state weight` per final state. `fstcompile` takes the source of the first
//! line as the start state, so arcs are written before the final marker.

use crate::graph::{Grammar, ZERO_WEIGHT};
use std::fmt;
use std::io::{self, Write};

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arc in &self.arcs {
            writeln!(
                f,
                "{} {} {} {} {}",
                arc.src, arc.dst, arc.ilabel, arc.olabel, arc.weight
            )?;
        }
        writeln!(f, "{} {}", self.final_state, ZERO_WEIGHT)
    }
}

pub fn write_arc_list<W: Write>(grammar: &Grammar, mut out: W) -> io::Result<()> {
    write!(out, "{grammar}")?;
    out.flush()
}

pub fn to_arc_list(grammar: &Grammar) -> String {
    grammar.to_string()
}
