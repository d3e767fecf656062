//! Plain-text persistence of retention vectors across a power cycle.
//!
//! One entry per line: `AAAAA WWWW label...`, address and word in bare hex.
//! The format is deliberately hand-editable; the verify phase trusts the
//! file, not the canonical vector, so an operator can trim or extend it.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use mram_core::{parse_address, parse_word, VectorEntry};

/// Writes `entries` to `path`, replacing any previous file.
pub fn save(path: &Path, entries: &[VectorEntry]) -> Result<()> {
    let mut text = String::new();
    for entry in entries {
        let _ = writeln!(
            text,
            "{:05X} {:04X} {}",
            entry.address.value(),
            entry.word,
            entry.label
        );
    }
    fs::write(path, text).with_context(|| format!("writing vector file {}", path.display()))
}

/// Reads a vector previously written by [`save`]. Blank lines are skipped;
/// anything else must parse.
pub fn load(path: &Path) -> Result<Vec<VectorEntry>> {
    let text = fs::read_to_string(path).with_context(|| {
        format!(
            "reading vector file {} (run the write phase first)",
            path.display()
        )
    })?;

    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let location = || format!("{}:{}", path.display(), index + 1);

        let mut parts = line.splitn(3, char::is_whitespace);
        let (Some(addr), Some(word)) = (parts.next(), parts.next()) else {
            bail!("{}: expected `<addr> <word> [label]`", location());
        };
        let address = parse_address(addr).with_context(location)?;
        let word = parse_word(word).with_context(location)?;
        let label = parts.next().unwrap_or("").trim().to_string();
        entries.push(VectorEntry {
            address,
            word,
            label,
        });
    }
    if entries.is_empty() {
        bail!("vector file {} holds no entries", path.display());
    }
    Ok(entries)
}
