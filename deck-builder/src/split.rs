use std::path::{Path, PathBuf};

use crate::deck::Deck;
use crate::error::Result;

/// Cut the deck into frequency parts.
///
/// With boundaries `[b1, b2]` part 1 holds primary indices up to `b1`,
/// part 2 those in `(b1, b2]` and part 3 the rest. Row order inside a part
/// follows the deck.
pub fn split(deck: &Deck, boundaries: &[u64]) -> Result<Vec<Deck>> {
    let mut parts = vec![Vec::new(); boundaries.len() + 1];
    for row in deck.iter() {
        let part = boundaries.partition_point(|boundary| *boundary < row.index.primary);
        parts[part].push(row.clone());
    }
    parts
        .into_iter()
        .map(|rows| Deck::new(rows, deck.granularity()))
        .collect()
}

/// `<dir>/<stem>-<n>.csv` for parts numbered from 1
pub fn part_path(deck_path: &Path, part: usize) -> PathBuf {
    let stem = deck_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deck".to_string());
    deck_path.with_file_name(format!("{stem}-{part}.csv"))
}

/// Write every part next to the deck, empty parts included.
pub fn write_parts(deck: &Deck, boundaries: &[u64], deck_path: &Path) -> Result<Vec<PathBuf>> {
    split(deck, boundaries)?
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let path = part_path(deck_path, i + 1);
            part.save(&path)?;
            log::info!("Wrote {} rows to {}", part.len(), path.display());
            Ok(path)
        })
        .collect()
}
