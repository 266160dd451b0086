use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::baseform::BaseformOverrides;
use crate::config::Paths;
use crate::deck::Deck;
use crate::error::Result;
use crate::index::IndexGranularity;
use crate::ledger::WordCountLedger;

/// Write a file through a temporary sibling and rename it into place, so a
/// crash mid-write leaves the previous version intact.
pub fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut dyn Write) -> Result<()>,
) -> Result<()> {
    let parent_dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(&temp_file);
        write(&mut writer)?;
        writer.flush()?;
    }
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Where the partitioner records its progress between steps
pub trait Checkpoint {
    fn deck(&self, deck: &Deck) -> Result<()>;
    fn ledger(&self, ledger: &WordCountLedger) -> Result<()>;
    fn overrides(&self, overrides: &BaseformOverrides) -> Result<()>;
}

/// Checkpoints written over the pipeline's own input files
#[derive(Debug, Clone)]
pub struct DiskCheckpoint {
    deck: PathBuf,
    word_counts: PathBuf,
    baseform_overrides: PathBuf,
    granularity: IndexGranularity,
}

impl DiskCheckpoint {
    pub fn new(paths: &Paths, granularity: IndexGranularity) -> Self {
        Self {
            deck: paths.deck.clone(),
            word_counts: paths.word_counts.clone(),
            baseform_overrides: paths.baseform_overrides.clone(),
            granularity,
        }
    }
}

impl Checkpoint for DiskCheckpoint {
    fn deck(&self, deck: &Deck) -> Result<()> {
        log::debug!("Checkpointing {} rows to {}", deck.len(), self.deck.display());
        deck.save(&self.deck)
    }

    fn ledger(&self, ledger: &WordCountLedger) -> Result<()> {
        log::debug!(
            "Checkpointing {} lemma counts to {}",
            ledger.len(),
            self.word_counts.display()
        );
        ledger.save(&self.word_counts)
    }

    fn overrides(&self, overrides: &BaseformOverrides) -> Result<()> {
        overrides.save(&self.baseform_overrides, self.granularity)
    }
}

/// Keeps everything in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCheckpoint;

impl Checkpoint for NoCheckpoint {
    fn deck(&self, _deck: &Deck) -> Result<()> {
        Ok(())
    }

    fn ledger(&self, _ledger: &WordCountLedger) -> Result<()> {
        Ok(())
    }

    fn overrides(&self, _overrides: &BaseformOverrides) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomically_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        write_atomically(&path, |w| Ok(w.write_all(b"first\n")?)).unwrap();
        write_atomically(&path, |w| Ok(w.write_all(b"second\n")?)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
        // no temp files left behind
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_keeps_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_atomically(&path, |w| Ok(w.write_all(b"kept\n")?)).unwrap();
        let result = write_atomically(&path, |w| {
            w.write_all(b"partial")?;
            Err(crate::error::DeckError::EmptySentence)
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn test_disk_checkpoint_writes_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths {
            deck: dir.path().join("deck.csv"),
            word_counts: dir.path().join("word-count.csv"),
            baseform_overrides: dir.path().join("overrides.csv"),
            ..Paths::default()
        };
        let granularity = IndexGranularity::default();
        let deck = Deck::read_from("1|Hund|||s||Hund;bellen\n".as_bytes(), granularity).unwrap();
        let checkpoint = DiskCheckpoint::new(&paths, granularity);
        checkpoint.deck(&deck).unwrap();
        checkpoint
            .ledger(&WordCountLedger::from_deck(&deck, ';'))
            .unwrap();
        checkpoint.overrides(&BaseformOverrides::default()).unwrap();

        assert_eq!(Deck::load(&paths.deck, granularity).unwrap(), deck);
        assert_eq!(
            std::fs::read_to_string(&paths.word_counts).unwrap(),
            "Hund|1\nbellen|1\n"
        );
        assert_eq!(std::fs::read_to_string(&paths.baseform_overrides).unwrap(), "");
    }
}
