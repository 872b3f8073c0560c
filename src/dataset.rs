//! Streaming text corpus
//!
//! Line-oriented reader over a UTF-8 corpus file that rewinds on
//! exhaustion, so fixed-step training can iterate indefinitely. Dataset
//! exhaustion is recovered locally and never surfaced as an error.

use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub struct TextStream {
    path: PathBuf,
    reader: BufReader<File>,
}

impl TextStream {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("Failed to open corpus file {:?}", path))?;
        anyhow::ensure!(
            file.metadata()
                .with_context(|| format!("Failed to stat corpus file {:?}", path))?
                .len()
                > 0,
            "corpus file {:?} is empty",
            path
        );
        Ok(Self {
            path,
            reader: BufReader::new(file),
        })
    }

    /// Next non-blank record, rewinding to the start of the file when the
    /// end is reached.
    pub fn next_text(&mut self) -> Result<String> {
        let mut rewinds = 0usize;
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .with_context(|| format!("Failed to read corpus file {:?}", self.path))?;

            if read == 0 {
                rewinds += 1;
                anyhow::ensure!(
                    rewinds < 2,
                    "corpus file {:?} contains no non-blank lines",
                    self.path
                );
                debug!("Corpus exhausted, restarting stream from {:?}", self.path);
                self.reader
                    .seek(SeekFrom::Start(0))
                    .with_context(|| format!("Failed to rewind corpus file {:?}", self.path))?;
                continue;
            }

            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }

    pub fn next_batch(&mut self, n: usize) -> Result<Vec<String>> {
        (0..n).map(|_| self.next_text()).collect()
    }
}
