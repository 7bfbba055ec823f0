// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trace file reader.
//!
//! Parses a recorded CSV trace into per-file action streams, accumulating
//! the recorded durations into the reference statistics as it goes. Traces
//! with a `.zst` extension are decompressed transparently.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::stats::ActionStats;
use crate::types::{ActionRecord, ActionStream};

pub struct TraceReader {
    streams: HashMap<u64, ActionStream>,
}

impl TraceReader {
    /// Load a trace, feeding reference durations into the global registry.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with(path, &ActionStats::global())
    }

    /// Load a trace, feeding reference durations into `stats`.
    pub fn from_file_with<P: AsRef<Path>>(path: P, stats: &ActionStats) -> Result<Self> {
        let path = path.as_ref();
        let is_compressed = path.extension().is_some_and(|ext| ext == "zst");
        let file = File::open(path)
            .with_context(|| format!("failed to open trace file: {}", path.display()))?;

        let reader: Box<dyn BufRead> = if is_compressed {
            let decoder = zstd::stream::read::Decoder::new(file)
                .context("failed to create zstd decoder")?;
            Box::new(BufReader::new(decoder))
        } else {
            Box::new(BufReader::new(file))
        };

        let loaded = Self::parse(reader, stats)?;
        info!(
            files = loaded.file_count(),
            actions = loaded.len(),
            compressed = is_compressed,
            "loaded trace"
        );
        Ok(loaded)
    }

    /// Parse trace lines from any reader. Empty lines are skipped; any
    /// malformed line aborts the load.
    pub fn parse<R: BufRead>(reader: R, stats: &ActionStats) -> Result<Self> {
        let mut streams: HashMap<u64, ActionStream> = HashMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("failed to read trace line {}", line_no + 1))?;
            if line.is_empty() {
                continue;
            }
            let record = ActionRecord::parse_line(&line)
                .with_context(|| format!("invalid trace line {}", line_no + 1))?;

            stats.record_reference(&record.action, record.duration());
            streams.entry(record.file_id).or_default().push(record);
        }

        Ok(TraceReader { streams })
    }

    pub fn streams(&self) -> &HashMap<u64, ActionStream> {
        &self.streams
    }

    pub fn into_streams(self) -> HashMap<u64, ActionStream> {
        self.streams
    }

    pub fn file_count(&self) -> usize {
        self.streams.len()
    }

    /// Total number of actions across all files.
    pub fn len(&self) -> usize {
        self.streams.values().map(ActionStream::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
