// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-action latency statistics: reference durations taken from the trace
//! and actual durations observed during replay. A process-global registry is
//! initialized lazily on first use; tests construct their own instances.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

static GLOBAL_STATS: OnceCell<Arc<ActionStats>> = OnceCell::new();

/// Action name -> (cumulative duration seconds, sample count).
type StatMap = Mutex<HashMap<String, (u64, u64)>>;

#[derive(Debug, Default)]
pub struct ActionStats {
    reference: StatMap,
    replayed: StatMap,
}

impl ActionStats {
    pub fn new() -> Self {
        ActionStats::default()
    }

    /// The process-wide registry, reported once before exit.
    pub fn global() -> Arc<ActionStats> {
        GLOBAL_STATS.get_or_init(|| Arc::new(ActionStats::new())).clone()
    }

    /// Record a duration taken from the trace itself.
    pub fn record_reference(&self, action: &str, secs: u64) {
        update(&self.reference, action, secs);
    }

    /// Record a duration observed during replay.
    pub fn record_replayed(&self, action: &str, secs: u64) {
        update(&self.replayed, action, secs);
    }

    /// `(cumulative secs, samples)` for an action in the reference map.
    pub fn reference(&self, action: &str) -> Option<(u64, u64)> {
        self.reference.lock().unwrap().get(action).copied()
    }

    /// `(cumulative secs, samples)` for an action in the replayed map.
    pub fn replayed(&self, action: &str) -> Option<(u64, u64)> {
        self.replayed.lock().unwrap().get(action).copied()
    }

    pub fn reference_average(&self, action: &str) -> Option<f64> {
        self.reference(action).map(|(total, count)| total as f64 / count as f64)
    }

    pub fn replayed_average(&self, action: &str) -> Option<f64> {
        self.replayed(action).map(|(total, count)| total as f64 / count as f64)
    }

    /// Print per-action averages for both maps.
    pub fn report<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Reference average durations per action:")?;
        write_averages(out, &self.reference)?;
        writeln!(out, "Average durations per action:")?;
        write_averages(out, &self.replayed)?;
        Ok(())
    }
}

fn update(map: &StatMap, action: &str, secs: u64) {
    let mut map = map.lock().unwrap();
    let entry = map.entry(action.to_string()).or_insert((0, 0));
    entry.0 += secs;
    entry.1 += 1;
}

fn write_averages<W: io::Write>(out: &mut W, map: &StatMap) -> io::Result<()> {
    let mut rows: Vec<(String, (u64, u64))> =
        map.lock().unwrap().iter().map(|(k, v)| (k.clone(), *v)).collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    for (action, (total, count)) in rows {
        let avg = total as f64 / count as f64;
        writeln!(out, "\t{action}\t: {avg}s")?;
    }
    Ok(())
}
