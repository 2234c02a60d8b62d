//! Deduplicated in-memory record set with incremental append-only
//! persistence, so multi-hour runs survive interruption.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::app::Result;

struct OutputState {
    /// Every record seen, superset of `persisted`.
    collected: HashSet<String>,
    /// Records already flushed to the output file.
    persisted: HashSet<String>,
    /// How many lines the output file held before this run.
    prior_lines: usize,
}

/// Merges record batches from all workers into one deduplicated set and
/// appends the not-yet-persisted difference to the output file on flush.
///
/// Both sets live behind one lock, and the file is only written inside the
/// locked flush, so concurrent workers never race on file writes.
pub struct ResultAggregator {
    path: PathBuf,
    state: Mutex<OutputState>,
}

impl ResultAggregator {
    /// Open the aggregator, reconciling against an existing output file so
    /// re-runs never duplicate lines already on disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut persisted = HashSet::new();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            persisted.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from),
            );
            tracing::info!(
                "loaded {} existing records from {}",
                persisted.len(),
                path.display()
            );
        }

        let prior_lines = persisted.len();
        Ok(Self {
            path,
            state: Mutex::new(OutputState {
                collected: persisted.clone(),
                persisted,
                prior_lines,
            }),
        })
    }

    /// Set-union merge; commutative and idempotent, so final content is
    /// independent of worker/page arrival order. Returns how many records
    /// were new.
    pub fn absorb<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.state.lock().expect("aggregator lock poisoned");
        let before = state.collected.len();
        state.collected.extend(records);
        state.collected.len() - before
    }

    /// Append `collected - persisted` to the output file as one write, then
    /// mark it persisted. A no-op when there is nothing new. Errors leave
    /// the difference unpersisted; it is retried on the next flush.
    pub fn flush(&self) -> Result<usize> {
        let mut state = self.state.lock().expect("aggregator lock poisoned");

        let new_records: Vec<String> = state
            .collected
            .difference(&state.persisted)
            .cloned()
            .collect();
        if new_records.is_empty() {
            return Ok(0);
        }

        let mut buffer = String::with_capacity(new_records.len() * 24);
        for record in &new_records {
            buffer.push_str(record);
            buffer.push('\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buffer.as_bytes())?;

        let count = new_records.len();
        state.persisted.extend(new_records);
        Ok(count)
    }

    /// Records collected during this run (excluding lines loaded from a
    /// prior run's output file).
    pub fn new_this_run(&self) -> usize {
        let state = self.state.lock().expect("aggregator lock poisoned");
        state.collected.len() - state.prior_lines
    }

    pub fn persisted_len(&self) -> usize {
        self.state
            .lock()
            .expect("aggregator lock poisoned")
            .persisted
            .len()
    }

    pub fn collected_len(&self) -> usize {
        self.state
            .lock()
            .expect("aggregator lock poisoned")
            .collected
            .len()
    }

    /// Memory-hygiene pass: drop spare capacity accumulated by growth.
    pub fn shrink(&self) {
        let mut state = self.state.lock().expect("aggregator lock poisoned");
        state.collected.shrink_to_fit();
        state.persisted.shrink_to_fit();
    }

    pub fn output_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn output_path(dir: &TempDir) -> PathBuf {
        dir.path().join("results.txt")
    }

    fn file_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_absorb_is_set_union() {
        let dir = TempDir::new().unwrap();
        let agg = ResultAggregator::open(output_path(&dir)).unwrap();

        assert_eq!(agg.absorb(vec!["a".into(), "b".into()]), 2);
        assert_eq!(agg.absorb(vec!["b".into(), "c".into()]), 1);
        assert_eq!(agg.collected_len(), 3);
    }

    #[test]
    fn test_flush_appends_difference_once() {
        let dir = TempDir::new().unwrap();
        let path = output_path(&dir);
        let agg = ResultAggregator::open(&path).unwrap();

        agg.absorb(vec!["a".into(), "b".into()]);
        assert_eq!(agg.flush().unwrap(), 2);

        // Idempotent: nothing new, nothing written.
        assert_eq!(agg.flush().unwrap(), 0);

        agg.absorb(vec!["b".into(), "c".into()]);
        assert_eq!(agg.flush().unwrap(), 1);

        let mut lines = file_lines(&path);
        lines.sort();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_persisted_subset_of_collected() {
        let dir = TempDir::new().unwrap();
        let agg = ResultAggregator::open(output_path(&dir)).unwrap();

        agg.absorb(vec!["a".into(), "b".into(), "c".into()]);
        agg.flush().unwrap();
        agg.absorb(vec!["d".into()]);

        assert!(agg.persisted_len() <= agg.collected_len());
        agg.flush().unwrap();
        assert_eq!(agg.persisted_len(), agg.collected_len());
    }

    #[test]
    fn test_rerun_never_duplicates_existing_lines() {
        let dir = TempDir::new().unwrap();
        let path = output_path(&dir);

        {
            let agg = ResultAggregator::open(&path).unwrap();
            agg.absorb(vec!["a".into(), "b".into()]);
            agg.flush().unwrap();
        }

        // Second run re-collects an overlapping set.
        let agg = ResultAggregator::open(&path).unwrap();
        assert_eq!(agg.persisted_len(), 2);
        agg.absorb(vec!["b".into(), "c".into()]);
        assert_eq!(agg.new_this_run(), 1);
        agg.flush().unwrap();

        let mut lines = file_lines(&path);
        let total = lines.len();
        lines.sort();
        lines.dedup();
        assert_eq!(lines.len(), total, "no line written twice across runs");
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_order_independence() {
        let dir = TempDir::new().unwrap();
        let path_one = dir.path().join("one.txt");
        let path_two = dir.path().join("two.txt");

        let batches: Vec<Vec<String>> = vec![
            vec!["a".into(), "b".into()],
            vec!["c".into()],
            vec!["a".into(), "c".into(), "d".into()],
        ];

        let one = ResultAggregator::open(&path_one).unwrap();
        for batch in &batches {
            one.absorb(batch.clone());
        }

        let two = ResultAggregator::open(&path_two).unwrap();
        for batch in batches.iter().rev() {
            two.absorb(batch.clone());
        }

        assert_eq!(one.collected_len(), two.collected_len());
        one.flush().unwrap();
        two.flush().unwrap();

        let mut lines_one = file_lines(&path_one);
        let mut lines_two = file_lines(&path_two);
        lines_one.sort();
        lines_two.sort();
        assert_eq!(lines_one, lines_two);
    }
}
