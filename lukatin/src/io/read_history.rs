//! Tracks which files were read recently.
//!
//! Edits and writes consult this to warn when a file is modified without
//! having been looked at first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFreshness {
    Recent,
    Stale(Duration),
    Never,
}

#[derive(Debug)]
pub struct ReadHistory {
    window: Duration,
    reads: Mutex<HashMap<PathBuf, Instant>>,
}

impl ReadHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            reads: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, path: &Path) {
        self.lock().insert(path.to_path_buf(), Instant::now());
    }

    pub fn freshness(&self, path: &Path) -> ReadFreshness {
        match self.lock().get(path) {
            None => ReadFreshness::Never,
            Some(at) => {
                let age = at.elapsed();
                if age <= self.window {
                    ReadFreshness::Recent
                } else {
                    ReadFreshness::Stale(age)
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Instant>> {
        self.reads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ReadHistory {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}
