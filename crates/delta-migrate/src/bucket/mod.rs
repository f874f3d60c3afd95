//! Dependency-level bucketing of rows to insert.
//!
//! Rows are grouped by structural depth so that a whole level can be
//! migrated once every parent it references already exists at the
//! destination. Output goes to caller-supplied buckets, one per level.

pub mod bucketizer;
pub mod grouping;

pub use bucketizer::{bucketize, BucketizeSummary};
pub use grouping::{GroupingStore, MemoryGroupingStore, ParentKey};

use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only, order-preserving output sink for one dependency level.
pub trait Bucket<T> {
    fn append(&mut self, value: T) -> Result<()>;

    /// Number of values appended so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hands out a fresh bucket for each dependency level.
pub trait BucketProvider<T> {
    /// Open the bucket for the next level. The previous bucket is complete.
    fn new_bucket(&mut self) -> Result<&mut dyn Bucket<T>>;
}

impl<T> Bucket<T> for Vec<T> {
    fn append(&mut self, value: T) -> Result<()> {
        self.push(value);
        Ok(())
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Keeps every level in memory.
#[derive(Debug, Default)]
pub struct ListBucketProvider<T> {
    buckets: Vec<Vec<T>>,
}

impl<T> ListBucketProvider<T> {
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }

    pub fn buckets(&self) -> &[Vec<T>] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<Vec<T>> {
        self.buckets
    }
}

impl<T> BucketProvider<T> for ListBucketProvider<T> {
    fn new_bucket(&mut self) -> Result<&mut dyn Bucket<T>> {
        self.buckets.push(Vec::new());
        let last = self.buckets.len() - 1;
        Ok(&mut self.buckets[last])
    }
}

/// One level written to disk as one id per line.
pub struct IdFileBucket {
    path: PathBuf,
    out: BufWriter<File>,
    count: usize,
}

impl IdFileBucket {
    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file, keeping only its description.
    fn close(mut self, level: usize) -> Result<LevelFile> {
        self.out.flush()?;
        Ok(LevelFile {
            level,
            path: self.path,
            ids: self.count,
        })
    }
}

impl Bucket<i64> for IdFileBucket {
    fn append(&mut self, value: i64) -> Result<()> {
        writeln!(self.out, "{}", value)?;
        self.count += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }
}

/// A finished on-disk level.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LevelFile {
    pub level: usize,
    pub path: PathBuf,
    pub ids: usize,
}

/// Writes each level to `<dir>/level-NNNN.ids`.
///
/// Only the level being filled holds an open file; earlier levels are
/// closed as soon as the next one is requested.
pub struct SpoolBucketProvider {
    dir: PathBuf,
    current: Option<IdFileBucket>,
    closed: Vec<LevelFile>,
}

impl SpoolBucketProvider {
    /// Create the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            current: None,
            closed: Vec::new(),
        })
    }

    /// Close the last level and describe every level written.
    pub fn finish(mut self) -> Result<Vec<LevelFile>> {
        if let Some(last) = self.current.take() {
            let level = self.closed.len();
            self.closed.push(last.close(level)?);
        }
        Ok(self.closed)
    }

    #[cfg(test)]
    fn open_files(&self) -> usize {
        usize::from(self.current.is_some())
    }
}

impl BucketProvider<i64> for SpoolBucketProvider {
    fn new_bucket(&mut self) -> Result<&mut dyn Bucket<i64>> {
        if let Some(previous) = self.current.take() {
            let level = self.closed.len();
            self.closed.push(previous.close(level)?);
        }
        let path = self.dir.join(format!("level-{:04}.ids", self.closed.len()));
        let bucket = self.current.insert(IdFileBucket::create(path)?);
        Ok(bucket)
    }
}
