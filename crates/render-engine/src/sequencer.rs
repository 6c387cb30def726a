//! Job working directories and frame slot assignment.
//!
//! Every job renders into a private directory that is removed on every
//! exit path: explicitly via [`WorkingDirectory::close`], or on drop when a
//! job is cancelled, fails early, or panics.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use heliomovie_common::error::{MovieError, MovieResult};

/// Index of the first frame file.
pub const FRAME_START_INDEX: usize = 0;

/// A job-exclusive, ephemeral directory.
#[derive(Debug)]
pub struct WorkingDirectory {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkingDirectory {
    /// Create a fresh directory under `root` named after the job.
    pub fn create(root: &Path, job_id: &str) -> MovieResult<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("movie-{job_id}-"))
            .tempdir_in(root)?;
        let path = dir.path().canonicalize()?;

        tracing::debug!(path = %path.display(), "Allocated working directory");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory, reporting failure instead of ignoring it.
    pub fn close(mut self) -> MovieResult<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        dir.close().map_err(|e| MovieError::ResourceCleanup {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %self.path.display(), "Removed working directory");
        Ok(())
    }
}

/// One frame position within a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlot {
    pub index: usize,
    pub path: PathBuf,
}

/// Assigns contiguous, zero-padded frame filenames within a directory.
#[derive(Debug, Clone)]
pub struct FrameSequencer {
    dir: PathBuf,
    total: usize,
    digits: usize,
}

impl FrameSequencer {
    pub fn new(dir: impl Into<PathBuf>, total: usize) -> Self {
        let last = FRAME_START_INDEX + total.saturating_sub(1);
        Self {
            dir: dir.into(),
            total,
            digits: last.to_string().len(),
        }
    }

    /// Number of frames in the sequence.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// File name of frame `index`, e.g. `frame007.jpg`.
    pub fn frame_name(&self, index: usize) -> String {
        format!("frame{:0width$}.jpg", index, width = self.digits)
    }

    /// Every slot, in order.
    pub fn slots(&self) -> impl Iterator<Item = FrameSlot> + '_ {
        (FRAME_START_INDEX..FRAME_START_INDEX + self.total).map(|index| FrameSlot {
            index,
            path: self.dir.join(self.frame_name(index)),
        })
    }

    /// Numeric pattern addressing every frame, e.g. `<dir>/frame%03d.jpg`.
    pub fn pattern(&self) -> PathBuf {
        self.dir.join(format!("frame%0{}d.jpg", self.digits))
    }

    /// Confirm the directory holds exactly the expected, readable frames.
    pub fn verify(&self) -> MovieResult<()> {
        let expected: BTreeSet<String> = (FRAME_START_INDEX..FRAME_START_INDEX + self.total)
            .map(|index| self.frame_name(index))
            .collect();

        let mut found = BTreeSet::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !expected.contains(&name) {
                return Err(MovieError::frame_write(
                    entry.path(),
                    "unexpected file in working directory",
                ));
            }
            found.insert(name);
        }

        if let Some(missing) = expected.difference(&found).next() {
            return Err(MovieError::frame_write(
                self.dir.join(missing),
                "frame file is missing",
            ));
        }

        for name in &expected {
            let path = self.dir.join(name);
            image::ImageReader::open(&path)
                .and_then(|reader| reader.with_guessed_format())
                .map_err(|e| MovieError::frame_write(&path, e.to_string()))?
                .into_dimensions()
                .map_err(|e| MovieError::frame_write(&path, format!("corrupt frame: {e}")))?;
        }

        Ok(())
    }
}
