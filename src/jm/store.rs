use crate::jm::error::StoreError;
use crate::jm::job::{GlobalServiceIndex, Job, JobKey};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Persisted job records plus the global service index.
///
/// Mutating methods take `&mut self`: the only way to reach a shared store is through
/// the coordinator's guard, so writers are exclusive by construction.
pub trait JobStore: Send + Sync {
    /// All job records in directory-listing (file name) order. Fails on the first bad record.
    fn read_all(&self) -> Result<Vec<Job>, StoreError>;

    fn read(&self, key: &JobKey) -> Result<Job, StoreError>;

    /// Missing or unreadable index reads as empty.
    fn read_index(&self) -> GlobalServiceIndex;

    /// Atomically replace the job's record at its canonical path.
    fn write(&mut self, job: &Job) -> Result<(), StoreError>;

    fn write_index(&mut self, index: &GlobalServiceIndex) -> Result<(), StoreError>;

    /// Delete one job record. Removing an absent record is not an error.
    fn remove(&mut self, key: &JobKey) -> Result<(), StoreError>;

    /// Delete the whole job directory (full teardown). The index is left alone.
    fn remove_all(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct FsJobStore {
    jobs_directory: PathBuf,
    index_path: PathBuf,
}

impl FsJobStore {
    pub fn new(jobs_directory: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            jobs_directory: jobs_directory.into(),
            index_path: index_path.into(),
        }
    }

    pub fn jobs_directory(&self) -> &Path {
        &self.jobs_directory
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn job_path(&self, key: &JobKey) -> PathBuf {
        self.jobs_directory.join(key.file_name())
    }

    fn read_job_file(&self, path: &Path, expected: &JobKey) -> Result<Job, StoreError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                StoreError::Read {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let job: Job = serde_yaml::from_str(&raw).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if &job.key() != expected {
            return Err(StoreError::KeyMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                found: job.key().to_string(),
            });
        }
        Ok(job)
    }
}

impl JobStore for FsJobStore {
    fn read_all(&self) -> Result<Vec<Job>, StoreError> {
        let entries = match fs::read_dir(&self.jobs_directory) {
            Ok(e) => e,
            // Nothing added yet (or torn down by RemoveAllJobs).
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.jobs_directory.clone(),
                    source: e,
                })
            }
        };

        let mut keyed: Vec<(String, JobKey)> = vec![];
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Read {
                path: self.jobs_directory.clone(),
                source: e,
            })?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = JobKey::parse_file_name(&file_name) {
                keyed.push((file_name, key));
            }
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        keyed
            .iter()
            .map(|(file_name, key)| self.read_job_file(&self.jobs_directory.join(file_name), key))
            .collect()
    }

    fn read(&self, key: &JobKey) -> Result<Job, StoreError> {
        self.read_job_file(&self.job_path(key), key)
    }

    fn read_index(&self) -> GlobalServiceIndex {
        let raw = match fs::read_to_string(&self.index_path) {
            Ok(r) => r,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        component = "store",
                        path = %self.index_path.display(),
                        "index unreadable, treating as empty err={e}"
                    );
                }
                return GlobalServiceIndex::default();
            }
        };
        match serde_yaml::from_str::<Option<GlobalServiceIndex>>(&raw) {
            Ok(idx) => idx.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    component = "store",
                    path = %self.index_path.display(),
                    "index unparseable, treating as empty err={e}"
                );
                GlobalServiceIndex::default()
            }
        }
    }

    fn write(&mut self, job: &Job) -> Result<(), StoreError> {
        let key = job.key();
        let yaml = serde_yaml::to_string(job).map_err(|e| StoreError::Serialize {
            what: format!("job {key}"),
            source: e,
        })?;
        let path = self.job_path(&key);
        write_atomic(&path, yaml.as_bytes())?;
        tracing::debug!(component = "store", job = %key, path = %path.display(), "job record written");
        Ok(())
    }

    fn write_index(&mut self, index: &GlobalServiceIndex) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(index).map_err(|e| StoreError::Serialize {
            what: "global service index".to_string(),
            source: e,
        })?;
        write_atomic(&self.index_path, yaml.as_bytes())?;
        tracing::debug!(
            component = "store",
            services = index.service_names.len(),
            "global service index written"
        );
        Ok(())
    }

    fn remove(&mut self, key: &JobKey) -> Result<(), StoreError> {
        let path = self.job_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Remove { path, source: e }),
        }
    }

    fn remove_all(&mut self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.jobs_directory) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Remove {
                path: self.jobs_directory.clone(),
                source: e,
            }),
        }
    }
}

/// Write to a sibling temp file, then rename over `path` (atomic on POSIX).
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |e: io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(write_err)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "jobmaster".to_string());
    let tmp = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));
    fs::write(&tmp, bytes).map_err(write_err)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}
