use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use voice_domain::{
    CleanupWarning, ContainerFormat, DomainError, RequesterId, ScratchPaths, ScratchStorage,
};

fn paths_in(directory: &Path, requester: &RequesterId, format: ContainerFormat) -> ScratchPaths {
    let stem = requester.file_stem();
    ScratchPaths {
        input: directory.join(format!("input_{stem}.{}", format.extension())),
        intermediate: directory.join(format!("intermediate_{stem}.wav")),
        output: directory.join(format!("output_{stem}.{}", format.extension())),
    }
}

/// Scratch files in one process-wide directory, named after the requester.
///
/// Two overlapping requests from the same requester share paths; the later
/// allocation wins.
pub struct FsScratchStorage {
    directory: PathBuf,
}

impl FsScratchStorage {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|err| {
            DomainError::storage(format!(
                "cannot create scratch directory {}: {err}",
                directory.display()
            ))
        })?;
        tracing::debug!(directory = %directory.display(), "scratch directory ready");
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Removes every file left in the scratch directory. Used on shutdown.
    pub fn purge(&self) -> Vec<CleanupWarning> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                return vec![CleanupWarning {
                    path: self.directory.clone(),
                    reason: err.to_string(),
                }]
            }
        };

        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| remove_if_exists(&path))
            .collect()
    }
}

fn remove_if_exists(path: &Path) -> Option<CleanupWarning> {
    match fs::remove_file(path) {
        Ok(()) => None,
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => Some(CleanupWarning {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }),
    }
}

impl ScratchStorage for FsScratchStorage {
    fn allocate(
        &self,
        requester: &RequesterId,
        format: ContainerFormat,
    ) -> Result<ScratchPaths, DomainError> {
        Ok(paths_in(&self.directory, requester, format))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), DomainError> {
        fs::write(path, bytes).map_err(|err| {
            DomainError::storage(format!("cannot write {}: {err}", path.display()))
        })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, DomainError> {
        fs::read(path)
            .map_err(|err| DomainError::storage(format!("cannot read {}: {err}", path.display())))
    }

    fn release(&self, paths: &ScratchPaths) -> Vec<CleanupWarning> {
        paths.iter().filter_map(|path| remove_if_exists(path)).collect()
    }
}

/// Map-backed scratch space for tests and for pipelines that never shell out.
#[derive(Default)]
pub struct InMemoryScratchStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl InMemoryScratchStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }
}

impl ScratchStorage for InMemoryScratchStorage {
    fn allocate(
        &self,
        requester: &RequesterId,
        format: ContainerFormat,
    ) -> Result<ScratchPaths, DomainError> {
        Ok(paths_in(Path::new("memory"), requester, format))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), DomainError> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| DomainError::storage("scratch map poisoned"))?;
        files.insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, DomainError> {
        let files = self
            .files
            .lock()
            .map_err(|_| DomainError::storage("scratch map poisoned"))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| DomainError::storage(format!("no scratch file at {}", path.display())))
    }

    fn release(&self, paths: &ScratchPaths) -> Vec<CleanupWarning> {
        match self.files.lock() {
            Ok(mut files) => {
                for path in paths.iter() {
                    files.remove(path);
                }
                Vec::new()
            }
            Err(_) => vec![CleanupWarning {
                path: paths.input.clone(),
                reason: "scratch map poisoned".to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use voice_domain::ScratchSession;

    #[test]
    fn allocation_is_partitioned_by_requester() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsScratchStorage::new(dir.path().join("scratch")).expect("storage");

        let alice = storage
            .allocate(&RequesterId::new("111"), ContainerFormat::OggOpus)
            .expect("allocate");
        let bob = storage
            .allocate(&RequesterId::new("222"), ContainerFormat::OggOpus)
            .expect("allocate");

        assert_ne!(alice, bob);
        assert!(alice.input.ends_with("input_111.ogg"));
        assert!(alice.intermediate.ends_with("intermediate_111.wav"));
        assert!(alice.output.ends_with("output_111.ogg"));
        assert!(alice.iter().all(|path| path.starts_with(storage.directory())));
    }

    #[test]
    fn wav_requests_get_three_distinct_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsScratchStorage::new(dir.path()).expect("storage");
        let paths = storage
            .allocate(&RequesterId::new("42"), ContainerFormat::Wav)
            .expect("allocate");

        assert_ne!(paths.input, paths.intermediate);
        assert_ne!(paths.intermediate, paths.output);
        assert_ne!(paths.input, paths.output);
        assert!(paths.intermediate.ends_with("intermediate_42.wav"));
    }

    #[test]
    fn release_removes_written_files_and_skips_missing_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsScratchStorage::new(dir.path()).expect("storage");
        let paths = storage
            .allocate(&RequesterId::new("7"), ContainerFormat::OggOpus)
            .expect("allocate");

        storage.write(&paths.input, b"ogg").expect("write input");
        storage.write(&paths.output, b"out").expect("write output");
        assert_eq!(storage.read(&paths.input).expect("read"), b"ogg");

        let warnings = storage.release(&paths);
        assert!(warnings.is_empty());
        assert!(paths.iter().all(|path| !path.exists()));

        assert!(storage.release(&paths).is_empty());
    }

    #[test]
    fn dropped_session_still_releases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(FsScratchStorage::new(dir.path()).expect("storage"));
        let input = {
            let session = ScratchSession::allocate(
                storage.clone(),
                &RequesterId::new("9"),
                ContainerFormat::OggOpus,
            )
            .expect("session");
            session
                .storage()
                .write(&session.paths().input, b"abc")
                .expect("write");
            session.paths().input.clone()
        };
        assert!(!input.exists());
    }

    #[test]
    fn purge_clears_leftovers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsScratchStorage::new(dir.path()).expect("storage");
        storage
            .write(&dir.path().join("input_stale.ogg"), b"stale")
            .expect("write");
        assert!(storage.purge().is_empty());
        assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn in_memory_storage_round_trips_and_releases() {
        let storage = InMemoryScratchStorage::new();
        let paths = storage
            .allocate(&RequesterId::new("mem"), ContainerFormat::Wav)
            .expect("allocate");
        storage.write(&paths.intermediate, b"wav").expect("write");
        assert!(storage.contains(&paths.intermediate));
        assert!(storage.read(&paths.output).is_err());

        assert!(storage.release(&paths).is_empty());
        assert!(storage.is_empty());
    }
}
