//! Abstract filesystem holding containers, plus per-location handle exclusivity.
//!
//! A [`Storage`] maps location strings to byte files. [`RowStore`] pairs a storage with a lock
//! table so that one writer, or any number of readers, can hold a location at a time. The check
//! is per `RowStore` (and its clones); it is not a cross-process lock.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::container::Container;
use crate::error::{RowpackError, RowpackResult};

/// Readable, seekable byte source.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Read/write handle used by writers and metadata editors.
pub trait FileHandle: Read + Write + Seek + Send {
    /// Flush buffered bytes to durable storage.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Cut the file to `len` bytes.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl FileHandle for File {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Byte-level filesystem interface.
pub trait Storage: Send + Sync + fmt::Debug {
    fn exists(&self, location: &str) -> RowpackResult<bool>;

    /// Open for reading; [`RowpackError::NotFound`] if absent.
    fn open_read(&self, location: &str) -> RowpackResult<Box<dyn ReadSeek>>;

    /// Create or truncate.
    fn create(&self, location: &str) -> RowpackResult<Box<dyn FileHandle>>;

    /// Open an existing file for in-place updates.
    fn open_update(&self, location: &str) -> RowpackResult<Box<dyn FileHandle>>;

    /// Delete the file; absent files are not an error.
    fn remove(&self, location: &str) -> RowpackResult<()>;
}

fn not_found(location: &str) -> RowpackError {
    RowpackError::NotFound {
        location: location.to_owned(),
    }
}

fn map_open_err(location: &str, err: io::Error) -> RowpackError {
    if err.kind() == io::ErrorKind::NotFound {
        not_found(location)
    } else {
        RowpackError::Io(err)
    }
}

/// Files under a root directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_of(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }
}

impl Storage for LocalStorage {
    fn exists(&self, location: &str) -> RowpackResult<bool> {
        Ok(self.path_of(location).is_file())
    }

    fn open_read(&self, location: &str) -> RowpackResult<Box<dyn ReadSeek>> {
        let f = File::open(self.path_of(location)).map_err(|e| map_open_err(location, e))?;
        Ok(Box::new(f))
    }

    fn create(&self, location: &str) -> RowpackResult<Box<dyn FileHandle>> {
        let path = self.path_of(location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(f))
    }

    fn open_update(&self, location: &str) -> RowpackResult<Box<dyn FileHandle>> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path_of(location))
            .map_err(|e| map_open_err(location, e))?;
        Ok(Box::new(f))
    }

    fn remove(&self, location: &str) -> RowpackResult<()> {
        match fs::remove_file(self.path_of(location)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

type SharedBytes = Arc<Mutex<Vec<u8>>>;

/// In-process storage; contents vanish with the last clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, SharedBytes>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, SharedBytes>>> {
        self.files
            .lock()
            .map_err(|_| io::Error::other("memory storage mutex poisoned"))
    }

    fn get(&self, location: &str) -> RowpackResult<SharedBytes> {
        self.files()?
            .get(location)
            .cloned()
            .ok_or_else(|| not_found(location))
    }

    /// Size in bytes of a stored file.
    pub fn len_of(&self, location: &str) -> RowpackResult<u64> {
        let data = self.get(location)?;
        let bytes = data
            .lock()
            .map_err(|_| io::Error::other("memory file mutex poisoned"))?;
        Ok(bytes.len() as u64)
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, location: &str) -> RowpackResult<bool> {
        Ok(self.files()?.contains_key(location))
    }

    fn open_read(&self, location: &str) -> RowpackResult<Box<dyn ReadSeek>> {
        Ok(Box::new(MemFile::new(self.get(location)?)))
    }

    fn create(&self, location: &str) -> RowpackResult<Box<dyn FileHandle>> {
        let data: SharedBytes = Arc::default();
        self.files()?.insert(location.to_owned(), Arc::clone(&data));
        Ok(Box::new(MemFile::new(data)))
    }

    fn open_update(&self, location: &str) -> RowpackResult<Box<dyn FileHandle>> {
        Ok(Box::new(MemFile::new(self.get(location)?)))
    }

    fn remove(&self, location: &str) -> RowpackResult<()> {
        self.files()?.remove(location);
        Ok(())
    }
}

/// Cursor over a shared in-memory file.
struct MemFile {
    data: SharedBytes,
    pos: u64,
}

impl MemFile {
    fn new(data: SharedBytes) -> Self {
        Self { data, pos: 0 }
    }

    fn lock_data(&self) -> io::Result<std::sync::MutexGuard<'_, Vec<u8>>> {
        self.data
            .lock()
            .map_err(|_| io::Error::other("memory file mutex poisoned"))
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.lock_data()?;
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        drop(data);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.lock_data()?;
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        drop(data);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.lock_data()?.len() as i128;
        let target = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::End(off) => len + off as i128,
            SeekFrom::Current(off) => self.pos as i128 + off as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of memory file",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl FileHandle for MemFile {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.lock_data()?.truncate(len as usize);
        Ok(())
    }
}

/// Access mode held by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessMode {
    Read,
    Write,
}

#[derive(Debug)]
enum LockState {
    Write,
    Read(usize),
}

#[derive(Debug, Default)]
struct LockTable {
    entries: Mutex<HashMap<String, LockState>>,
}

impl LockTable {
    fn acquire(self: &Arc<Self>, location: &str, mode: AccessMode) -> RowpackResult<HandleGuard> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::other("lock table mutex poisoned"))?;
        let conflict = |mode: &'static str| RowpackError::AlreadyOpen {
            location: location.to_owned(),
            mode,
        };
        let next = match (entries.get(location), mode) {
            (None, AccessMode::Write) => LockState::Write,
            (None, AccessMode::Read) => LockState::Read(1),
            (Some(LockState::Read(n)), AccessMode::Read) => LockState::Read(n + 1),
            (Some(LockState::Write), _) => return Err(conflict("open for write")),
            (Some(LockState::Read(_)), AccessMode::Write) => return Err(conflict("open for read")),
        };
        entries.insert(location.to_owned(), next);
        Ok(HandleGuard {
            table: Arc::clone(self),
            location: location.to_owned(),
            mode,
        })
    }

    fn release(&self, location: &str, mode: AccessMode) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let remove = match (entries.get_mut(location), mode) {
            (Some(LockState::Read(n)), AccessMode::Read) if *n > 1 => {
                *n -= 1;
                false
            }
            (Some(_), _) => true,
            (None, _) => false,
        };
        if remove {
            entries.remove(location);
        }
    }
}

/// Releases its location in the lock table when dropped.
#[derive(Debug)]
pub(crate) struct HandleGuard {
    table: Arc<LockTable>,
    location: String,
    mode: AccessMode,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.table.release(&self.location, self.mode);
    }
}

/// A storage plus the lock table guarding its locations. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RowStore {
    storage: Arc<dyn Storage>,
    locks: Arc<LockTable>,
}

impl RowStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
            locks: Arc::default(),
        }
    }

    /// Containers as files under `root`.
    pub fn local(root: impl AsRef<Path>) -> Self {
        Self::new(LocalStorage::new(root))
    }

    /// Containers held in memory.
    pub fn memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Handle for the container at `location`. Leading `/` is ignored.
    pub fn container(&self, location: &str) -> Container {
        Container::new(self.clone(), location.trim_start_matches('/').to_owned())
    }

    pub(crate) fn acquire(&self, location: &str, mode: AccessMode) -> RowpackResult<HandleGuard> {
        self.locks.acquire(location, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_file_reads_back_writes_and_seeks() {
        let storage = MemoryStorage::new();
        let mut f = storage.create("a/b").unwrap();
        f.write_all(b"hello world").unwrap();
        f.seek(SeekFrom::Start(6)).unwrap();
        f.write_all(b"there").unwrap();

        let mut r = storage.open_read("a/b").unwrap();
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello there");
        assert_eq!(storage.len_of("a/b").unwrap(), 11);
    }

    #[test]
    fn missing_location_maps_to_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.open_read("nope"),
            Err(RowpackError::NotFound { .. })
        ));
        assert!(!storage.exists("nope").unwrap());
        storage.remove("nope").unwrap();
    }

    #[test]
    fn writer_excludes_everyone_and_readers_share() {
        let store = RowStore::memory();
        let w = store.acquire("x", AccessMode::Write).unwrap();
        assert!(matches!(
            store.acquire("x", AccessMode::Write),
            Err(RowpackError::AlreadyOpen { .. })
        ));
        assert!(store.acquire("x", AccessMode::Read).is_err());
        drop(w);

        let r1 = store.acquire("x", AccessMode::Read).unwrap();
        let r2 = store.acquire("x", AccessMode::Read).unwrap();
        assert!(store.acquire("x", AccessMode::Write).is_err());
        drop(r1);
        assert!(store.acquire("x", AccessMode::Write).is_err());
        drop(r2);
        assert!(store.acquire("x", AccessMode::Write).is_ok());
    }

    #[test]
    fn local_storage_creates_parent_directories() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("rowpack-storage-{nanos}"));
        let storage = LocalStorage::new(&root);
        storage.create("nested/dir/file").unwrap().write_all(b"x").unwrap();
        assert!(storage.exists("nested/dir/file").unwrap());
        storage.remove("nested/dir/file").unwrap();
        assert!(!storage.exists("nested/dir/file").unwrap());
        let _ = fs::remove_dir_all(root);
    }
}
