// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The multi-root virtual filesystem.
//!
//! Paths are UTF-8 strings. A [`SplitVfs`] routes the standard roots
//! (`/game`, `/data`, `/save`, `/temp`) plus registered custom prefixes to
//! backing implementations by longest prefix; unmatched paths land on the
//! null VFS. [`SafeVfs`] overlays a real directory and rejects any path
//! that would climb above its root before a single OS call is made.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::file::{File, IoFileHandle, OsFile};
use crate::pool::IoPool;

/// Open and stat flag bits.
pub mod file_flags {
    /// The caller will only read.
    pub const READ_ONLY: u32 = 1;
    /// The caller will only append.
    pub const APPEND_ONLY: u32 = 2;

    /// Stat: the path names a regular file.
    pub const IS_FILE: u32 = 1 << 31;
    /// Stat: the path names a directory.
    pub const IS_DIR: u32 = 1 << 30;
}

/// How to open a file relative to its current existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file only.
    OpenExisting,
    /// Create a new file only; fails if it already exists.
    CreateIfNotExist,
    /// Open an existing file, or create it.
    OpenOrCreate,
    /// Open and truncate an existing file, or create it.
    CreateOrTruncate,
    /// Open and truncate an existing file only.
    TruncateExisting,
}

/// Stat result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatBuf {
    /// Size in bytes.
    pub size: u64,
    /// `file_flags` bits.
    pub flags: u32,
}

/// Directory entry reported by enumeration.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Entry name, not a full path.
    pub name: String,
    /// Size in bytes for files, 0 for directories.
    pub size: u64,
    /// `file_flags` bits.
    pub flags: u32,
}

/// Shared-ownership handle to a directory implementation.
pub type IoDirHandle = Arc<dyn IoDir>;

/// An open directory.
pub trait IoDir: Send + Sync {
    /// Visits every entry; the visitor returns `false` to stop early.
    /// Returns `false` when enumeration itself failed.
    fn enumerate(&self, visitor: &mut dyn FnMut(&FileInfo) -> bool) -> bool;

    /// Opens a subdirectory.
    fn open_subdir(&self, path: &str) -> Option<IoDirHandle>;

    /// Opens a file relative to this directory.
    fn open_file(&self, path: &str, flags: u32, mode: OpenMode) -> Option<IoFileHandle>;
}

/// Collects every entry name.
pub fn enumerate_names(dir: &dyn IoDir) -> Vec<String> {
    let mut names = Vec::new();
    dir.enumerate(&mut |info| {
        names.push(info.name.clone());
        true
    });
    names
}

/// A filesystem namespace.
pub trait Vfs: Send + Sync {
    /// Opens a file. `None` on any failure.
    fn open_file(&self, path: &str, flags: u32, mode: OpenMode) -> Option<IoFileHandle>;

    /// Opens a directory.
    fn open_dir(&self, path: &str) -> Option<IoDirHandle>;

    /// Creates a directory (and missing parents).
    fn create_directory(&self, path: &str) -> bool;

    /// Deletes a file or empty directory.
    fn delete(&self, path: &str) -> bool;

    /// Stats a path.
    fn stat(&self, path: &str) -> Option<StatBuf>;

    /// Whether the path could be opened with the given flags.
    fn check_access(&self, path: &str, flags: u32) -> bool;

    /// Free bytes available for writing under the path, `u64::MAX` when
    /// the implementation cannot tell.
    fn free_bytes_for_writing(&self, path: &str) -> u64;

    /// Opens a cursor-carrying [`File`].
    fn open(&self, path: &str, flags: u32, mode: OpenMode) -> Option<File> {
        self.open_file(path, flags, mode).map(File::new)
    }
}

// ---------------------------------------------------------------------------
// OS-backed implementation

/// Maps a namespace directly onto a host directory.
pub struct OsVfs {
    base: PathBuf,
    pool: Arc<IoPool>,
}

impl OsVfs {
    /// Creates a namespace rooted at `base`.
    pub fn new(base: impl Into<PathBuf>, pool: Arc<IoPool>) -> Arc<Self> {
        Arc::new(Self {
            base: base.into(),
            pool,
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }

    fn open_std(&self, path: &Path, flags: u32, mode: OpenMode) -> Option<(fs::File, bool)> {
        let writable = flags & file_flags::READ_ONLY == 0;
        let mut options = fs::OpenOptions::new();
        options.read(true);
        if writable {
            options.write(true);
        }
        match mode {
            OpenMode::OpenExisting => {}
            OpenMode::CreateIfNotExist => {
                options.write(true).create_new(true);
            }
            OpenMode::OpenOrCreate => {
                options.write(true).create(true);
            }
            OpenMode::CreateOrTruncate => {
                options.write(true).create(true).truncate(true);
            }
            OpenMode::TruncateExisting => {
                options.write(true).truncate(true);
            }
        }
        match options.open(path) {
            Ok(file) => {
                let writable = writable || mode != OpenMode::OpenExisting;
                Some((file, writable))
            }
            Err(err) => {
                log::debug!("open {} failed: {err}", path.display());
                None
            }
        }
    }
}

impl Vfs for OsVfs {
    fn open_file(&self, path: &str, flags: u32, mode: OpenMode) -> Option<IoFileHandle> {
        let full = self.resolve(path);
        let (file, writable) = self.open_std(&full, flags, mode)?;
        Some(OsFile::new(file, self.pool.clone(), writable) as IoFileHandle)
    }

    fn open_dir(&self, path: &str) -> Option<IoDirHandle> {
        let full = self.resolve(path);
        if full.is_dir() {
            Some(Arc::new(OsDir {
                path: full,
                pool: self.pool.clone(),
            }))
        } else {
            None
        }
    }

    fn create_directory(&self, path: &str) -> bool {
        fs::create_dir_all(self.resolve(path)).is_ok()
    }

    fn delete(&self, path: &str) -> bool {
        let full = self.resolve(path);
        if full.is_dir() {
            fs::remove_dir(full).is_ok()
        } else {
            fs::remove_file(full).is_ok()
        }
    }

    fn stat(&self, path: &str) -> Option<StatBuf> {
        let meta = fs::metadata(self.resolve(path)).ok()?;
        let mut flags = 0;
        if meta.is_file() {
            flags |= file_flags::IS_FILE;
        }
        if meta.is_dir() {
            flags |= file_flags::IS_DIR;
        }
        Some(StatBuf {
            size: meta.len(),
            flags,
        })
    }

    fn check_access(&self, path: &str, flags: u32) -> bool {
        let full = self.resolve(path);
        match fs::metadata(&full) {
            Ok(meta) => flags & file_flags::READ_ONLY != 0 || !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    fn free_bytes_for_writing(&self, _path: &str) -> u64 {
        // The standard library cannot query free space portably.
        u64::MAX
    }
}

struct OsDir {
    path: PathBuf,
    pool: Arc<IoPool>,
}

impl IoDir for OsDir {
    fn enumerate(&self, visitor: &mut dyn FnMut(&FileInfo) -> bool) -> bool {
        let Ok(entries) = fs::read_dir(&self.path) else {
            return false;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let mut flags = 0;
            if meta.is_file() {
                flags |= file_flags::IS_FILE;
            }
            if meta.is_dir() {
                flags |= file_flags::IS_DIR;
            }
            let info = FileInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                flags,
            };
            if !visitor(&info) {
                break;
            }
        }
        true
    }

    fn open_subdir(&self, path: &str) -> Option<IoDirHandle> {
        let full = self.path.join(path.trim_start_matches('/'));
        if full.is_dir() {
            Some(Arc::new(OsDir {
                path: full,
                pool: self.pool.clone(),
            }))
        } else {
            None
        }
    }

    fn open_file(&self, path: &str, flags: u32, mode: OpenMode) -> Option<IoFileHandle> {
        let vfs = OsVfs {
            base: self.path.clone(),
            pool: self.pool.clone(),
        };
        vfs.open_file(path, flags, mode)
    }
}

// ---------------------------------------------------------------------------
// Null implementation

/// A namespace where every operation fails.
#[derive(Default)]
pub struct NullVfs;

impl NullVfs {
    /// Creates the null namespace.
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Vfs for NullVfs {
    fn open_file(&self, _path: &str, _flags: u32, _mode: OpenMode) -> Option<IoFileHandle> {
        None
    }

    fn open_dir(&self, _path: &str) -> Option<IoDirHandle> {
        None
    }

    fn create_directory(&self, _path: &str) -> bool {
        false
    }

    fn delete(&self, _path: &str) -> bool {
        false
    }

    fn stat(&self, _path: &str) -> Option<StatBuf> {
        None
    }

    fn check_access(&self, _path: &str, _flags: u32) -> bool {
        false
    }

    fn free_bytes_for_writing(&self, _path: &str) -> u64 {
        0
    }
}

// ---------------------------------------------------------------------------
// Safe overlay

/// Overlays a root path onto another namespace and rejects paths that
/// would climb above it.
pub struct SafeVfs {
    real: Arc<dyn Vfs>,
    root: String,
}

impl SafeVfs {
    /// Creates the overlay. `root` is normalized to forward slashes with a
    /// trailing separator.
    pub fn new(real: Arc<dyn Vfs>, root: &str) -> Arc<Self> {
        let mut root = root.replace('\\', "/");
        if !root.is_empty() && !root.ends_with('/') {
            root.push('/');
        }
        Arc::new(Self { real, root })
    }

    /// The dot-state machine: walking the path byte by byte, a separator
    /// enters state 1, each dot increments a live state, anything else
    /// clears it. Reaching state 3 at a separator or the end of the path
    /// means a `..` segment that would climb above the root.
    fn check_path(path: &str) -> bool {
        let mut s = 1u32;
        for ch in path.bytes() {
            match ch {
                b'\\' | b'/' => {
                    if s == 3 {
                        return false;
                    }
                    s = 1;
                }
                b'.' => {
                    if s > 0 {
                        s += 1;
                    }
                }
                _ => s = 0,
            }
        }
        s != 3
    }

    fn checked(&self, path: &str) -> Option<String> {
        if !Self::check_path(path) {
            log::warn!("unsafe path rejected: {path}");
            return None;
        }
        let mut full = self.root.clone();
        full.push_str(path.trim_start_matches('/'));
        Some(full)
    }
}

impl Vfs for SafeVfs {
    fn open_file(&self, path: &str, flags: u32, mode: OpenMode) -> Option<IoFileHandle> {
        let full = self.checked(path)?;
        self.real.open_file(&full, flags, mode)
    }

    fn open_dir(&self, path: &str) -> Option<IoDirHandle> {
        let full = self.checked(path)?;
        self.real.open_dir(&full)
    }

    fn create_directory(&self, path: &str) -> bool {
        match self.checked(path) {
            Some(full) => self.real.create_directory(&full),
            None => false,
        }
    }

    fn delete(&self, path: &str) -> bool {
        match self.checked(path) {
            Some(full) => self.real.delete(&full),
            None => false,
        }
    }

    fn stat(&self, path: &str) -> Option<StatBuf> {
        let full = self.checked(path)?;
        self.real.stat(&full)
    }

    fn check_access(&self, path: &str, flags: u32) -> bool {
        match self.checked(path) {
            Some(full) => self.real.check_access(&full, flags),
            None => false,
        }
    }

    fn free_bytes_for_writing(&self, path: &str) -> u64 {
        match self.checked(path) {
            Some(full) => self.real.free_bytes_for_writing(&full),
            None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Overlay of several namespaces

/// Serves a path from the first of several namespaces that has it.
/// Mutating operations always fail.
#[derive(Default)]
pub struct OverlayVfs {
    entries: RwLock<Vec<(Arc<dyn Vfs>, String)>>,
}

impl OverlayVfs {
    /// Creates an empty overlay.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends a namespace searched after the existing ones. `root` is
    /// prefixed to every lookup.
    pub fn add(&self, vfs: Arc<dyn Vfs>, root: &str) {
        self.entries
            .write()
            .unwrap()
            .push((vfs, root.to_string()));
    }
}

impl Vfs for OverlayVfs {
    fn open_file(&self, path: &str, flags: u32, mode: OpenMode) -> Option<IoFileHandle> {
        for (vfs, root) in self.entries.read().unwrap().iter() {
            let full = format!("{root}{path}");
            if let Some(file) = vfs.open_file(&full, flags, mode) {
                return Some(file);
            }
        }
        None
    }

    fn open_dir(&self, path: &str) -> Option<IoDirHandle> {
        for (vfs, root) in self.entries.read().unwrap().iter() {
            let full = format!("{root}{path}");
            if let Some(dir) = vfs.open_dir(&full) {
                return Some(dir);
            }
        }
        None
    }

    fn create_directory(&self, _path: &str) -> bool {
        false
    }

    fn delete(&self, _path: &str) -> bool {
        false
    }

    fn stat(&self, path: &str) -> Option<StatBuf> {
        for (vfs, root) in self.entries.read().unwrap().iter() {
            let full = format!("{root}{path}");
            if let Some(stat) = vfs.stat(&full) {
                return Some(stat);
            }
        }
        None
    }

    fn check_access(&self, path: &str, flags: u32) -> bool {
        self.entries
            .read()
            .unwrap()
            .iter()
            .any(|(vfs, root)| vfs.check_access(&format!("{root}{path}"), flags))
    }

    fn free_bytes_for_writing(&self, _path: &str) -> u64 {
        0
    }
}

// ---------------------------------------------------------------------------
// Standard-root split

struct SplitRoots {
    game: Arc<dyn Vfs>,
    data: Arc<dyn Vfs>,
    save: Arc<dyn Vfs>,
    temp: Arc<dyn Vfs>,
    custom: Vec<(String, Arc<dyn Vfs>)>,
}

/// Routes the standard roots and registered custom prefixes to backing
/// namespaces by longest prefix.
///
/// `/game` and `/data` are read-only game data (`/game` defaults to the
/// data namespace), `/save` is writable and persistent, `/temp` is
/// writable and non-persistent. Unmatched paths land on the null VFS.
pub struct SplitVfs {
    roots: RwLock<SplitRoots>,
    null: Arc<NullVfs>,
}

impl SplitVfs {
    /// Creates the split with data and temp namespaces; `/game` aliases
    /// the data namespace and `/save` starts out null until a save
    /// location is configured.
    pub fn new(data: Arc<dyn Vfs>, temp: Arc<dyn Vfs>) -> Arc<Self> {
        Arc::new(Self {
            roots: RwLock::new(SplitRoots {
                game: data.clone(),
                data,
                save: NullVfs::new(),
                temp,
                custom: Vec::new(),
            }),
            null: NullVfs::new(),
        })
    }

    /// Replaces the `/data` namespace. Never set this to null directly;
    /// route to the null VFS by not registering anything instead.
    pub fn set_data(&self, vfs: Arc<dyn Vfs>) {
        self.roots.write().unwrap().data = vfs;
    }

    /// Replaces the `/game` namespace.
    pub fn set_game(&self, vfs: Arc<dyn Vfs>) {
        self.roots.write().unwrap().game = vfs;
    }

    /// Replaces the `/save` namespace.
    pub fn set_save(&self, vfs: Arc<dyn Vfs>) {
        self.roots.write().unwrap().save = vfs;
    }

    /// Registers a custom prefix, e.g. `/mods/`.
    pub fn add_prefix(&self, prefix: &str, vfs: Arc<dyn Vfs>) {
        let mut prefix = prefix.to_string();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.roots.write().unwrap().custom.push((prefix, vfs));
    }

    /// Longest-prefix route: returns the backing namespace and the path
    /// remainder.
    fn lookup<'p>(&self, path: &'p str) -> (Arc<dyn Vfs>, &'p str) {
        let roots = self.roots.read().unwrap();
        let standard: [(&str, &Arc<dyn Vfs>); 4] = [
            ("/game/", &roots.game),
            ("/data/", &roots.data),
            ("/save/", &roots.save),
            ("/temp/", &roots.temp),
        ];
        let mut best: Option<(usize, Arc<dyn Vfs>)> = None;
        for (prefix, vfs) in standard {
            if path.starts_with(prefix) && best.as_ref().map_or(true, |(len, _)| prefix.len() > *len)
            {
                best = Some((prefix.len(), vfs.clone()));
            }
        }
        for (prefix, vfs) in &roots.custom {
            if path.starts_with(prefix.as_str())
                && best.as_ref().map_or(true, |(len, _)| prefix.len() > *len)
            {
                best = Some((prefix.len(), vfs.clone()));
            }
        }
        match best {
            Some((len, vfs)) => (vfs, &path[len..]),
            None => (self.null.clone(), path),
        }
    }
}

impl Vfs for SplitVfs {
    fn open_file(&self, path: &str, flags: u32, mode: OpenMode) -> Option<IoFileHandle> {
        let (vfs, rest) = self.lookup(path);
        vfs.open_file(rest, flags, mode)
    }

    fn open_dir(&self, path: &str) -> Option<IoDirHandle> {
        let (vfs, rest) = self.lookup(path);
        vfs.open_dir(rest)
    }

    fn create_directory(&self, path: &str) -> bool {
        let (vfs, rest) = self.lookup(path);
        vfs.create_directory(rest)
    }

    fn delete(&self, path: &str) -> bool {
        let (vfs, rest) = self.lookup(path);
        vfs.delete(rest)
    }

    fn stat(&self, path: &str) -> Option<StatBuf> {
        let (vfs, rest) = self.lookup(path);
        vfs.stat(rest)
    }

    fn check_access(&self, path: &str, flags: u32) -> bool {
        let (vfs, rest) = self.lookup(path);
        vfs.check_access(rest, flags)
    }

    fn free_bytes_for_writing(&self, path: &str) -> u64 {
        let (vfs, rest) = self.lookup(path);
        vfs.free_bytes_for_writing(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_state_machine_rejects_climbing_paths() {
        assert!(!SafeVfs::check_path("../etc/passwd"));
        assert!(!SafeVfs::check_path("a/../b"));
        assert!(!SafeVfs::check_path("a/b/.."));
        assert!(!SafeVfs::check_path("..\\windows"));
        // Dots that do not form a climbing segment are fine.
        assert!(SafeVfs::check_path("a/b/c.txt"));
        assert!(SafeVfs::check_path("a/.hidden"));
        assert!(SafeVfs::check_path("a/..three/dots..b"));
        assert!(SafeVfs::check_path("..."));
        assert!(SafeVfs::check_path(""));
    }

    #[test]
    fn split_routes_standard_roots() {
        let data = Arc::new(NullVfs) as Arc<dyn Vfs>;
        let temp = Arc::new(NullVfs) as Arc<dyn Vfs>;
        let split = SplitVfs::new(data, temp);
        // No save namespace registered: /save routes to null.
        assert!(split
            .open_file("/save/out.bin", 0, OpenMode::OpenExisting)
            .is_none());
        // Unmatched prefixes route to null as well.
        assert!(split.stat("/other/x").is_none());
        assert_eq!(split.free_bytes_for_writing("/nowhere/x"), 0);
    }

    #[test]
    fn split_prefers_longest_prefix() {
        struct Probe(std::sync::Mutex<Vec<String>>);
        impl Vfs for Probe {
            fn open_file(&self, path: &str, _f: u32, _m: OpenMode) -> Option<IoFileHandle> {
                self.0.lock().unwrap().push(path.to_string());
                None
            }
            fn open_dir(&self, _path: &str) -> Option<IoDirHandle> {
                None
            }
            fn create_directory(&self, _path: &str) -> bool {
                false
            }
            fn delete(&self, _path: &str) -> bool {
                false
            }
            fn stat(&self, _path: &str) -> Option<StatBuf> {
                None
            }
            fn check_access(&self, _path: &str, _flags: u32) -> bool {
                false
            }
            fn free_bytes_for_writing(&self, _path: &str) -> u64 {
                0
            }
        }

        let probe = Arc::new(Probe(std::sync::Mutex::new(Vec::new())));
        let split = SplitVfs::new(NullVfs::new(), NullVfs::new());
        split.add_prefix("/data/packs/", probe.clone());
        let _ = split.open_file("/data/packs/core.pak", 0, OpenMode::OpenExisting);
        // The longer custom prefix won over /data/.
        assert_eq!(*probe.0.lock().unwrap(), vec!["core.pak".to_string()]);
    }
}
