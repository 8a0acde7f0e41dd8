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

//! File kinds and the cursor-carrying `File` wrapper.
//!
//! [`IoFile`] is the low-level asynchronous surface: a transfer is started
//! by handing over an [`AsyncOp`] and finishes through the op's
//! completion. [`File`] layers a position cursor, an EOF flag, synchronous
//! shims and blob reads on top.

use std::fs;
use std::sync::{Arc, Mutex};

use kyma_core::blob::{Blob, BlobHandle};
use kyma_core::TaskRunner;

use crate::buffer::IoBuffer;
use crate::op::{AsyncOp, IoError, APPEND_OFFSET};
use crate::pool::IoPool;
use crate::stream::{FileOutputStream, OutputStream};

/// Shared-ownership handle to a file implementation.
pub type IoFileHandle = Arc<dyn IoFile>;

/// Low-level asynchronous file surface.
///
/// Implementations take ownership of the op and must complete it exactly
/// once, on whatever thread the transfer finishes on (the op's runner, if
/// set, redirects the completion).
pub trait IoFile: Send + Sync {
    /// Starts a read into the op's buffer free range.
    fn begin_read(&self, op: AsyncOp);

    /// Starts a write from the op's buffer valid range.
    fn begin_write(&self, op: AsyncOp);

    /// Flushes buffered writes to the device.
    fn flush(&self);

    /// Whether writes are permitted.
    fn allow_writes(&self) -> bool;

    /// Current size in bytes.
    fn file_size(&self) -> u64;

    /// Truncates (or extends) the file to `bytes`.
    fn truncate(&self, bytes: u64);

    /// Snapshot of the region `[offset, offset + size)`; `size == 0` means
    /// the remainder of the file. `None` if the region cannot be read.
    fn map_region(&self, offset: u64, size: u64) -> Option<Vec<u8>>;
}

#[cfg(unix)]
fn read_at(file: &fs::File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &fs::File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(unix)]
fn write_at(file: &fs::File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn write_at(file: &fs::File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

/// Resolves the op's segment list against a window length.
fn segments_of(op: &AsyncOp, window_len: usize) -> Vec<std::ops::Range<usize>> {
    if op.segments.is_empty() {
        vec![0..window_len]
    } else {
        op.segments.clone()
    }
}

fn perform_read(file: &fs::File, mut op: AsyncOp) {
    let Some(buffer) = op.buffer.as_mut() else {
        return op.complete_err(IoError::Unsupported);
    };
    let offset = op.offset;
    let window_len = buffer.free_len();
    let segments = segments_of(&op, window_len);
    let mut total = 0usize;
    let mut file_off = offset;
    let mut failed = None;
    'outer: for seg in segments {
        let buffer = op.buffer.as_mut().unwrap();
        let window = match buffer.alloc_write(usize::MAX) {
            Some(w) => w,
            None => break,
        };
        let dst = &mut window[seg.start..seg.end.min(window_len)];
        let mut filled = 0usize;
        while filled < dst.len() {
            match read_at(file, &mut dst[filled..], file_off) {
                Ok(0) => break 'outer,
                Ok(n) => {
                    filled += n;
                    file_off += n as u64;
                    total += n;
                }
                Err(err) => {
                    failed = Some(IoError::from_std(&err));
                    break 'outer;
                }
            }
        }
    }
    if let Some(err) = failed {
        return op.complete_err(err);
    }
    op.buffer.as_mut().unwrap().write(total);
    if total == 0 && window_len > 0 {
        op.transferred = 0;
        op.err = Some(IoError::Eof);
        op.complete();
    } else {
        op.complete_ok(total);
    }
}

fn perform_write(file: &fs::File, mut op: AsyncOp, append_lock: &Mutex<()>) {
    let Some(buffer) = op.buffer.as_ref() else {
        return op.complete_err(IoError::Unsupported);
    };
    let window_len = buffer.valid_len();
    let segments = segments_of(&op, window_len);

    // Append resolves against the size at submission; the lock keeps two
    // concurrent appends from landing on the same offset.
    let _append_guard;
    let mut file_off = if op.offset == APPEND_OFFSET {
        _append_guard = append_lock.lock().unwrap();
        file.metadata().map(|m| m.len()).unwrap_or(0)
    } else {
        op.offset
    };

    let mut total = 0usize;
    let mut failed = None;
    'outer: for seg in segments {
        let buffer = op.buffer.as_ref().unwrap();
        let window = buffer.valid();
        let src = &window[seg.start..seg.end.min(window_len)];
        let mut written = 0usize;
        while written < src.len() {
            match write_at(file, &src[written..], file_off) {
                Ok(0) => {
                    failed = Some(IoError::DeviceFull);
                    break 'outer;
                }
                Ok(n) => {
                    written += n;
                    file_off += n as u64;
                    total += n;
                }
                Err(err) => {
                    failed = Some(IoError::from_std(&err));
                    break 'outer;
                }
            }
        }
    }
    if let Some(err) = failed {
        return op.complete_err(err);
    }
    op.buffer.as_mut().unwrap().read(total);
    op.complete_ok(total);
}

/// A file on the host filesystem. Transfers run on the I/O pool.
pub struct OsFile {
    file: Arc<fs::File>,
    pool: Arc<IoPool>,
    writable: bool,
    append_lock: Arc<Mutex<()>>,
}

impl OsFile {
    /// Wraps an open file handle.
    pub fn new(file: fs::File, pool: Arc<IoPool>, writable: bool) -> Arc<Self> {
        Arc::new(Self {
            file: Arc::new(file),
            pool,
            writable,
            append_lock: Arc::new(Mutex::new(())),
        })
    }
}

impl IoFile for OsFile {
    fn begin_read(&self, op: AsyncOp) {
        let file = self.file.clone();
        self.pool
            .post_task(Box::new(move || perform_read(&file, op)));
    }

    fn begin_write(&self, op: AsyncOp) {
        if !self.writable {
            return op.complete_err(IoError::PermissionDenied);
        }
        let file = self.file.clone();
        let append_lock = self.append_lock.clone();
        self.pool
            .post_task(Box::new(move || perform_write(&file, op, &append_lock)));
    }

    fn flush(&self) {
        if self.writable {
            if let Err(err) = self.file.sync_all() {
                log::warn!("flush failed: {err}");
            }
        }
    }

    fn allow_writes(&self) -> bool {
        self.writable
    }

    fn file_size(&self) -> u64 {
        self.file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn truncate(&self, bytes: u64) {
        if let Err(err) = self.file.set_len(bytes) {
            log::warn!("truncate to {bytes} failed: {err}");
        }
    }

    fn map_region(&self, offset: u64, size: u64) -> Option<Vec<u8>> {
        let file_size = self.file_size();
        if offset > file_size {
            return None;
        }
        let len = if size == 0 {
            file_size - offset
        } else {
            size.min(file_size - offset)
        } as usize;
        let mut out = vec![0u8; len];
        let mut filled = 0usize;
        while filled < len {
            match read_at(&self.file, &mut out[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => return None,
            }
        }
        out.truncate(filled);
        Some(out)
    }
}

/// A read-only window `[start, start + len)` over another file.
pub struct RoSubsetFile {
    inner: IoFileHandle,
    start: u64,
    len: u64,
}

impl RoSubsetFile {
    /// Creates the window.
    pub fn new(inner: IoFileHandle, start: u64, len: u64) -> Arc<Self> {
        Arc::new(Self { inner, start, len })
    }
}

impl IoFile for RoSubsetFile {
    fn begin_read(&self, mut op: AsyncOp) {
        let rel = op.offset.min(self.len);
        let remaining = (self.len - rel) as usize;
        op.offset = self.start + rel;
        // Clip the transfer so it cannot see past the window.
        let window_len = op.buffer.as_ref().map_or(0, IoBuffer::free_len);
        let mut budget = remaining;
        let mut segments = segments_of(&op, window_len);
        for seg in &mut segments {
            let seg_len = seg.end - seg.start;
            if seg_len > budget {
                seg.end = seg.start + budget;
            }
            budget -= seg.end - seg.start;
        }
        segments.retain(|seg| seg.start < seg.end);
        if segments.is_empty() {
            op.transferred = 0;
            op.err = Some(IoError::Eof);
            return op.complete();
        }
        op.segments = segments;
        self.inner.begin_read(op);
    }

    fn begin_write(&self, op: AsyncOp) {
        op.complete_err(IoError::PermissionDenied);
    }

    fn flush(&self) {}

    fn allow_writes(&self) -> bool {
        false
    }

    fn file_size(&self) -> u64 {
        self.len
    }

    fn truncate(&self, _bytes: u64) {
        log::warn!("truncate on a read-only subset file ignored");
    }

    fn map_region(&self, offset: u64, size: u64) -> Option<Vec<u8>> {
        let rel = offset.min(self.len);
        let remaining = self.len - rel;
        let len = if size == 0 { remaining } else { size.min(remaining) };
        self.inner.map_region(self.start + rel, len)
    }
}

/// An in-memory file. Transfers complete inline on the caller (or the
/// op's runner). Used for tests and baked read-only data.
pub struct MemFile {
    data: Mutex<Vec<u8>>,
    writable: bool,
}

impl MemFile {
    /// An empty writable in-memory file.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(Vec::new()),
            writable: true,
        })
    }

    /// A read-only in-memory file over `data`.
    pub fn from_vec(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data),
            writable: false,
        })
    }
}

impl IoFile for MemFile {
    fn begin_read(&self, mut op: AsyncOp) {
        let window_len = match op.buffer.as_ref() {
            Some(buffer) => buffer.free_len(),
            None => return op.complete_err(IoError::Unsupported),
        };
        let segments = segments_of(&op, window_len);
        let data = self.data.lock().unwrap();
        let mut offset = op.offset as usize;
        let mut total = 0usize;
        for seg in segments {
            let buffer = op.buffer.as_mut().unwrap();
            let window = match buffer.alloc_write(usize::MAX) {
                Some(window) => window,
                None => break,
            };
            let dst = &mut window[seg.start..seg.end.min(window_len)];
            let n = dst.len().min(data.len().saturating_sub(offset));
            dst[..n].copy_from_slice(&data[offset..offset + n]);
            offset += n;
            total += n;
            if n < dst.len() {
                break;
            }
        }
        drop(data);
        op.buffer.as_mut().unwrap().write(total);
        if total == 0 && window_len > 0 {
            op.transferred = 0;
            op.err = Some(IoError::Eof);
            op.complete();
        } else {
            op.complete_ok(total);
        }
    }

    fn begin_write(&self, mut op: AsyncOp) {
        if !self.writable {
            return op.complete_err(IoError::PermissionDenied);
        }
        let src = match op.buffer.as_ref() {
            Some(buffer) => buffer.valid().to_vec(),
            None => return op.complete_err(IoError::Unsupported),
        };
        let mut data = self.data.lock().unwrap();
        let offset = if op.offset == APPEND_OFFSET {
            data.len()
        } else {
            op.offset as usize
        };
        if data.len() < offset + src.len() {
            data.resize(offset + src.len(), 0);
        }
        data[offset..offset + src.len()].copy_from_slice(&src);
        drop(data);
        let n = src.len();
        op.buffer.as_mut().unwrap().read(n);
        op.complete_ok(n);
    }

    fn flush(&self) {}

    fn allow_writes(&self) -> bool {
        self.writable
    }

    fn file_size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn truncate(&self, bytes: u64) {
        if self.writable {
            self.data.lock().unwrap().truncate(bytes as usize);
        }
    }

    fn map_region(&self, offset: u64, size: u64) -> Option<Vec<u8>> {
        let data = self.data.lock().unwrap();
        let offset = offset as usize;
        if offset > data.len() {
            return None;
        }
        let len = if size == 0 {
            data.len() - offset
        } else {
            (size as usize).min(data.len() - offset)
        };
        Some(data[offset..offset + len].to_vec())
    }
}

/// Where a [`File::seek`] is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// Relative to the current position.
    Current,
    /// From the beginning of the file.
    Start,
    /// From the end of the file.
    End,
}

/// A file handle carrying a position cursor and an EOF flag.
pub struct File {
    file: IoFileHandle,
    position: u64,
    eof: bool,
}

impl File {
    /// Wraps a file implementation, cursor at 0.
    pub fn new(file: IoFileHandle) -> Self {
        Self {
            file,
            position: 0,
            eof: false,
        }
    }

    /// The underlying implementation handle.
    pub fn io(&self) -> &IoFileHandle {
        &self.file
    }

    /// Moves the cursor, clamping at the file size. The cursor is
    /// unsigned; a seek that underruns the start wraps past the size and
    /// clamps to the end of the file.
    pub fn seek(&mut self, from: SeekFrom, n: i64) {
        let end = self.file.file_size();
        self.position = match from {
            SeekFrom::Current => self.position.wrapping_add(n as u64),
            SeekFrom::Start => n as u64,
            SeekFrom::End => end.wrapping_add(n as u64),
        };
        if self.position > end {
            self.position = end;
        } else {
            self.eof = false;
        }
    }

    /// The cursor position.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Whether a read has hit end-of-file.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Flushes buffered writes.
    pub fn flush(&self) {
        self.file.flush();
    }

    /// Reads at the cursor, advancing it. Returns the byte count; sets the
    /// EOF flag when the end of the file cut the read short.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let (n, err, buffer) = self.transfer_at(out.len(), self.position, true, None);
        self.position += n as u64;
        if matches!(err, Some(IoError::Eof)) {
            self.eof = true;
        }
        if let Some(buffer) = buffer {
            out[..n].copy_from_slice(&buffer.valid()[..n]);
        }
        n
    }

    /// Writes at the cursor, advancing it.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let (n, _, _) = self.transfer_at(0, self.position, false, Some(data));
        self.position += n as u64;
        n
    }

    /// Reads at an absolute offset without touching the cursor.
    pub fn read_abs(&self, out: &mut [u8], offset: u64) -> usize {
        let (n, _, buffer) = self.transfer_at(out.len(), offset, true, None);
        if let Some(buffer) = buffer {
            out[..n].copy_from_slice(&buffer.valid()[..n]);
        }
        n
    }

    /// Writes at an absolute offset without touching the cursor.
    pub fn write_abs(&self, data: &[u8], offset: u64) -> usize {
        let (n, _, _) = self.transfer_at(0, offset, false, Some(data));
        n
    }

    /// Appends to the end of the file. True when everything was written.
    pub fn append(&self, data: &[u8]) -> bool {
        let (n, _, _) = self.transfer_at(0, APPEND_OFFSET, false, Some(data));
        n == data.len()
    }

    /// One blocking transfer through a sync-shim op.
    fn transfer_at(
        &self,
        read_len: usize,
        offset: u64,
        is_read: bool,
        data: Option<&[u8]>,
    ) -> (usize, Option<IoError>, Option<IoBuffer>) {
        let buffer = match data {
            Some(data) => IoBuffer::from_vec(data.to_vec()),
            None => IoBuffer::empty_for_fill(read_len),
        };
        let (mut op, waiter) = AsyncOp::for_sync_io(Some(buffer));
        op.offset = offset;
        if is_read {
            self.file.begin_read(op);
        } else {
            self.file.begin_write(op);
        }
        let op = waiter.wait();
        (op.transferred, op.err, op.buffer)
    }

    /// Starts an asynchronous read of `[offset, offset + size)` into a new
    /// blob; `size == 0` reads the whole file. The file handle may be
    /// dropped before the read completes.
    pub fn read_to_future_blob(&self, offset: u64, size: u64) -> BlobHandle {
        let file_size = self.file.file_size();
        if file_size == 0 {
            return Blob::empty();
        }
        let size = if size == 0 { file_size } else { size };
        let blob = Blob::pending();
        let mut op = AsyncOp::with_buffer(IoBuffer::empty_for_fill(size as usize));
        op.offset = offset;
        let target = blob.clone();
        op.set_completion(
            move |op| {
                let errored = op.err.is_some();
                let bytes = op.buffer.map(IoBuffer::into_valid_vec).unwrap_or_default();
                target.set(bytes, errored);
            },
            None,
        );
        self.file.begin_read(op);
        blob
    }

    /// [`read_to_future_blob`](File::read_to_future_blob) followed by a
    /// wait for the result.
    pub fn read_to_immediate_blob(&self, offset: u64, size: u64) -> BlobHandle {
        let blob = self.read_to_future_blob(offset, size);
        blob.wait();
        blob
    }

    /// A resolved blob holding a snapshot of the requested region.
    pub fn map_to_blob(&self, offset: u64, size: u64) -> Option<BlobHandle> {
        self.file.map_region(offset, size).map(Blob::from_vec)
    }

    /// An output stream appending to this file.
    pub fn create_output_stream(&self) -> Box<dyn OutputStream> {
        Box::new(FileOutputStream::new(self.file.clone()))
    }
}
