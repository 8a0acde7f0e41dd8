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

//! Output streams.

use std::io::Write;
use std::sync::Mutex;

use crate::buffer::IoBuffer;
use crate::file::IoFileHandle;
use crate::op::{AsyncOp, APPEND_OFFSET};

/// A byte sink.
pub trait OutputStream: Send {
    /// Hands the buffer's valid range to the stream asynchronously; the
    /// buffer travels with the operation.
    fn write_async(&self, buffer: IoBuffer);

    /// Writes synchronously.
    fn write(&self, data: &[u8]);

    /// Flushes buffered data.
    fn flush(&self);

    /// Convenience for string payloads.
    fn write_str(&self, s: &str) {
        self.write(s.as_bytes());
    }
}

/// Appends everything written to it to a file.
pub struct FileOutputStream {
    file: IoFileHandle,
}

impl FileOutputStream {
    /// Creates a stream appending to `file`.
    pub fn new(file: IoFileHandle) -> Self {
        Self { file }
    }
}

impl OutputStream for FileOutputStream {
    fn write_async(&self, buffer: IoBuffer) {
        let Some(mut op) = AsyncOp::for_max_read(buffer) else {
            return;
        };
        op.offset = APPEND_OFFSET;
        self.file.begin_write(op);
    }

    fn write(&self, data: &[u8]) {
        let (mut op, waiter) = AsyncOp::for_sync_io(Some(IoBuffer::from_vec(data.to_vec())));
        op.offset = APPEND_OFFSET;
        self.file.begin_write(op);
        let done = waiter.wait();
        if let Some(err) = done.err {
            log::warn!("stream write failed: {err}");
        }
    }

    fn flush(&self) {
        self.file.flush();
    }
}

/// Wraps any `std::io::Write` sink, serialized by a mutex.
pub struct StdioOutputStream {
    inner: Mutex<Box<dyn Write + Send>>,
}

impl StdioOutputStream {
    /// Wraps `sink`.
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(sink),
        }
    }
}

impl OutputStream for StdioOutputStream {
    fn write_async(&self, buffer: IoBuffer) {
        self.write(buffer.valid());
    }

    fn write(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if let Err(err) = inner.write_all(data) {
            log::warn!("stdio write failed: {err}");
        }
    }

    fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        let _ = inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{File, IoFile, MemFile};

    #[test]
    fn file_stream_appends() {
        let mem = MemFile::new();
        let stream = FileOutputStream::new(mem.clone());
        stream.write(b"hello");
        stream.write_str(" world");
        stream.flush();
        let file = File::new(mem);
        let blob = file.read_to_immediate_blob(0, 0);
        assert_eq!(blob.as_string(), "hello world");
    }

    #[test]
    fn async_write_carries_the_buffer() {
        let mem = MemFile::new();
        let stream = FileOutputStream::new(mem.clone());
        stream.write_async(IoBuffer::from_string("payload".to_string()));
        // MemFile completes inline, so the append has landed.
        assert_eq!(mem.file_size(), 7);
    }

    #[test]
    fn stdio_stream_collects_bytes() {
        // A shared Vec sink through a writer adapter.
        struct SharedVec(std::sync::Arc<Mutex<Vec<u8>>>);
        impl Write for SharedVec {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let collected = std::sync::Arc::new(Mutex::new(Vec::new()));
        let stream = StdioOutputStream::new(Box::new(SharedVec(collected.clone())));
        stream.write(b"abc");
        stream.flush();
        assert_eq!(*collected.lock().unwrap(), b"abc".to_vec());
    }
}
