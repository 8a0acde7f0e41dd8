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

//! Windowed I/O buffers.
//!
//! An [`IoBuffer`] is a byte buffer with two cursors: the valid range
//! `[rd, wr)` holds data ready to be consumed, and the free range
//! `[wr, end)` is space waiting to be filled. Invariant:
//! `0 <= rd <= wr <= end`.

/// Backing storage for an [`IoBuffer`].
enum Storage {
    Bytes(Vec<u8>),
    Text(String),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Bytes(v) => v,
            Storage::Text(s) => s.as_bytes(),
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// A windowed view over an owned byte buffer.
pub struct IoBuffer {
    storage: Storage,
    rd: usize,
    wr: usize,
}

impl IoBuffer {
    /// A zeroed buffer of `max_size` bytes with an empty valid range,
    /// ready to be filled by a read.
    pub fn empty_for_fill(max_size: usize) -> Self {
        Self {
            storage: Storage::Bytes(vec![0; max_size]),
            rd: 0,
            wr: 0,
        }
    }

    /// Wraps a vector whose full contents are the valid range.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let wr = bytes.len();
        Self {
            storage: Storage::Bytes(bytes),
            rd: 0,
            wr,
        }
    }

    /// Wraps a string whose full contents are the valid range, without
    /// copying.
    pub fn from_string(s: String) -> Self {
        let wr = s.len();
        Self {
            storage: Storage::Text(s),
            rd: 0,
            wr,
        }
    }

    /// The valid range `[rd, wr)`, clipped to `req` bytes. `None` when
    /// empty.
    pub fn alloc_read(&self, req: usize) -> Option<&[u8]> {
        if self.rd == self.wr {
            return None;
        }
        let n = (self.wr - self.rd).min(req);
        Some(&self.storage.as_slice()[self.rd..self.rd + n])
    }

    /// The free range `[wr, end)`, clipped to `req` bytes. `None` when
    /// full.
    pub fn alloc_write(&mut self, req: usize) -> Option<&mut [u8]> {
        let end = self.storage.len();
        if self.wr == end {
            return None;
        }
        let n = (end - self.wr).min(req);
        match &mut self.storage {
            Storage::Bytes(v) => Some(&mut v[self.wr..self.wr + n]),
            // Text storage is created full; the free range is always empty.
            Storage::Text(_) => None,
        }
    }

    /// Consumes `n` bytes from the valid range.
    pub fn read(&mut self, n: usize) {
        self.rd += n;
        debug_assert!(self.rd <= self.wr);
    }

    /// Commits `n` freshly filled bytes to the valid range.
    pub fn write(&mut self, n: usize) {
        self.wr += n;
        debug_assert!(self.wr <= self.storage.len());
    }

    /// The whole valid range.
    pub fn valid(&self) -> &[u8] {
        &self.storage.as_slice()[self.rd..self.wr]
    }

    /// Number of valid bytes.
    pub fn valid_len(&self) -> usize {
        self.wr - self.rd
    }

    /// Number of free bytes.
    pub fn free_len(&self) -> usize {
        self.storage.len() - self.wr
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Read cursor.
    pub fn rd(&self) -> usize {
        self.rd
    }

    /// Write cursor.
    pub fn wr(&self) -> usize {
        self.wr
    }

    /// Empties the window: `rd = wr = 0`.
    pub fn reset(&mut self) {
        self.rd = 0;
        self.wr = 0;
    }

    /// Consumes the buffer, returning the valid range as a vector.
    pub fn into_valid_vec(self) -> Vec<u8> {
        match self.storage {
            Storage::Bytes(mut v) => {
                v.truncate(self.wr);
                if self.rd > 0 {
                    v.drain(..self.rd);
                }
                v
            }
            Storage::Text(s) => s.into_bytes()[self.rd..self.wr].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_then_consume() {
        let mut buf = IoBuffer::empty_for_fill(8);
        assert!(buf.alloc_read(8).is_none());
        {
            let free = buf.alloc_write(4).unwrap();
            assert_eq!(free.len(), 4);
            free.copy_from_slice(b"abcd");
        }
        buf.write(4);
        assert_eq!(buf.valid(), b"abcd");
        assert_eq!(buf.alloc_read(2).unwrap(), b"ab");
        buf.read(4);
        assert_eq!(buf.valid_len(), 0);
        assert_eq!(buf.rd(), buf.wr());
    }

    #[test]
    fn write_then_read_leaves_wr_unchanged() {
        let mut buf = IoBuffer::empty_for_fill(16);
        buf.alloc_write(usize::MAX).unwrap()[..3].copy_from_slice(b"xyz");
        buf.write(3);
        let wr = buf.wr();
        buf.read(3);
        assert_eq!(buf.rd(), wr);
        assert_eq!(buf.wr(), wr);
    }

    #[test]
    fn string_buffer_is_read_only() {
        let mut buf = IoBuffer::from_string("hello".to_string());
        assert_eq!(buf.valid(), b"hello");
        assert!(buf.alloc_write(1).is_none());
        assert_eq!(buf.free_len(), 0);
    }

    #[test]
    fn into_valid_vec_respects_cursors() {
        let mut buf = IoBuffer::from_vec(b"abcdef".to_vec());
        buf.read(2);
        assert_eq!(buf.into_valid_vec(), b"cdef".to_vec());
    }

    #[test]
    fn reset_clears_the_window() {
        let mut buf = IoBuffer::from_vec(vec![1, 2, 3]);
        buf.reset();
        assert_eq!(buf.valid_len(), 0);
        assert_eq!(buf.free_len(), 3);
    }
}
