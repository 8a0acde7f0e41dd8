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

//! The compression pipeline.
//!
//! Compressors and decompressors consume and produce blobs: the returned
//! blob resolves when the work finishes, inline or on a supplied runner.
//! Contexts are parameterized by an optional dictionary blob; the frame
//! header carries the dictionary's 64-bit identity, and decompressing
//! with a mismatched dictionary resolves the output errored.

use std::hash::Hasher;
use std::sync::Arc;

use siphasher::sip::SipHasher13;

use kyma_core::blob::{Blob, BlobHandle};
use kyma_core::task::TaskRunner;

/// Frame magic for the Lz4 codec.
const LZ4_MAGIC: [u8; 4] = *b"KZL4";

/// Available compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithmKind {
    /// LZ4 block compression with a size-prefixed frame.
    Lz4,
}

/// A compression context. Reusable; safe from one thread at a time per
/// the usual shared-reference rules.
pub trait Compressor: Send + Sync {
    /// Compresses `input` once it resolves. The returned blob resolves
    /// with the compressed frame, or errored when the input errored.
    fn compress(&self, input: &BlobHandle, runner: Option<Arc<dyn TaskRunner>>) -> BlobHandle;
}

/// A decompression context.
pub trait Decompressor: Send + Sync {
    /// Decompresses `input` once it resolves. The returned blob resolves
    /// errored on a corrupt frame or a dictionary mismatch.
    fn decompress(&self, input: &BlobHandle, runner: Option<Arc<dyn TaskRunner>>) -> BlobHandle;
}

fn dictionary_id(dictionary: Option<&BlobHandle>) -> u64 {
    match dictionary {
        Some(dict) => {
            let mut hasher = SipHasher13::new();
            hasher.write(dict.data());
            hasher.finish()
        }
        None => 0,
    }
}

/// Creates a compressor for the given algorithm and dictionary.
pub fn create_compressor(
    kind: CompressionAlgorithmKind,
    dictionary: Option<BlobHandle>,
) -> Box<dyn Compressor> {
    match kind {
        CompressionAlgorithmKind::Lz4 => Box::new(Lz4Codec {
            dict_id: dictionary_id(dictionary.as_ref()),
        }),
    }
}

/// Creates a decompressor for the given algorithm and dictionary.
pub fn create_decompressor(
    kind: CompressionAlgorithmKind,
    dictionary: Option<BlobHandle>,
) -> Box<dyn Decompressor> {
    match kind {
        CompressionAlgorithmKind::Lz4 => Box::new(Lz4Codec {
            dict_id: dictionary_id(dictionary.as_ref()),
        }),
    }
}

struct Lz4Codec {
    dict_id: u64,
}

impl Lz4Codec {
    fn compress_frame(dict_id: u64, payload: &[u8]) -> Vec<u8> {
        let body = lz4_flex::block::compress_prepend_size(payload);
        let mut frame = Vec::with_capacity(12 + body.len());
        frame.extend_from_slice(&LZ4_MAGIC);
        frame.extend_from_slice(&dict_id.to_le_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    fn decompress_frame(dict_id: u64, frame: &[u8]) -> Option<Vec<u8>> {
        if frame.len() < 12 || frame[..4] != LZ4_MAGIC {
            return None;
        }
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&frame[4..12]);
        if u64::from_le_bytes(id_bytes) != dict_id {
            log::warn!("lz4 frame compressed with a different dictionary");
            return None;
        }
        lz4_flex::block::decompress_size_prepended(&frame[12..]).ok()
    }

    fn run_after(
        input: &BlobHandle,
        runner: Option<Arc<dyn TaskRunner>>,
        work: impl FnOnce(BlobHandle, bool) + Send + 'static,
    ) {
        match runner {
            Some(runner) => input.then_on(runner, work),
            None => input.then(work),
        }
    }
}

impl Compressor for Lz4Codec {
    fn compress(&self, input: &BlobHandle, runner: Option<Arc<dyn TaskRunner>>) -> BlobHandle {
        let output = Blob::pending();
        let target = output.clone();
        let dict_id = self.dict_id;
        Self::run_after(input, runner, move |input, ok| {
            if !ok {
                return target.set(Vec::new(), true);
            }
            target.set(Self::compress_frame(dict_id, input.data()), false);
        });
        output
    }
}

impl Decompressor for Lz4Codec {
    fn decompress(&self, input: &BlobHandle, runner: Option<Arc<dyn TaskRunner>>) -> BlobHandle {
        let output = Blob::pending();
        let target = output.clone();
        let dict_id = self.dict_id;
        Self::run_after(input, runner, move |input, ok| {
            if !ok {
                return target.set(Vec::new(), true);
            }
            match Self::decompress_frame(dict_id, input.data()) {
                Some(payload) => target.set(payload, false),
                None => target.set(Vec::new(), true),
            }
        });
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyma_core::task::TaskThread;

    fn round_trip(dictionary: Option<BlobHandle>, payload: &[u8]) -> BlobHandle {
        let kind = CompressionAlgorithmKind::Lz4;
        let compressor = create_compressor(kind, dictionary.clone());
        let decompressor = create_decompressor(kind, dictionary);
        let input = Blob::from_vec(payload.to_vec());
        let compressed = compressor.compress(&input, None);
        compressed.wait();
        assert!(!compressed.errored());
        let output = decompressor.decompress(&compressed, None);
        output.wait();
        output
    }

    #[test]
    fn round_trip_without_dictionary() {
        let payload = b"the quick brown fox jumps over the lazy dog, twice over";
        let output = round_trip(None, payload);
        assert!(!output.errored());
        assert_eq!(output.data(), payload);
    }

    #[test]
    fn round_trip_with_dictionary() {
        let dict = Blob::from_vec(b"shared-dictionary-bytes".to_vec());
        let output = round_trip(Some(dict), b"payload compressed against a dictionary");
        assert!(!output.errored());
    }

    #[test]
    fn dictionary_mismatch_errors_the_output() {
        let kind = CompressionAlgorithmKind::Lz4;
        let compressor = create_compressor(kind, Some(Blob::from_vec(b"dict-a".to_vec())));
        let decompressor = create_decompressor(kind, Some(Blob::from_vec(b"dict-b".to_vec())));
        let input = Blob::from_vec(b"data".to_vec());
        let compressed = compressor.compress(&input, None);
        compressed.wait();
        let output = decompressor.decompress(&compressed, None);
        output.wait();
        assert!(output.errored());
    }

    #[test]
    fn corrupt_frame_errors_the_output() {
        let decompressor = create_decompressor(CompressionAlgorithmKind::Lz4, None);
        let output = decompressor.decompress(&Blob::from_vec(b"not a frame".to_vec()), None);
        output.wait();
        assert!(output.errored());
    }

    #[test]
    fn errored_input_propagates() {
        let compressor = create_compressor(CompressionAlgorithmKind::Lz4, None);
        let input = Blob::pending();
        let compressed = compressor.compress(&input, None);
        input.set(Vec::new(), true);
        compressed.wait();
        assert!(compressed.errored());
    }

    #[test]
    fn work_runs_on_the_given_runner() {
        let runner: Arc<dyn TaskRunner> = Arc::new(TaskThread::new("codec"));
        let compressor = create_compressor(CompressionAlgorithmKind::Lz4, None);
        let input = Blob::pending();
        let compressed = compressor.compress(&input, Some(runner));
        input.set(b"deferred".to_vec(), false);
        compressed.wait();
        assert!(!compressed.errored());
        let decompressor = create_decompressor(CompressionAlgorithmKind::Lz4, None);
        let output = decompressor.decompress(&compressed, None);
        output.wait();
        assert_eq!(output.data(), b"deferred");
    }
}
