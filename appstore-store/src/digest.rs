//! Content digests for package integrity verification.
//!
//! Uploads are hashed while they are written, so the digest always describes
//! the bytes that actually reached the disk. Memory use is bounded by the
//! size of the chunk in flight.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use md5::{Digest, Md5};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Chunk size used when reading blobs back from disk (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// MD5 digest and byte count of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    /// Lowercase hex, always 32 characters
    pub md5_hex: String,
    pub size: u64,
}

/// Accumulates a digest and byte count over chunks fed in order
#[derive(Default)]
pub struct IntegrityVerifier {
    hasher: Md5,
    size: u64,
}

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
    }

    pub fn bytes_seen(&self) -> u64 {
        self.size
    }

    pub fn finish(self) -> ContentDigest {
        ContentDigest {
            md5_hex: format!("{:x}", self.hasher.finalize()),
            size: self.size,
        }
    }
}

/// Calculate the MD5 hex digest of an in-memory buffer.
///
/// # Examples
///
/// ```
/// # use appstore_store::digest::md5_hex;
/// assert_eq!(md5_hex(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
/// ```
pub fn md5_hex(data: &[u8]) -> String {
    let mut verifier = IntegrityVerifier::new();
    verifier.update(data);
    verifier.finish().md5_hex
}

/// Copy `stream` into `writer` chunk by chunk, hashing every chunk after it
/// was written.
///
/// Errors yielded by the stream itself (for example a client that went away
/// mid-upload) are reported as I/O errors.
pub async fn copy_and_hash<S, E, W>(stream: S, writer: &mut W) -> io::Result<ContentDigest>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
    W: AsyncWrite + Unpin,
{
    let mut stream = std::pin::pin!(stream);
    let mut verifier = IntegrityVerifier::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(io::Error::other)?;
        writer.write_all(&chunk).await?;
        verifier.update(&chunk);
    }
    writer.flush().await?;

    Ok(verifier.finish())
}

/// Re-hash a stored blob from disk
pub async fn hash_file(path: &Path) -> io::Result<ContentDigest> {
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut verifier = IntegrityVerifier::new();

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        verifier.update(&buf[..n]);
    }

    Ok(verifier.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_md5_known_values() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_chunked_digest_matches_whole_buffer() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let mut verifier = IntegrityVerifier::new();
        for chunk in data.chunks(7_919) {
            verifier.update(chunk);
        }
        assert_eq!(verifier.bytes_seen(), data.len() as u64);

        let digest = verifier.finish();
        assert_eq!(digest.md5_hex, md5_hex(&data));
        assert_eq!(digest.md5_hex.len(), 32);
    }

    #[tokio::test]
    async fn test_copy_and_hash_writes_every_byte() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let mut out: Vec<u8> = Vec::new();

        let digest = copy_and_hash(stream::iter(chunks), &mut out).await.unwrap();

        assert_eq!(out, b"hello world");
        assert_eq!(digest.size, 11);
        assert_eq!(digest.md5_hex, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn test_copy_and_hash_surfaces_stream_errors() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let mut out: Vec<u8> = Vec::new();

        let err = copy_and_hash(stream::iter(chunks), &mut out)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(err.to_string().contains("client went away"));
    }

    #[tokio::test]
    async fn test_hash_file_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let data = vec![7u8; CHUNK_SIZE * 2 + 13];
        tokio::fs::write(&path, &data).await.unwrap();

        let digest = hash_file(&path).await.unwrap();

        assert_eq!(digest.size, data.len() as u64);
        assert_eq!(digest.md5_hex, md5_hex(&data));
    }
}
