//! On-disk form of the header window: a version byte, the newest height as
//! u32 LE, a count byte, then `count` 32-byte hashes oldest first.

use std::io;
use std::path::Path;

use super::HeaderWindow;
use crate::chain::Hash32;
use crate::error::{OracleError, Result};

pub const SNAPSHOT_VERSION: u8 = 0;

pub fn encode(window: &HeaderWindow) -> Vec<u8> {
    let count = window.hashes.len().min(u8::MAX as usize);
    let mut out = Vec::with_capacity(6 + count * Hash32::SIZE);
    out.push(SNAPSHOT_VERSION);
    out.extend_from_slice(&window.height.to_le_bytes());
    out.push(count as u8);
    for hash in &window.hashes[window.hashes.len() - count..] {
        out.extend_from_slice(hash.as_bytes());
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<HeaderWindow> {
    let malformed = |reason: String| OracleError::Malformed {
        what: "header snapshot",
        reason,
    };

    let [version, h0, h1, h2, h3, count, body @ ..] = bytes else {
        return Err(malformed(format!("{} bytes is too short", bytes.len())));
    };
    if *version != SNAPSHOT_VERSION {
        return Err(malformed(format!("unknown version {version}")));
    }
    if body.len() != usize::from(*count) * Hash32::SIZE {
        return Err(malformed(format!(
            "{count} hashes do not fit {} bytes",
            body.len()
        )));
    }

    let hashes = body
        .chunks_exact(Hash32::SIZE)
        .map(Hash32::from_slice)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(HeaderWindow {
        hashes,
        height: u32::from_le_bytes([*h0, *h1, *h2, *h3]),
    })
}

/// Reads a snapshot; a missing file yields `None`.
pub async fn read(path: &Path) -> Result<Option<HeaderWindow>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => decode(&bytes).map(Some),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub async fn write(path: &Path, window: &HeaderWindow) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, encode(window)).await?;
    Ok(())
}
