//! Check that a zip archive has been appended to a file.
//!
//! Only used to tell a user "the application is missing" before the runtime
//! fails with something less specific. It is not a validation of the archive.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Size of an end-of-central-directory record without archive comment.
pub const EOCD_LEN: usize = 22;

/// "PK\x05\x06", the end-of-central-directory signature.
pub const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// True iff the last 22 bytes of `path` start with the EOCD signature.
pub fn has_appended_archive(path: &Path) -> bool {
    read_tail(path)
        .map(|tail| tail[..EOCD_SIGNATURE.len()] == EOCD_SIGNATURE)
        .unwrap_or(false)
}

fn read_tail(path: &Path) -> std::io::Result<[u8; EOCD_LEN]> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-(EOCD_LEN as i64)))?;
    let mut tail = [0u8; EOCD_LEN];
    file.read_exact(&mut tail)?;
    Ok(tail)
}
