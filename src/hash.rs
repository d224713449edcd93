//! Content fingerprinting: whole-file MD5 below 10 MiB, a
//! two-level chunked construction at or above it. The split point must be
//! byte-exact across machines; do not change `CHUNK_SIZE` or
//! `WHOLE_FILE_THRESHOLD` without treating it as a wire-format break.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

pub const WHOLE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;
const CHUNK_SIZE: usize = 1024 * 1024;

/// The empty-hash sentinel: MD5 of the empty byte string. Excluded from
/// rename/copy matching and used to mark `.ignore` entries.
pub const EMPTY_HASH: &str = "d41d8cd98f00b204e9800998ecf8427e";

pub fn hash_file(path: &Path) -> Result<String> {
    let size = path
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    if size < WHOLE_FILE_THRESHOLD {
        hash_whole(path)
    } else {
        hash_chunked(path)
    }
}

fn hash_whole(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut ctx = md5::Context::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

fn hash_chunked(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let size = file.metadata()?.len() as usize;
    let full_chunks = size / CHUNK_SIZE;

    let mut buf = [0u8; CHUNK_SIZE];
    let mut concat = String::new();
    for _ in 0..full_chunks {
        read_exact_or_less(&mut file, &mut buf)?;
        concat.push_str(&format!("{:x}", md5::compute(buf)));
    }

    // The remainder, which may be empty when `size` is an exact multiple of
    // CHUNK_SIZE — the original always hashes a trailing (possibly empty)
    // tail digest, and cross-machine agreement depends on replicating that.
    let remainder = size - full_chunks * CHUNK_SIZE;
    let mut tail = vec![0u8; remainder];
    read_exact_or_less(&mut file, &mut tail)?;
    concat.push_str(&format!("{:x}", md5::compute(&tail)));

    Ok(format!("{:x}", md5::compute(concat.as_bytes())))
}

fn read_exact_or_less(file: &mut File, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(())
}

pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}
