//! Shared helpers for the integration suites.
#![allow(dead_code)]

use lzarch::Path;

/// Deterministic, mildly compressible payload.
///
/// Interleaves repeated runs with xorshift noise so every codec has both
/// redundancy to exploit and entropy to carry through.
pub fn structured_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let byte = (state >> 32) as u8;
        let run = 1 + (state % 24) as usize;
        for _ in 0..run.min(len - out.len()) {
            out.push(byte);
        }
        if out.len() < len {
            out.push(state as u8);
        }
    }
    out
}

/// Creates a scratch directory and returns it with its engine path.
pub fn temp_root() -> (tempfile::TempDir, Path) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = Path::new(&dir.path().to_string_lossy());
    (dir, path)
}

/// Writes a file below `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) -> Path {
    let full = root.appending(relative);
    full.removing_last_component().create_dir(true).unwrap();
    std::fs::write(full.as_str(), bytes).unwrap();
    full
}
