//! Byte ranges and the remote commands that extract them.

use streamctl_remote::shell::quote;

/// Parse a `Range` header against a file of `file_size` bytes.
///
/// Supports `bytes=0-499`, `bytes=500-` and `bytes=-500`. The end is
/// clamped to the file size. Returns `None` for unsatisfiable or malformed
/// ranges.
pub fn parse_range_header(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let header = header.trim().strip_prefix("bytes=")?;
    if file_size == 0 || header.contains(',') {
        return None;
    }

    let (start, end) = header.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, false) => {
            let suffix_len: u64 = end.parse().ok()?;
            if suffix_len == 0 {
                return None;
            }
            Some((file_size.saturating_sub(suffix_len), file_size - 1))
        }
        (false, true) => {
            let start: u64 = start.parse().ok()?;
            (start < file_size).then_some((start, file_size - 1))
        }
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            if start >= file_size || start > end {
                return None;
            }
            Some((start, end.min(file_size - 1)))
        }
        (true, true) => None,
    }
}

/// How to read `[start, end]` of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPlan {
    pub large_file_threshold: u64,
    pub block_size: u64,
}

impl ReadPlan {
    /// Shell script that writes exactly the requested bytes to stdout.
    ///
    /// Large files are read with `dd` in whole blocks starting at the block
    /// containing `start`, then trimmed to the exact range. Small files use
    /// a byte-exact `tail | head`.
    pub fn script(&self, path: &str, file_size: u64, range: Option<(u64, u64)>) -> String {
        let p = quote(path);
        let Some((start, end)) = range else {
            return format!("cat -- {p}");
        };
        let len = end - start + 1;

        if file_size >= self.large_file_threshold && self.block_size > 0 {
            let bs = self.block_size;
            let skip = start / bs;
            let offset = start - skip * bs;
            let count = (offset + len).div_ceil(bs);
            format!(
                "dd if={p} bs={bs} skip={skip} count={count} 2>/dev/null | tail -c +{} | head -c {len}",
                offset + 1
            )
        } else {
            format!("tail -c +{} -- {p} | head -c {len}", start + 1)
        }
    }
}
