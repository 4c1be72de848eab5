//! POSIX shell quoting and path helpers for building remote scripts.

/// Quote `s` as a single shell word.
pub fn quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"/._-+:=@,".contains(&b))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Join path segments with `/`, collapsing duplicate separators at the seams.
pub fn join(base: &str, segments: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for seg in segments {
        let seg = seg.trim_matches('/');
        if seg.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Parent directory of an absolute remote path.
pub fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Whether `path` is `root` itself or lies beneath it.
///
/// Both paths are compared lexically after rejecting `..` segments, so a
/// path that climbs out of the root never matches.
pub fn is_within(root: &str, path: &str) -> bool {
    if path.split('/').any(|seg| seg == "..") {
        return false;
    }
    let root = root.trim_end_matches('/');
    match path.strip_prefix(root) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quote("/home/streaming/radio1"), "/home/streaming/radio1");
        assert_eq!(quote("my file.mp4"), "'my file.mp4'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn joining() {
        assert_eq!(join("/home/streaming/", &["radio1", "/shows/"]), "/home/streaming/radio1/shows");
        assert_eq!(join("/", &["a"]), "/a");
        assert_eq!(join("/", &[]), "/");
    }

    #[test]
    fn parents() {
        assert_eq!(parent("/a/b/c.smil"), "/a/b");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("plain"), ".");
    }

    #[test]
    fn containment() {
        assert!(is_within("/home/streaming/radio1", "/home/streaming/radio1/shows/a.mp4"));
        assert!(is_within("/home/streaming/radio1/", "/home/streaming/radio1"));
        assert!(!is_within("/home/streaming/radio1", "/home/streaming/radio10/a.mp4"));
        assert!(!is_within("/home/streaming/radio1", "/home/streaming/radio1/../radio2/a.mp4"));
        assert!(!is_within("/home/streaming/radio1", "/etc/passwd"));
    }
}
