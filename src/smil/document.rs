//! The playlist/schedule document consumed by the media engine.
//!
//! Rendering is deterministic: the same document always produces the same
//! bytes, and nothing time-dependent is written into it.

use std::fmt::Write as _;

use streamctl_db::models::PlaylistItem;

/// One `<video>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmilVideo {
    /// Engine-relative source, e.g. `mp4:shows/intro.mp4`.
    pub src: String,
    /// Seconds to play, `-1` to play to the end.
    pub length: i64,
}

/// One `<playlist>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmilPlaylist {
    pub name: String,
    pub play_on_stream: String,
    pub repeat: bool,
    /// `YYYY-MM-DD HH:MM:SS`, absent in single-playlist mode.
    pub scheduled: Option<String>,
    pub videos: Vec<SmilVideo>,
}

/// A complete document for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmilDocument {
    pub stream: String,
    pub playlists: Vec<SmilPlaylist>,
}

impl SmilDocument {
    /// A document with the stream declaration and no playlists.
    pub fn empty(stream: &str) -> Self {
        Self {
            stream: stream.to_string(),
            playlists: Vec::new(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(256 + self.playlists.len() * 256);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<smil>\n");
        out.push_str("    <head/>\n");
        out.push_str("    <body>\n");
        let _ = writeln!(out, "        <stream name=\"{}\"/>", escape(&self.stream));

        for playlist in &self.playlists {
            let _ = write!(
                out,
                "        <playlist name=\"{}\" playOnStream=\"{}\" repeat=\"{}\"",
                escape(&playlist.name),
                escape(&playlist.play_on_stream),
                playlist.repeat
            );
            if let Some(when) = &playlist.scheduled {
                let _ = write!(out, " scheduled=\"{}\"", escape(when));
            }
            out.push_str(">\n");
            for video in &playlist.videos {
                let _ = writeln!(
                    out,
                    "            <video length=\"{}\" src=\"{}\" start=\"0\"/>",
                    video.length,
                    escape(&video.src)
                );
            }
            out.push_str("        </playlist>\n");
        }

        out.push_str("    </body>\n");
        out.push_str("</smil>\n");
        out
    }
}

/// Escape text for use inside a double-quoted XML attribute.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

/// Engine source for a playlist item: `mp4:<folder>/<file>` relative to the
/// tenant root.
///
/// Known absolute prefixes and the tenant root are stripped from the stored
/// path. When none matches, the path is rebuilt from the folder and file
/// names. The `mp4:` scheme is used whatever the container.
pub fn engine_source(
    item: &PlaylistItem,
    login: &str,
    tenant_root: &str,
    strip_prefixes: &[String],
) -> String {
    let mut prefixes: Vec<&str> = strip_prefixes.iter().map(String::as_str).collect();
    prefixes.push(tenant_root);
    // Longest first so a nested prefix wins over its parent.
    prefixes.sort_by_key(|p| std::cmp::Reverse(p.trim_end_matches('/').len()));

    let path = item.remote_path.as_str();
    let relative = prefixes.iter().find_map(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return None;
        }
        let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
        let rest = rest.strip_prefix(&format!("{login}/")).unwrap_or(rest);
        (!rest.is_empty() && !rest.split('/').any(|seg| seg == "..")).then_some(rest)
    });

    match relative {
        Some(rel) => format!("mp4:{rel}"),
        None => format!("mp4:{}/{}", item.folder_name, item.file_name),
    }
}

/// Stored duration, or `-1` when unknown.
pub fn video_length(duration_secs: Option<i64>) -> i64 {
    match duration_secs {
        Some(secs) if secs > 0 => secs,
        _ => -1,
    }
}
