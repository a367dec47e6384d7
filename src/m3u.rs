//! M3U playlist writer

use std::fs;
use std::path::Path;

use crate::error::ArtifactWriteError;
use crate::models::StreamEntry;

pub const HEADER: &str = "#EXTM3U";

/// Render the playlist. Entries without a URL are left out entirely.
pub fn render_playlist(entries: &[StreamEntry]) -> String {
    let mut out = String::with_capacity(64 + entries.len() * 160);
    out.push_str(HEADER);
    out.push('\n');

    for entry in entries {
        let Some(url) = &entry.url else {
            continue;
        };
        let channel = &entry.channel;
        let group = channel.category.as_deref().unwrap_or_default();
        out.push_str(&format!(
            "#EXTINF:-1 group-title=\"{}\" tvg-id=\"{}\",{}\n{}\n",
            attr_value(group),
            attr_value(&channel.guide_id()),
            single_line(&channel.name),
            url.trim(),
        ));
    }
    out
}

/// Write the playlist and return the number of channel blocks.
pub fn write_playlist(path: &Path, entries: &[StreamEntry]) -> Result<usize, ArtifactWriteError> {
    let content = render_playlist(entries);
    fs::write(path, content).map_err(|source| ArtifactWriteError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(entries.iter().filter(|e| e.url.is_some()).count())
}

/// Attribute values are double-quoted and cannot carry a quote themselves.
fn attr_value(value: &str) -> String {
    single_line(value).replace('"', "'")
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
