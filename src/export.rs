// 📤 JSON-lines export - one serialized record per line

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialize each item as one JSON object per line; returns lines written
pub fn write_jsonl<W: Write, T: Serialize>(writer: W, items: &[T]) -> Result<usize> {
    let mut out = BufWriter::new(writer);
    for item in items {
        serde_json::to_writer(&mut out, item).context("Failed to serialize record")?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(items.len())
}

pub fn write_jsonl_file<T: Serialize>(path: &Path, items: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    write_jsonl(file, items)
}
