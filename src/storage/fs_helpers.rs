//! Generic file-backed primitives shared by the three stores: one JSON
//! document per entity, or one JSONL append log for time-series data.
//! Mirrors the teacher's `json_file` read/write helpers, generalized over
//! any serializable type instead of being written once per entity.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::models::Id;

pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(content) => {
            let value = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse JSON from {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path).await?;
    let content = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to finalize {}", path.display()))?;
    Ok(())
}

pub async fn delete_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to delete {}", path.display())),
    }
}

/// Lists the `{id}.json` files directly under `dir`, deserializing each.
/// Files that fail to parse are skipped with a warning rather than aborting
/// the whole listing.
pub async fn list_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(Id, T)>> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e).with_context(|| format!("failed to read directory {}", dir.display())),
    };

    while let Some(entry) = entries.next_entry().await.context("failed to read directory entry")? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<T>(&content) {
                Ok(value) => out.push((Id::from_string(stem), value)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed entity file"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    Ok(out)
}

pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };

    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut items = Vec::new();

    while let Some(line) = lines.next_line().await.context("failed to read line")? {
        if line.trim().is_empty() {
            continue;
        }
        let item: T = serde_json::from_str(&line)
            .with_context(|| format!("failed to parse JSONL line: {line}"))?;
        items.push(item);
    }

    Ok(items)
}

pub async fn append_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    ensure_parent_dir(path).await?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {} for append", path.display()))?;

    for item in items {
        let line = serde_json::to_string(item).context("failed to serialize item")?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }

    Ok(())
}

/// Overwrites the whole JSONL file with `items`, used by rebuild routines
/// (e.g. `RebuildDailyTrends`) that recompute a derived log from scratch.
pub async fn rewrite_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    ensure_parent_dir(path).await?;
    let mut buf = String::new();
    for item in items {
        buf.push_str(&serde_json::to_string(item).context("failed to serialize item")?);
        buf.push('\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    fs::write(&tmp, buf)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to finalize {}", path.display()))?;
    Ok(())
}

pub fn entity_path(dir: &Path, id: &Id) -> PathBuf {
    dir.join(format!("{id}.json"))
}

pub fn composite_id(parts: &[&str]) -> Id {
    Id::from_string(parts.join("_"))
}
