//! File-system tools: read, write, list, replace and the working directory.

use super::{lenient_bool, lenient_usize, non_empty, ToolOutput, MAX_READ_BYTES};
use crate::sandbox::Sandbox;
use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use walkdir::WalkDir;

/// Lines returned when a range has a start but no usable end
const DEFAULT_RANGE_LINES: usize = 200;
const DEFAULT_LIST_DEPTH: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReadFileArgs {
    pub path: Option<String>,
    #[serde(deserialize_with = "lenient_usize")]
    pub start_line: Option<usize>,
    #[serde(deserialize_with = "lenient_usize")]
    pub end_line: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WriteFileArgs {
    pub path: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListFilesArgs {
    pub path: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub recursive: Option<bool>,
    #[serde(deserialize_with = "lenient_usize")]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReplaceInFileArgs {
    pub path: Option<String>,
    pub search: Option<String>,
    pub replace: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub all: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub regex: Option<bool>,
}

// ═══════════════════════════════════════════════════════════════════════════
//  CURRENT_DIR
// ═══════════════════════════════════════════════════════════════════════════

pub fn current_dir() -> ToolOutput {
    match std::env::current_dir() {
        Ok(dir) => ToolOutput::Text(dir.display().to_string()),
        Err(e) => ToolOutput::error(format!("Cannot determine current directory: {}", e)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  READ_FILE
// ═══════════════════════════════════════════════════════════════════════════

pub async fn read_file(sandbox: &Sandbox, args: &ReadFileArgs) -> ToolOutput {
    try_read_file(sandbox, args)
        .await
        .unwrap_or_else(ToolOutput::from_error)
}

async fn try_read_file(sandbox: &Sandbox, args: &ReadFileArgs) -> anyhow::Result<ToolOutput> {
    let Some(path) = non_empty(&args.path) else {
        return Ok(ToolOutput::error("path is required"));
    };
    let resolved = sandbox.resolve(path)?;

    let Some(meta) = stat(resolved.as_path()).await else {
        return Ok(ToolOutput::error(format!("File not found: {}", path)));
    };
    if !meta.is_file() {
        return Ok(ToolOutput::error(format!("Path is not a file: {}", path)));
    }

    let wants_range = args.start_line.is_some() || args.end_line.is_some();
    if !wants_range {
        if meta.len() > MAX_READ_BYTES {
            return Ok(ToolOutput::error(format!(
                "File is too large to read at once ({} bytes). Use start_line/end_line.",
                meta.len()
            )));
        }
        let bytes = tokio::fs::read(resolved.as_path())
            .await
            .with_context(|| format!("Cannot read file {}", path))?;
        return Ok(ToolOutput::Text(String::from_utf8_lossy(&bytes).into_owned()));
    }

    let start = args.start_line.unwrap_or(1).max(1);
    let end = match args.end_line {
        Some(end) if end >= start => end,
        _ => start.saturating_add(DEFAULT_RANGE_LINES),
    };
    let text = read_line_range(resolved.as_path(), start, end)
        .await
        .with_context(|| format!("Cannot read file {}", path))?;
    Ok(ToolOutput::Text(text))
}

/// Stream the inclusive, 1-indexed line range `start..=end` without loading
/// the whole file.
async fn read_line_range(path: &Path, start: usize, end: usize) -> anyhow::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_no += 1;
        if line_no < start {
            continue;
        }
        if line_no > end {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        lines.push(line.trim_end_matches('\n').trim_end_matches('\r').to_string());
    }

    Ok(lines.join("\n"))
}

// ═══════════════════════════════════════════════════════════════════════════
//  WRITE_FILE
// ═══════════════════════════════════════════════════════════════════════════

pub async fn write_file(sandbox: &Sandbox, args: &WriteFileArgs) -> ToolOutput {
    let Some(path) = non_empty(&args.path) else {
        return ToolOutput::error("path is required");
    };
    let Some(content) = args.content.as_deref() else {
        return ToolOutput::error("content is required");
    };
    let resolved = match sandbox.resolve(path) {
        Ok(resolved) => resolved,
        Err(e) => return ToolOutput::error(e),
    };

    let result = async {
        if let Some(parent) = resolved.as_path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(resolved.as_path(), content).await
    }
    .await;

    match result {
        Ok(()) => ToolOutput::Text(format!("OK: File written -> {}", path)),
        Err(e) => ToolOutput::error(format!("Cannot write file {}: {}", path, e)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  LIST_FILES
// ═══════════════════════════════════════════════════════════════════════════

pub async fn list_files(sandbox: &Sandbox, args: &ListFilesArgs) -> ToolOutput {
    try_list_files(sandbox, args)
        .await
        .unwrap_or_else(ToolOutput::from_error)
}

async fn try_list_files(sandbox: &Sandbox, args: &ListFilesArgs) -> anyhow::Result<ToolOutput> {
    let path = non_empty(&args.path).unwrap_or(".");
    let resolved = sandbox.resolve(path)?;

    let Some(meta) = stat(resolved.as_path()).await else {
        return Ok(ToolOutput::error(format!("Directory not found: {}", path)));
    };
    if !meta.is_dir() {
        return Ok(ToolOutput::error(format!("Path is not a directory: {}", path)));
    }

    let depth = args.max_depth.unwrap_or(DEFAULT_LIST_DEPTH);
    if !args.recursive.unwrap_or(false) || depth == 0 {
        let mut entries = tokio::fs::read_dir(resolved.as_path())
            .await
            .with_context(|| format!("Cannot list directory {}", path))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        return Ok(ToolOutput::Lines(names));
    }

    let root = resolved.into_path_buf();
    let listing = tokio::task::spawn_blocking(move || walk_listing(&root, depth))
        .await
        .context("Directory walk failed")?;
    Ok(ToolOutput::Lines(listing))
}

/// Depth-bounded walk; paths are relative to `root`, directories end in `/`.
fn walk_listing(root: &Path, max_depth: usize) -> Vec<String> {
    let mut out: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let mut display = relative.to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                display.push('/');
            }
            Some(display)
        })
        .collect();
    out.sort();
    out
}

// ═══════════════════════════════════════════════════════════════════════════
//  REPLACE_IN_FILE
// ═══════════════════════════════════════════════════════════════════════════

pub async fn replace_in_file(sandbox: &Sandbox, args: &ReplaceInFileArgs) -> ToolOutput {
    try_replace_in_file(sandbox, args)
        .await
        .unwrap_or_else(ToolOutput::from_error)
}

async fn try_replace_in_file(
    sandbox: &Sandbox,
    args: &ReplaceInFileArgs,
) -> anyhow::Result<ToolOutput> {
    let Some(search) = args.search.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(ToolOutput::error("search is required"));
    };
    let Some(path) = non_empty(&args.path) else {
        return Ok(ToolOutput::error("path is required"));
    };
    let resolved = sandbox.resolve(path)?;

    let Some(meta) = stat(resolved.as_path()).await else {
        return Ok(ToolOutput::error(format!("File not found: {}", path)));
    };
    if !meta.is_file() {
        return Ok(ToolOutput::error(format!("Path is not a file: {}", path)));
    }

    let content = tokio::fs::read_to_string(resolved.as_path())
        .await
        .with_context(|| format!("Cannot read file {}", path))?;
    let replacement = args.replace.as_deref().unwrap_or("");
    let all = args.all.unwrap_or(true);

    let next = if args.regex.unwrap_or(false) {
        let re = Regex::new(search).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
        if all {
            re.replace_all(&content, replacement).into_owned()
        } else {
            re.replace(&content, replacement).into_owned()
        }
    } else if all {
        content.replace(search, replacement)
    } else {
        content.replacen(search, replacement, 1)
    };

    if next == content {
        return Ok(ToolOutput::Text("OK: No changes made".to_string()));
    }

    tokio::fs::write(resolved.as_path(), next)
        .await
        .with_context(|| format!("Cannot write file {}", path))?;
    Ok(ToolOutput::Text(format!("OK: Replaced in {}", path)))
}

async fn stat(path: &Path) -> Option<std::fs::Metadata> {
    tokio::fs::metadata(path).await.ok()
}
