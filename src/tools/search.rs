//! Text search across the project.
//!
//! Uses ripgrep when it is installed and falls back to a built-in walk
//! otherwise. Both produce `path:line: text` results relative to the searched
//! directory.

use super::{lenient_bool, lenient_usize, non_empty, ToolOutput, MAX_READ_BYTES};
use crate::sandbox::Sandbox;
use anyhow::Context;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;
use walkdir::WalkDir;

pub const DEFAULT_MAX_RESULTS: usize = 50;

/// Directories (and files) never searched by the built-in walk
const IGNORED: &[&str] = &[".git", "node_modules", ".lint-cli", "dist", "build", "target"];

/// A NUL byte in this many leading bytes marks a file as binary
const BINARY_SNIFF_BYTES: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchTextArgs {
    pub pattern: Option<String>,
    pub path: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub regex: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub case_sensitive: Option<bool>,
    #[serde(deserialize_with = "lenient_usize")]
    pub max_results: Option<usize>,
}

/// How a search is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Ripgrep,
    Builtin,
}

impl SearchBackend {
    /// Prefer ripgrep when an `rg` executable is on `PATH`. Cheap enough to
    /// repeat for every search.
    pub fn detect() -> Self {
        if executable_on_path("rg") {
            SearchBackend::Ripgrep
        } else {
            SearchBackend::Builtin
        }
    }
}

fn executable_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    let candidates: Vec<String> = if cfg!(windows) {
        vec![format!("{}.exe", name), name.to_string()]
    } else {
        vec![name.to_string()]
    };
    std::env::split_paths(&paths).any(|dir| candidates.iter().any(|c| dir.join(c).is_file()))
}

struct SearchQuery {
    pattern: String,
    regex: Option<Regex>,
    case_sensitive: bool,
    max_results: usize,
}

impl SearchQuery {
    fn matches(&self, line: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(line),
            None if self.case_sensitive => line.contains(&self.pattern),
            None => line.to_lowercase().contains(&self.pattern.to_lowercase()),
        }
    }
}

pub async fn search_text(sandbox: &Sandbox, args: &SearchTextArgs) -> ToolOutput {
    search_text_with(SearchBackend::detect(), sandbox, args).await
}

pub async fn search_text_with(
    backend: SearchBackend,
    sandbox: &Sandbox,
    args: &SearchTextArgs,
) -> ToolOutput {
    try_search(backend, sandbox, args)
        .await
        .unwrap_or_else(ToolOutput::from_error)
}

async fn try_search(
    backend: SearchBackend,
    sandbox: &Sandbox,
    args: &SearchTextArgs,
) -> anyhow::Result<ToolOutput> {
    let Some(pattern) = args.pattern.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(ToolOutput::error("pattern is required"));
    };
    let path = non_empty(&args.path).unwrap_or(".");
    let resolved = sandbox.resolve(path)?;

    let case_sensitive = args.case_sensitive.unwrap_or(false);
    let regex = if args.regex.unwrap_or(false) {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
        Some(re)
    } else {
        None
    };

    if !resolved.as_path().exists() {
        return Ok(ToolOutput::error(format!("Path not found: {}", path)));
    }

    let query = SearchQuery {
        pattern: pattern.to_string(),
        regex,
        case_sensitive,
        max_results: args
            .max_results
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_RESULTS),
    };

    if backend == SearchBackend::Ripgrep {
        match ripgrep(&query, resolved.as_path()).await? {
            Some(lines) => return Ok(ToolOutput::Lines(lines)),
            None => debug!("rg is not available, using built-in search"),
        }
    }

    let base = resolved.into_path_buf();
    let lines = tokio::task::spawn_blocking(move || walk_search(&query, &base))
        .await
        .context("Search task failed")?;
    Ok(ToolOutput::Lines(lines))
}

// ═══════════════════════════════════════════════════════════════════════════
//  RIPGREP
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `Ok(None)` when `rg` cannot be started at all.
async fn ripgrep(query: &SearchQuery, target: &Path) -> anyhow::Result<Option<Vec<String>>> {
    // Run from the searched directory so reported paths are relative to it
    let (dir, operand): (PathBuf, &OsStr) = if target.is_dir() {
        (target.to_path_buf(), OsStr::new("."))
    } else {
        let parent = target.parent().unwrap_or(target).to_path_buf();
        (parent, target.file_name().unwrap_or(target.as_os_str()))
    };

    let mut cmd = tokio::process::Command::new("rg");
    cmd.args([
        "--line-number",
        "--with-filename",
        "--no-heading",
        "--color",
        "never",
        "--null",
    ]);
    if !query.case_sensitive {
        cmd.arg("-i");
    }
    if query.regex.is_none() {
        cmd.arg("-F");
    }
    cmd.arg("--max-count")
        .arg(query.max_results.to_string())
        .arg("-e")
        .arg(&query.pattern)
        .arg("--")
        .arg(operand)
        .current_dir(&dir)
        .stdin(Stdio::null());

    let output = match cmd.output().await {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("Failed to run rg"),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<String> = stdout
        .lines()
        .filter(|l| !l.is_empty())
        .map(format_ripgrep_line)
        .take(query.max_results)
        .collect();

    // Exit code 1 means no matches; 2 means an error, possibly after partial output
    match output.status.code() {
        Some(0) | Some(1) => Ok(Some(lines)),
        _ if !lines.is_empty() => Ok(Some(lines)),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("rg failed: {}", stderr.trim())
        }
    }
}

/// `path\0line:text` (from `--null`) to `path:line: text`
fn format_ripgrep_line(line: &str) -> String {
    let Some((path, rest)) = line.split_once('\0') else {
        return line.to_string();
    };
    let path = path.strip_prefix("./").unwrap_or(path);
    match rest.split_once(':') {
        Some((line_no, text)) => format!("{}:{}: {}", path, line_no, text),
        None => format!("{}:{}", path, rest),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  BUILT-IN WALK
// ═══════════════════════════════════════════════════════════════════════════

fn walk_search(query: &SearchQuery, base: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let walker = WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.file_name()));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let too_large = entry
            .metadata()
            .map(|m| m.len() > MAX_READ_BYTES)
            .unwrap_or(true);
        if too_large {
            continue;
        }
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        if is_binary(&bytes) {
            continue;
        }

        let relative = match entry.path().strip_prefix(base) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
            _ => entry.file_name().to_string_lossy().into_owned(),
        };
        let text = String::from_utf8_lossy(&bytes);
        for (index, line) in text.split('\n').enumerate() {
            let line = line.trim_end_matches('\r');
            if query.matches(line) {
                out.push(format!("{}:{}: {}", relative, index + 1, line));
                if out.len() >= query.max_results {
                    return out;
                }
            }
        }
    }
    out
}

fn is_ignored(name: &OsStr) -> bool {
    name.to_str().map(|n| IGNORED.contains(&n)).unwrap_or(false)
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Sandbox) {
        let dir = tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path());
        (dir, sandbox)
    }

    fn args(pattern: &str) -> SearchTextArgs {
        SearchTextArgs {
            pattern: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    async fn builtin(sandbox: &Sandbox, args: &SearchTextArgs) -> Vec<String> {
        match search_text_with(SearchBackend::Builtin, sandbox, args).await {
            ToolOutput::Lines(lines) => lines,
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_builtin_formats_relative_results() {
        let (dir, sandbox) = setup();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/lib.rs"),
            "fn hello_world() {\n    println!(\"hello\");\n}",
        )
        .unwrap();

        let lines = builtin(&sandbox, &args("hello_world")).await;
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(lines, vec![format!("src{}lib.rs:1: fn hello_world() {{", sep)]);
    }

    #[tokio::test]
    async fn test_builtin_case_handling() {
        let (dir, sandbox) = setup();
        fs::write(dir.path().join("a.txt"), "Hello\nhello\nHELLO").unwrap();

        assert_eq!(builtin(&sandbox, &args("hello")).await.len(), 3);

        let mut sensitive = args("hello");
        sensitive.case_sensitive = Some(true);
        assert_eq!(builtin(&sandbox, &sensitive).await, vec!["a.txt:2: hello"]);
    }

    #[tokio::test]
    async fn test_builtin_regex() {
        let (dir, sandbox) = setup();
        fs::write(dir.path().join("a.txt"), "foo1\nbar\nfoo22").unwrap();

        let mut query = args(r"^foo\d+$");
        query.regex = Some(true);
        assert_eq!(
            builtin(&sandbox, &query).await,
            vec!["a.txt:1: foo1", "a.txt:3: foo22"]
        );
    }

    #[tokio::test]
    async fn test_builtin_skips_ignored_and_binary_files() {
        let (dir, sandbox) = setup();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "needle").unwrap();
        fs::write(dir.path().join(".git/config"), "needle").unwrap();
        fs::write(dir.path().join("blob.bin"), b"needle\0\x01\x02").unwrap();
        fs::write(dir.path().join("keep.txt"), "a needle here").unwrap();

        assert_eq!(
            builtin(&sandbox, &args("needle")).await,
            vec!["keep.txt:1: a needle here"]
        );
    }

    #[tokio::test]
    async fn test_search_caps_results() {
        let (dir, sandbox) = setup();
        let content = (0..10)
            .map(|i| format!("match {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(dir.path().join("many.txt"), content).unwrap();

        let mut query = args("match");
        query.max_results = Some(3);

        assert_eq!(builtin(&sandbox, &query).await.len(), 3);

        // Whichever backend is available locally
        match search_text(&sandbox, &query).await {
            ToolOutput::Lines(lines) => assert_eq!(lines.len(), 3),
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_single_file_path() {
        let (dir, sandbox) = setup();
        fs::write(dir.path().join("one.txt"), "target line").unwrap();
        fs::write(dir.path().join("two.txt"), "target line").unwrap();

        let mut query = args("target");
        query.path = Some("one.txt".to_string());
        assert_eq!(builtin(&sandbox, &query).await, vec!["one.txt:1: target line"]);

        match search_text(&sandbox, &query).await {
            ToolOutput::Lines(lines) => assert_eq!(lines, vec!["one.txt:1: target line"]),
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_errors() {
        let (_dir, sandbox) = setup();

        assert_eq!(
            search_text(&sandbox, &SearchTextArgs::default()).await,
            ToolOutput::error("pattern is required")
        );

        let mut outside = args("x");
        outside.path = Some("../..".to_string());
        assert_eq!(
            search_text(&sandbox, &outside).await,
            ToolOutput::error("Path outside project: ../..")
        );

        let mut bad = args("(unclosed");
        bad.regex = Some(true);
        match search_text(&sandbox, &bad).await {
            ToolOutput::Error(reason) => assert!(reason.starts_with("Invalid regex")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_format_ripgrep_line() {
        assert_eq!(
            format_ripgrep_line("./src/a.rs\u{0}12:let x = 1;"),
            "src/a.rs:12: let x = 1;"
        );
        assert_eq!(
            format_ripgrep_line("a.rs\u{0}3:time: 10:30"),
            "a.rs:3: time: 10:30"
        );
        assert_eq!(format_ripgrep_line("no separator"), "no separator");
    }
}
