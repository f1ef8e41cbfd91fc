/*
 * Tinker - Sandboxed Tool-Calling Agent
 * File Path: src/tools.rs
 * Responsibility: The four sandboxed operations and their domain-level failures.
 */

use crate::sandbox::{ContainmentError, ResolveError, WorkingRoot};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_MAX_READ_BYTES: usize = 10_000;
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const SCRIPT_EXTENSION: &str = "py";

/// Failures a tool reports back to the model as text.
///
/// These are outcomes the model is expected to read and adapt to, so every
/// variant renders as an `Error: ...` line naming the path the model supplied.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Error: Cannot {action} \"{path}\" as it is outside the permitted working directory")]
    OutsideRoot { action: &'static str, path: String },
    #[error("Error: Cannot resolve \"{path}\": {source}")]
    Unresolvable { path: String, source: io::Error },
    #[error("Error: \"{0}\" is not a directory")]
    NotADirectory(String),
    #[error("Error: File not found or is not a regular file: \"{0}\"")]
    NotAFile(String),
    #[error("Error: File \"{0}\" not found.")]
    ScriptNotFound(String),
    #[error("Error: \"{0}\" is not a Python file.")]
    UnsupportedFileType(String),
    #[error("Error: \"{path}\" timed out after {} seconds and was terminated", .timeout.as_secs_f32())]
    Timeout { path: String, timeout: Duration },
    #[error("Error: listing \"{path}\": {source}")]
    List { path: String, source: io::Error },
    #[error("Error: reading file \"{path}\": {source}")]
    Read { path: String, source: io::Error },
    #[error("Error: writing file \"{path}\": {source}")]
    Write { path: String, source: io::Error },
    #[error("Error: executing Python file: {0}")]
    Spawn(io::Error),
}

pub type ToolResult = Result<String, ToolError>;

/// Limits shared by every tool invocation.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub max_read_bytes: usize,
    pub script_timeout: Duration,
    pub interpreter: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }
}

/// Everything a tool may touch. Built by the dispatcher, never by the model.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub root: WorkingRoot,
    pub settings: ToolSettings,
}

impl ToolContext {
    pub fn new(root: WorkingRoot, settings: ToolSettings) -> Self {
        Self { root, settings }
    }

    fn resolve(&self, action: &'static str, path: &str) -> Result<PathBuf, ToolError> {
        self.root.resolve(path).map_err(|e| match e {
            ResolveError::Outside(ContainmentError { requested }) => ToolError::OutsideRoot {
                action,
                path: requested,
            },
            ResolveError::Unresolvable { requested, source } => ToolError::Unresolvable {
                path: requested,
                source,
            },
        })
    }
}

/// Lists the immediate children of `directory` (the root when absent),
/// sorted by name.
pub fn list_directory(ctx: &ToolContext, directory: Option<&str>) -> ToolResult {
    let display = directory.unwrap_or(".");
    let target = ctx.resolve("list", display)?;
    if !target.is_dir() {
        return Err(ToolError::NotADirectory(display.to_string()));
    }

    let list_err = |source| ToolError::List {
        path: display.to_string(),
        source,
    };

    let mut entries = fs::read_dir(&target)
        .map_err(list_err)?
        .collect::<io::Result<Vec<_>>>()
        .map_err(list_err)?;
    entries.sort_by_key(|entry| entry.file_name());

    if entries.is_empty() {
        return Ok(format!("Directory \"{}\" is empty.", display));
    }

    let mut lines = Vec::with_capacity(entries.len());
    for entry in entries {
        let meta = entry.metadata().map_err(list_err)?;
        lines.push(format!(
            "{}: file_size={} bytes, is_dir={}",
            entry.file_name().to_string_lossy(),
            meta.len(),
            meta.is_dir()
        ));
    }
    Ok(lines.join("\n"))
}

/// Reads up to `max_read_bytes` of a text file, marking the cut when the
/// file is larger.
pub fn read_file(ctx: &ToolContext, file_path: &str) -> ToolResult {
    let target = ctx.resolve("read", file_path)?;
    if !target.is_file() {
        return Err(ToolError::NotAFile(file_path.to_string()));
    }

    let read_err = |source| ToolError::Read {
        path: file_path.to_string(),
        source,
    };

    let cap = ctx.settings.max_read_bytes;
    let file = fs::File::open(&target).map_err(read_err)?;
    let size = file.metadata().map_err(read_err)?.len();
    let mut buf = Vec::with_capacity(cap.min(size as usize));
    file.take(cap as u64)
        .read_to_end(&mut buf)
        .map_err(read_err)?;

    let truncated = size > cap as u64;
    let mut content = decode_prefix(buf, truncated).map_err(read_err)?;
    if truncated {
        content.push_str(&format!(
            "\n[...File \"{}\" truncated at {} characters]",
            file_path, cap
        ));
    }
    Ok(content)
}

/// UTF-8 decode that forgives a multibyte character split by the read cap.
fn decode_prefix(mut buf: Vec<u8>, truncated: bool) -> io::Result<String> {
    match String::from_utf8(buf) {
        Ok(text) => Ok(text),
        Err(e) => {
            let utf8 = e.utf8_error();
            if !truncated || utf8.error_len().is_some() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, utf8));
            }
            buf = e.into_bytes();
            buf.truncate(utf8.valid_up_to());
            String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }
    }
}

/// Writes `content` to `file_path`, creating parent directories and replacing
/// any previous content.
pub fn write_file(ctx: &ToolContext, file_path: &str, content: &str) -> ToolResult {
    let target = ctx.resolve("write to", file_path)?;
    let write_err = |source| ToolError::Write {
        path: file_path.to_string(),
        source,
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(&target, content).map_err(write_err)?;

    Ok(format!(
        "Successfully wrote to \"{}\" ({} characters written)",
        file_path,
        content.chars().count()
    ))
}

/// Runs a Python script inside the root with a hard timeout.
///
/// A non-zero exit is reported inside the returned text, not as an error.
pub async fn run_script(ctx: &ToolContext, file_path: &str, args: &[String]) -> ToolResult {
    let target = ctx.resolve("execute", file_path)?;
    if !target.exists() {
        return Err(ToolError::ScriptNotFound(file_path.to_string()));
    }
    if !has_script_extension(&target) {
        return Err(ToolError::UnsupportedFileType(file_path.to_string()));
    }

    let child = Command::new(&ctx.settings.interpreter)
        .arg(&target)
        .args(args)
        .current_dir(ctx.root.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ToolError::Spawn)?;

    let timeout = ctx.settings.script_timeout;
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(ToolError::Spawn)?,
        // Dropping the wait future kills the child.
        Err(_) => {
            tracing::warn!(path = file_path, ?timeout, "script timed out");
            return Err(ToolError::Timeout {
                path: file_path.to_string(),
                timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut combined = String::new();
    if !stdout.is_empty() {
        combined.push_str(&format!("STDOUT: {}\n", stdout));
    }
    if !stderr.is_empty() {
        combined.push_str(&format!("STDERR: {}\n", stderr));
    }
    if combined.is_empty() {
        combined.push_str("No output produced.\n");
    }
    if !output.status.success() {
        match output.status.code() {
            Some(code) => combined.push_str(&format!("Process exited with code {}.\n", code)),
            None => combined.push_str("Process terminated by signal.\n"),
        }
    }
    Ok(combined)
}

fn has_script_extension(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(SCRIPT_EXTENSION)
}
