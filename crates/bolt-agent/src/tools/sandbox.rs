//! Sandbox policy shared by the file and shell tools.
//!
//! Writable paths must resolve under the user's home directory (after
//! symlink expansion) and outside a small set of denied subtrees. Read-only
//! access relaxes the denylist but not the home confinement. Shell commands
//! go through a literal blocklist — this is policy, not an airtight sandbox;
//! the goal is to catch the footgun patterns a model might emit.

use std::path::{Component, Path, PathBuf};

/// Subtrees under `$HOME` that write tools must never touch.
const DENIED_SUBTREES: &[&str] = &[".ssh", ".gnupg", ".config/autostart"];

/// `(substring_pattern, reason)` pairs. All comparisons are against the
/// lowercased command string; the first match wins.
const BLOCKED_SHELL: &[(&str, &str)] = &[
    ("sudo ", "elevation is not allowed"),
    ("sudo\t", "elevation is not allowed"),
    ("doas ", "elevation is not allowed"),
    ("rm -rf /", "recursive forced removal from root"),
    ("rm -rf /*", "recursive forced removal of root children"),
    ("dd if=", "raw disk I/O"),
    ("mkfs", "filesystem creation wipes existing data"),
    ("> /dev/sd", "writes directly to a block device"),
    ("> /dev/nvme", "writes directly to a block device"),
    ("chmod 777 /", "world-writable root filesystem"),
    ("chmod -r 777 /", "recursive world-writable root filesystem"),
    ("shutdown", "shuts down the system"),
    ("reboot", "reboots the system"),
    ("init 0", "halts the system"),
    ("init 6", "reboots the system"),
    (":(){ :|:& };:", "fork bomb"),
    ("| bash", "piping content into a shell"),
    ("|bash", "piping content into a shell"),
    ("| sh ", "piping content into a shell"),
    ("|sh ", "piping content into a shell"),
    ("| zsh", "piping content into a shell"),
    ("|zsh", "piping content into a shell"),
];

/// Check whether a shell command is allowed to run.
///
/// Returns `Err(reason)` when the command matches a blocklist literal.
pub fn check_command(command: &str) -> Result<(), String> {
    let lower = command.trim().to_lowercase();
    for (pattern, reason) in BLOCKED_SHELL {
        if lower.contains(pattern) {
            return Err(format!("Blocked: {reason} (matched `{pattern}`)"));
        }
    }
    Ok(())
}

/// Validate a path against the sandbox policy using the process home
/// directory.
pub fn validate_path(path: &str, allow_read_only: bool) -> Result<PathBuf, String> {
    let home = PathBuf::from(bolt_core::config::home_dir());
    validate_path_in(path, &home, allow_read_only)
}

/// Validate a path against an explicit home directory (tests inject a
/// tempdir here).
///
/// Returns the resolved path, or an `Access denied` message when it escapes
/// home or — for writes — lands in a denied subtree.
pub fn validate_path_in(
    path: &str,
    home: &Path,
    allow_read_only: bool,
) -> Result<PathBuf, String> {
    // Canonicalize home as well so a symlinked temp or home directory
    // compares against the same resolved form.
    let home = &home.canonicalize().unwrap_or_else(|_| home.to_path_buf());
    let resolved = resolve_path(path, home);

    if resolved != *home && !resolved.starts_with(home) {
        return Err(format!(
            "Access denied: path must be under {}",
            home.display()
        ));
    }

    if !allow_read_only {
        for subtree in DENIED_SUBTREES {
            let denied = home.join(subtree);
            if resolved == denied || resolved.starts_with(&denied) {
                return Err(format!(
                    "Access denied: cannot write to {}",
                    denied.display()
                ));
            }
        }
    }

    Ok(resolved)
}

/// Resolve a path the way `realpath` does for possibly-nonexistent targets:
/// expand `~`, anchor relative paths at home, resolve symlinks through the
/// deepest existing ancestor, and normalise the remaining components
/// lexically.
pub fn resolve_path(path: &str, home: &Path) -> PathBuf {
    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else if path == "~" {
        home.to_path_buf()
    } else {
        PathBuf::from(path)
    };
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        home.join(expanded)
    };

    // Lexical normalization first: "." drops, ".." pops. Running this before
    // the symlink pass means no dotted segment can survive into the result,
    // even through nonexistent intermediate directories.
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    // Resolve symlinks through the deepest existing ancestor, then re-append
    // the nonexistent tail.
    let mut existing = normalized.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing = existing
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("/"));
            }
            None => break,
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    resolved
}
