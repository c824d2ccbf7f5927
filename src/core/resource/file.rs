//! Probe, diff, and apply logic for filesystem-backed resources: files, directories, symlinks,
//! and absences.

use super::{ActualState, ApplyError, Change, ContentSpec, Delta, DiffError, ProbeError};
use crate::system::fs::FsEntry;
use crate::system::Host;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::io;
use std::path::Path;

/// Probes a path asserted as a regular file, reading its content when one is found.
pub(super) fn probe_file(path: &str, host: &Host) -> Result<ActualState, ProbeError> {
    match probe_entry(path, host)? {
        ActualState::File { mode, .. } => {
            let content = host
                .fs
                .read(path)
                .map_err(|source| fs_error(path, source))?
                .unwrap_or_default();
            Ok(ActualState::File { content, mode })
        }
        state => Ok(state),
    }
}

/// Probes a path for its entry kind only, without reading file content.
pub(super) fn probe_entry(path: &str, host: &Host) -> Result<ActualState, ProbeError> {
    let entry = host
        .fs
        .probe(path)
        .map_err(|source| fs_error(path, source))?;

    Ok(match entry {
        FsEntry::Missing => ActualState::Missing,
        FsEntry::File { mode } => ActualState::File {
            content: String::new(),
            mode,
        },
        FsEntry::Directory => ActualState::Directory,
        FsEntry::Symlink { target } => ActualState::Symlink { target },
    })
}

pub(super) fn diff_file(
    path: &str,
    spec: &ContentSpec,
    mode: Option<u32>,
    actual: &ActualState,
    vars: &IndexMap<String, String>,
    host: &Host,
) -> Result<Delta, DiffError> {
    if let ContentSpec::HasLines(lines) = spec {
        return Ok(diff_has_lines(path, lines, mode, actual));
    }

    let desired = desired_content(spec, vars, host)?;

    Ok(match actual {
        ActualState::Missing => Delta::Create {
            change: Change::WriteFile {
                path: path.to_string(),
                content: desired.clone(),
                mode,
            },
            summary: format!("+{} lines", desired.lines().count()),
        },
        ActualState::File {
            content,
            mode: actual_mode,
        } => {
            if *content != desired {
                Delta::Modify {
                    change: Change::WriteFile {
                        path: path.to_string(),
                        content: desired.clone(),
                        mode,
                    },
                    summary: content_summary(content, &desired),
                }
            } else if let Some(mode) = mode_gap(mode, *actual_mode) {
                Delta::Modify {
                    change: Change::SetMode {
                        path: path.to_string(),
                        mode,
                    },
                    summary: mode_summary(*actual_mode, mode),
                }
            } else {
                Delta::Unchanged
            }
        }
        ActualState::Directory => replace_with_file(path, desired, mode, "directory"),
        ActualState::Symlink { .. } => replace_with_file(path, desired, mode, "symlink"),
        ActualState::Package { .. } => unreachable!("file diffed against package state"),
    })
}

fn diff_has_lines(
    path: &str,
    lines: &[String],
    mode: Option<u32>,
    actual: &ActualState,
) -> Delta {
    match actual {
        ActualState::Missing => {
            let content = join_lines(lines);
            Delta::Create {
                change: Change::WriteFile {
                    path: path.to_string(),
                    content,
                    mode,
                },
                summary: format!("+{} lines", lines.len()),
            }
        }
        ActualState::File {
            content,
            mode: actual_mode,
        } => {
            let missing: Vec<String> = lines
                .iter()
                .filter(|line| !line_is_present(content, line))
                .cloned()
                .collect();
            let mode = mode_gap(mode, *actual_mode);

            match (missing.is_empty(), mode) {
                (true, None) => Delta::Unchanged,
                (true, Some(mode)) => Delta::Modify {
                    change: Change::SetMode {
                        path: path.to_string(),
                        mode,
                    },
                    summary: mode_summary(*actual_mode, mode),
                },
                (false, mode) => {
                    let mut summary = format!("+{} lines", missing.len());
                    if let Some(mode) = mode {
                        summary.push_str(", ");
                        summary.push_str(&mode_summary(*actual_mode, mode));
                    }
                    Delta::Modify {
                        change: Change::AppendLines {
                            path: path.to_string(),
                            lines: missing,
                            mode,
                        },
                        summary,
                    }
                }
            }
        }
        ActualState::Directory => replace_with_file(path, join_lines(lines), mode, "directory"),
        ActualState::Symlink { .. } => replace_with_file(path, join_lines(lines), mode, "symlink"),
        ActualState::Package { .. } => unreachable!("file diffed against package state"),
    }
}

pub(super) fn diff_directory(path: &str, actual: &ActualState) -> Delta {
    match actual {
        ActualState::Missing => Delta::Create {
            change: Change::CreateDirectory {
                path: path.to_string(),
            },
            summary: "create directory".to_string(),
        },
        ActualState::Directory => Delta::Unchanged,
        ActualState::File { .. } => Delta::Modify {
            change: Change::CreateDirectory {
                path: path.to_string(),
            },
            summary: "replace file with directory".to_string(),
        },
        ActualState::Symlink { .. } => Delta::Modify {
            change: Change::CreateDirectory {
                path: path.to_string(),
            },
            summary: "replace symlink with directory".to_string(),
        },
        ActualState::Package { .. } => unreachable!("directory diffed against package state"),
    }
}

pub(super) fn diff_symlink(path: &str, target: &str, actual: &ActualState) -> Delta {
    let link = Change::LinkTo {
        path: path.to_string(),
        target: target.to_string(),
    };

    match actual {
        ActualState::Missing => Delta::Create {
            change: link,
            summary: format!("link -> {target}"),
        },
        ActualState::Symlink { target: current } => {
            if current.as_path() == Path::new(target) {
                Delta::Unchanged
            } else {
                Delta::Modify {
                    change: link,
                    summary: format!("retarget {} -> {target}", current.display()),
                }
            }
        }
        ActualState::File { .. } => Delta::Modify {
            change: link,
            summary: "replace file with symlink".to_string(),
        },
        ActualState::Directory => Delta::Modify {
            change: link,
            summary: "replace directory with symlink".to_string(),
        },
        ActualState::Package { .. } => unreachable!("symlink diffed against package state"),
    }
}

pub(super) fn diff_absent(path: &str, actual: &ActualState) -> Delta {
    let remove = Change::Remove {
        path: path.to_string(),
    };

    match actual {
        ActualState::Missing => Delta::Unchanged,
        ActualState::File { .. } => Delta::Modify {
            change: remove,
            summary: "remove file".to_string(),
        },
        ActualState::Directory => Delta::Modify {
            change: remove,
            summary: "remove directory".to_string(),
        },
        ActualState::Symlink { .. } => Delta::Modify {
            change: remove,
            summary: "remove symlink".to_string(),
        },
        ActualState::Package { .. } => unreachable!("absence diffed against package state"),
    }
}

/// Executes a filesystem-backed [Change].
pub(super) fn execute(change: &Change, host: &Host) -> Result<(), ApplyError> {
    match change {
        Change::WriteFile {
            path,
            content,
            mode,
        } => {
            clear_unless(path, host, |entry| {
                matches!(entry, FsEntry::File { .. } | FsEntry::Missing)
            })?;
            host.fs
                .write(path, content)
                .map_err(|source| apply_error(path, source))?;
            if let Some(mode) = mode {
                host.fs
                    .set_mode(path, *mode)
                    .map_err(|source| apply_error(path, source))?;
            }
            Ok(())
        }
        Change::AppendLines { path, lines, mode } => {
            let mut content = host
                .fs
                .read(path)
                .map_err(|source| apply_error(path, source))?
                .unwrap_or_default();
            for line in lines {
                append_line(&mut content, line);
            }
            host.fs
                .write(path, &content)
                .map_err(|source| apply_error(path, source))?;
            if let Some(mode) = mode {
                host.fs
                    .set_mode(path, *mode)
                    .map_err(|source| apply_error(path, source))?;
            }
            Ok(())
        }
        Change::SetMode { path, mode } => host
            .fs
            .set_mode(path, *mode)
            .map_err(|source| apply_error(path, source)),
        Change::CreateDirectory { path } => {
            clear_unless(path, host, |entry| {
                matches!(entry, FsEntry::Directory | FsEntry::Missing)
            })?;
            host.fs
                .create_dir(path)
                .map_err(|source| apply_error(path, source))
        }
        Change::LinkTo { path, target } => {
            clear_unless(path, host, |entry| matches!(entry, FsEntry::Missing))?;
            host.fs
                .symlink(path, target)
                .map_err(|source| apply_error(path, source))
        }
        Change::Remove { path } => host
            .fs
            .remove(path)
            .map_err(|source| apply_error(path, source)),
        Change::InstallPackage { .. } => unreachable!("not a filesystem change: {change:?}"),
    }
}

/// Removes whatever exists at `path` unless `keep` accepts the current entry. Writing a file
/// over a directory, or linking over a file, first clears the old entry the same way the
/// desired end state would have been reached by removing it manually.
fn clear_unless(
    path: &str,
    host: &Host,
    keep: impl Fn(&FsEntry) -> bool,
) -> Result<(), ApplyError> {
    let entry = host
        .fs
        .probe(path)
        .map_err(|source| apply_error(path, source))?;
    if !keep(&entry) {
        host.fs
            .remove(path)
            .map_err(|source| apply_error(path, source))?;
    }
    Ok(())
}

/// Returns the full desired content for a non-`HasLines` content strategy.
fn desired_content(
    spec: &ContentSpec,
    vars: &IndexMap<String, String>,
    host: &Host,
) -> Result<String, DiffError> {
    match spec {
        ContentSpec::Content(text) => Ok(text.clone()),
        ContentSpec::Lines(lines) => Ok(join_lines(lines)),
        ContentSpec::Template(template) => host
            .templates
            .render(template, vars)
            .map_err(|source| DiffError::Render {
                template: template.clone(),
                source,
            }),
        ContentSpec::HasLines(_) => unreachable!("HasLines has no full desired content"),
    }
}

fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut joined = lines.join("\n");
    joined.push('\n');
    joined
}

/// Returns whether `line` is present in `file`. Lines match on their content with trailing
/// whitespace ignored; position within the file is irrelevant.
fn line_is_present(file: &str, line: &str) -> bool {
    let line = line.trim_end();
    file.split('\n').any(|file_line| file_line.trim_end() == line)
}

/// Adds `line` as a new line at the end of `file`.
fn append_line(file: &mut String, line: &str) {
    if file.trim_start().is_empty() && !line.trim_start().is_empty() {
        file.clear();
    } else if !file.ends_with('\n') && !file.is_empty() {
        file.push('\n');
    }
    file.push_str(line);
    file.push('\n');
}

/// Returns the mode to set, if the desired mode is known and provably differs from the actual
/// one. An unknown actual mode is treated as matching; there is nothing to correct against.
fn mode_gap(desired: Option<u32>, actual: Option<u32>) -> Option<u32> {
    match (desired, actual) {
        (Some(desired), Some(actual)) if desired != actual => Some(desired),
        _ => None,
    }
}

fn mode_summary(actual: Option<u32>, desired: u32) -> String {
    match actual {
        Some(actual) => format!("mode {actual:03o} -> {desired:03o}"),
        None => format!("mode -> {desired:03o}"),
    }
}

/// Summarizes a full-content rewrite as added/removed line counts.
fn content_summary(old: &str, new: &str) -> String {
    let old_lines: HashSet<&str> = old.lines().collect();
    let new_lines: HashSet<&str> = new.lines().collect();

    let added = new.lines().filter(|line| !old_lines.contains(line)).count();
    let removed = old.lines().filter(|line| !new_lines.contains(line)).count();

    if added == 0 && removed == 0 {
        // The strings differ but no whole line does, e.g. reordering or trailing whitespace.
        return "content changed".to_string();
    }
    format!("+{added} -{removed} lines")
}

fn replace_with_file(path: &str, content: String, mode: Option<u32>, kind: &str) -> Delta {
    Delta::Modify {
        change: Change::WriteFile {
            path: path.to_string(),
            content,
            mode,
        },
        summary: format!("replace {kind} with file"),
    }
}

fn fs_error(path: &str, source: io::Error) -> ProbeError {
    ProbeError::Fs {
        path: path.to_string(),
        source,
    }
}

fn apply_error(path: &str, source: io::Error) -> ApplyError {
    ApplyError::Fs {
        path: path.to_string(),
        source,
    }
}
