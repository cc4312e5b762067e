//! Command, argument and environment resolution for stdio servers

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Root that bundled server scripts are resolved against: the directory above
/// the one holding the running executable (`<prefix>` for `<prefix>/bin/mcp-hub`).
fn bundle_root() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent()?.parent().map(Path::to_path_buf)
}

/// Resolve a command against the working directory and the bundle root
///
/// Order: absolute path as-is, then relative to the working directory, then
/// relative to the bundle root; anything else is returned unchanged for PATH
/// lookup.
pub fn resolve_command(command: &str) -> String {
    let cwd = std::env::current_dir().ok();
    let bundle = bundle_root();
    resolve_command_in(command, cwd.as_deref(), bundle.as_deref())
}

pub fn resolve_command_in(command: &str, cwd: Option<&Path>, bundle_root: Option<&Path>) -> String {
    let path = Path::new(command);
    if path.is_absolute() {
        return command.to_string();
    }

    for root in [cwd, bundle_root].into_iter().flatten() {
        let candidate = root.join(path);
        if candidate.exists() {
            return candidate.to_string_lossy().into_owned();
        }
    }

    command.to_string()
}

/// Resolve every argument that looks like a path (contains `/` or `\`)
pub fn resolve_args(args: &[String]) -> Vec<String> {
    let cwd = std::env::current_dir().ok();
    let bundle = bundle_root();
    resolve_args_in(args, cwd.as_deref(), bundle.as_deref())
}

pub fn resolve_args_in(args: &[String], cwd: Option<&Path>, bundle_root: Option<&Path>) -> Vec<String> {
    args.iter()
        .map(|arg| {
            if arg.contains('/') || arg.contains('\\') {
                resolve_command_in(arg, cwd, bundle_root)
            } else {
                arg.clone()
            }
        })
        .collect()
}

/// Surrounding process environment overridden by the declared variables
///
/// Declared values get `$VAR`/`${VAR}` expansion; a value that fails to
/// expand is used literally.
pub fn merge_environment(declared: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for (key, value) in declared {
        let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
        env.insert(key.clone(), expanded.into_owned());
    }
    env
}
