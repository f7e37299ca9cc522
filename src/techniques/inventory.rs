//! External tool capability probe

use log::debug;
use std::collections::HashMap;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Which external tools exist on this host.
///
/// Detected once per run; techniques consult it before spawning anything.
#[derive(Debug, Clone, Default)]
pub struct ToolInventory {
    tools: HashMap<String, Option<PathBuf>>,
}

impl ToolInventory {
    /// Look up each tool on `PATH`
    pub fn detect<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = env::var_os("PATH").unwrap_or_default();
        Self::detect_in(names, &path)
    }

    /// Look up each tool in an explicit search path
    pub fn detect_in<I, S>(names: I, search_path: &OsStr) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dirs: Vec<PathBuf> = env::split_paths(search_path).collect();
        let tools = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                let found = find_executable(name, &dirs);
                match &found {
                    Some(path) => debug!("Found {} at {}", name, path.display()),
                    None => debug!("{} not found on PATH", name),
                }
                (name.to_string(), found)
            })
            .collect();
        Self { tools }
    }

    /// Treat every listed tool as present at the given path
    pub fn from_paths<I, S, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            tools: entries
                .into_iter()
                .map(|(name, path)| (name.into(), Some(path.into())))
                .collect(),
        }
    }

    pub fn is_available(&self, name: &str) -> bool {
        matches!(self.tools.get(name), Some(Some(_)))
    }

    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.tools.get(name).and_then(|p| p.as_deref())
    }

    /// Names of the tools that were found, sorted
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tools
            .iter()
            .filter(|(_, path)| path.is_some())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Names of the tools that were looked for but not found, sorted
    pub fn missing(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tools
            .iter()
            .filter(|(_, path)| path.is_none())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

fn find_executable(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
