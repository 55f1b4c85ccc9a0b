//! Kernel connection files
//!
//! A running kernel advertises itself through a JSON connection file
//! (`kernel-<id>.json`) in the Jupyter runtime directory. This module turns
//! what the user typed after `:IPython` into one of those files:
//!
//! - `""`: the most recently modified `kernel-*.json`
//! - `"<name>"`: a path, a file name, or a fragment of one
//! - `"<name> --profile <profile>"`: same, also searching the IPython
//!   profile's security directory
//!
//! It also reads the "last kernel" record left behind by cpyvke.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jupyter_protocol::ConnectionInfo;
use thiserror::Error;
use tracing::debug;

use crate::config::KernelConfig;

/// Pattern matched when no connection string is given
const DEFAULT_PATTERN: &str = "kernel-*.json";

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("connection file '{0}' not found")]
    NotFound(String),

    #[error("kernel record {} not found", .0.display())]
    RecordMissing(PathBuf),

    #[error("kernel record {} has no connection file entry", .0.display())]
    RecordEmpty(PathBuf),

    #[error("invalid connection file {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("failed to open kernel channels: {0}")]
    Open(#[from] super::client::KernelError),
}

/// A connection file located on disk and parsed
#[derive(Debug, Clone)]
pub struct ConnectionFile {
    pub path: PathBuf,
    pub info: ConnectionInfo,
}

impl ConnectionFile {
    /// Read and parse a connection file
    pub fn load(path: &Path) -> Result<Self, ConnectionError> {
        let invalid = |reason: String| ConnectionError::Invalid {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let info = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }
}

/// What the user asked to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSpec {
    /// Most recent kernel
    Latest,
    /// A path or file name fragment
    Named(String),
    /// A name inside an IPython profile
    Profiled { name: String, profile: String },
}

impl ConnectionSpec {
    /// Parse `""`, `"<name>"` or `"<name> --profile <profile>"`.
    ///
    /// A leading `--existing` (as typed for `ipython console`) is ignored.
    pub fn parse(input: &str) -> Self {
        let input = input.replace("--existing", "");

        if let Some((name, profile)) = input.split_once("--profile") {
            return Self::Profiled {
                name: name.trim().to_string(),
                profile: profile.trim().to_string(),
            };
        }

        let name = input.trim();
        if name.is_empty() {
            Self::Latest
        } else {
            Self::Named(name.to_string())
        }
    }
}

/// Finds connection files
#[derive(Debug, Clone)]
pub struct Resolver {
    /// Directories searched for every lookup, in order
    search_dirs: Vec<PathBuf>,
    /// Root of IPython profiles
    ipython_dir: Option<PathBuf>,
    /// cpyvke's last-kernel record
    last_record: PathBuf,
}

impl Resolver {
    pub fn new(search_dirs: Vec<PathBuf>, ipython_dir: Option<PathBuf>, last_record: PathBuf) -> Self {
        Self {
            search_dirs,
            ipython_dir,
            last_record,
        }
    }

    /// Resolver using the current directory and the Jupyter runtime directory
    pub fn from_env(config: &KernelConfig) -> Self {
        let search_dirs = vec![PathBuf::from("."), runtimelib::dirs::runtime_dir()];
        Self::new(search_dirs, ipython_dir(), config.last_kernel_record_path())
    }

    /// Directories searched for a lookup in `profile`
    pub fn search_path(&self, profile: Option<&str>) -> Vec<PathBuf> {
        let mut dirs = self.search_dirs.clone();
        if let (Some(profile), Some(root)) = (profile, &self.ipython_dir) {
            dirs.push(root.join(format!("profile_{}", profile)).join("security"));
        }
        dirs
    }

    /// Resolve a connection string to a parsed connection file
    pub fn resolve(&self, input: &str) -> Result<ConnectionFile, ConnectionError> {
        let path = match ConnectionSpec::parse(input) {
            ConnectionSpec::Latest => find_connection_file("", &self.search_path(None))?,
            ConnectionSpec::Named(name) => find_connection_file(&name, &self.search_path(None))?,
            ConnectionSpec::Profiled { name, profile } => {
                find_connection_file(&name, &self.search_path(Some(&profile)))?
            }
        };
        debug!(path = %path.display(), "resolved connection file");
        ConnectionFile::load(&path)
    }

    /// Resolve the connection file named in the last-kernel record.
    ///
    /// The recorded path is looked up as is, without connection string
    /// parsing.
    pub fn resolve_last(&self) -> Result<ConnectionFile, ConnectionError> {
        let content = fs::read_to_string(&self.last_record)
            .map_err(|_| ConnectionError::RecordMissing(self.last_record.clone()))?;
        let entry = parse_last_kernel_record(&content)
            .ok_or_else(|| ConnectionError::RecordEmpty(self.last_record.clone()))?;
        let path = find_connection_file(&entry, &self.search_path(None))?;
        debug!(path = %path.display(), record = %self.last_record.display(), "resolved last kernel");
        ConnectionFile::load(&path)
    }
}

/// Connection path recorded in a last-kernel record.
///
/// The record is line oriented and ends with a newline; the path is the
/// last whitespace-separated token of the final line.
pub fn parse_last_kernel_record(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.len() < 2 {
        return None;
    }
    lines[lines.len() - 2]
        .split_whitespace()
        .last()
        .map(str::to_string)
}

/// Find a connection file by path, name or name fragment.
///
/// An empty name matches `kernel-*.json`. When several files match, the
/// most recently modified one wins.
pub fn find_connection_file(name: &str, search_dirs: &[PathBuf]) -> Result<PathBuf, ConnectionError> {
    let name = if name.is_empty() { DEFAULT_PATTERN } else { name };

    let direct = Path::new(name);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    for dir in search_dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let pattern = if name.contains('*') {
        name.to_string()
    } else {
        format!("*{}*", name)
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for dir in search_dirs {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !wildcard_match(&pattern, file_name) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if best.as_ref().map_or(true, |(time, _)| modified > *time) {
                best = Some((modified, entry.path()));
            }
        }
    }

    best.map(|(_, path)| path)
        .ok_or_else(|| ConnectionError::NotFound(name.to_string()))
}

/// Shell-style match supporting `*` and `?`
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

fn ipython_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os("IPYTHONDIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::home_dir().map(|home| home.join(".ipython"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "shell_port": 50001,
        "iopub_port": 50002,
        "stdin_port": 50003,
        "control_port": 50004,
        "hb_port": 50005,
        "ip": "127.0.0.1",
        "key": "a0436f6c-1916-498b-8eb9-e81ab9368e84",
        "transport": "tcp",
        "signature_scheme": "hmac-sha256",
        "kernel_name": "python3"
    }"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn touch_later(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    fn resolver(dir: &TempDir) -> Resolver {
        Resolver::new(
            vec![dir.path().to_path_buf()],
            Some(dir.path().join("ipython")),
            dir.path().join("LastKernel"),
        )
    }

    #[test]
    fn test_parse_spec() {
        assert_eq!(ConnectionSpec::parse(""), ConnectionSpec::Latest);
        assert_eq!(ConnectionSpec::parse("  --existing "), ConnectionSpec::Latest);
        assert_eq!(
            ConnectionSpec::parse("--existing kernel-42.json"),
            ConnectionSpec::Named("kernel-42.json".into())
        );
        assert_eq!(
            ConnectionSpec::parse("42 --profile work"),
            ConnectionSpec::Profiled {
                name: "42".into(),
                profile: "work".into()
            }
        );
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("kernel-*.json", "kernel-1234.json"));
        assert!(wildcard_match("*12*", "kernel-1234.json"));
        assert!(wildcard_match("kernel-?.json", "kernel-7.json"));
        assert!(!wildcard_match("kernel-*.json", "kernel-1234.txt"));
        assert!(!wildcard_match("*99*", "kernel-1234.json"));
    }

    #[test]
    fn test_latest_kernel_wins() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "kernel-old.json", SAMPLE);
        let newer = write(dir.path(), "kernel-new.json", SAMPLE);
        touch_later(&newer, 60);
        write(dir.path(), "notes.txt", "not a kernel");

        let found = resolver(&dir).resolve("").unwrap();
        assert_eq!(found.path, newer);
        assert_eq!(found.info.shell_port, 50001);
        assert_eq!(found.info.kernel_name.as_deref(), Some("python3"));
    }

    #[test]
    fn test_resolve_by_fragment_and_exact_name() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "kernel-8123.json", SAMPLE);

        assert_eq!(resolver(&dir).resolve("8123").unwrap().path, path);
        assert_eq!(resolver(&dir).resolve("kernel-8123.json").unwrap().path, path);
        let absolute = path.to_string_lossy().into_owned();
        assert_eq!(resolver(&dir).resolve(&absolute).unwrap().path, path);
    }

    #[test]
    fn test_resolve_in_profile() {
        let dir = TempDir::new().unwrap();
        let security = dir.path().join("ipython").join("profile_work").join("security");
        fs::create_dir_all(&security).unwrap();
        let path = write(&security, "kernel-77.json", SAMPLE);

        assert!(matches!(
            resolver(&dir).resolve("77"),
            Err(ConnectionError::NotFound(_))
        ));
        assert_eq!(resolver(&dir).resolve("77 --profile work").unwrap().path, path);
    }

    #[test]
    fn test_missing_file_not_found() {
        let dir = TempDir::new().unwrap();
        let err = resolver(&dir).resolve("/no/such/kernel-1.json").unwrap_err();
        assert!(matches!(err, ConnectionError::NotFound(_)));
    }

    #[test]
    fn test_invalid_connection_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "kernel-bad.json", "{ not json");
        let err = resolver(&dir).resolve("bad").unwrap_err();
        assert!(matches!(err, ConnectionError::Invalid { .. }));
    }

    #[test]
    fn test_parse_last_kernel_record() {
        let record = "Kernel started\n  Connection file: /run/kernel-5.json\n";
        assert_eq!(
            parse_last_kernel_record(record).as_deref(),
            Some("/run/kernel-5.json")
        );
        assert_eq!(parse_last_kernel_record("no newline"), None);
        assert_eq!(parse_last_kernel_record("\n\n"), None);
    }

    #[test]
    fn test_resolve_last() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "kernel-9.json", SAMPLE);
        let record = format!("cpyvke\nkernel {}\n", path.display());
        write(dir.path(), "LastKernel", &record);

        assert_eq!(resolver(&dir).resolve_last().unwrap().path, path);
    }

    #[test]
    fn test_resolve_last_keeps_option_like_path() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("--profile");
        fs::create_dir_all(&nested).unwrap();
        let path = write(&nested, "kernel--existing-3.json", SAMPLE);
        write(dir.path(), "LastKernel", &format!("cpyvke\n{}\n", path.display()));

        assert_eq!(resolver(&dir).resolve_last().unwrap().path, path);
    }

    #[test]
    fn test_resolve_last_without_record() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolver(&dir).resolve_last(),
            Err(ConnectionError::RecordMissing(_))
        ));
    }
}
