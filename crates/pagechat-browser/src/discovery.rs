//! Chrome/Chromium binary discovery.
//!
//! Looks for an explicitly configured binary first, then for the well-known
//! install locations of the current platform, then for browser executables on
//! `PATH`. Candidates are probed with `--version` and the best one is chosen
//! (Stable, then Chromium, then pre-release channels; newer versions win ties).

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::BrowserError;

/// Release channel of a Chrome-family browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromeChannel {
    Stable,
    Beta,
    Dev,
    Canary,
    Chromium,
    Unknown,
}

impl ChromeChannel {
    /// Lower number = higher preference.
    fn preference_rank(self) -> u8 {
        match self {
            ChromeChannel::Stable => 0,
            ChromeChannel::Chromium => 1,
            ChromeChannel::Beta => 2,
            ChromeChannel::Dev => 3,
            ChromeChannel::Canary => 4,
            ChromeChannel::Unknown => 5,
        }
    }
}

impl std::fmt::Display for ChromeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChromeChannel::Stable => write!(f, "Stable"),
            ChromeChannel::Beta => write!(f, "Beta"),
            ChromeChannel::Dev => write!(f, "Dev"),
            ChromeChannel::Canary => write!(f, "Canary"),
            ChromeChannel::Chromium => write!(f, "Chromium"),
            ChromeChannel::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A discovered browser binary.
#[derive(Debug, Clone)]
pub struct ChromeInfo {
    pub path: PathBuf,
    /// Parsed version string (e.g. "120.0.6099.109"), if available.
    pub version: Option<String>,
    pub channel: ChromeChannel,
}

/// Well-known absolute install paths for the current platform.
pub fn platform_candidate_paths() -> &'static [&'static str] {
    #[cfg(target_os = "macos")]
    {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            "/opt/homebrew/bin/chromium",
        ]
    }

    #[cfg(target_os = "linux")]
    {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
    }

    #[cfg(target_os = "windows")]
    {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        &[]
    }
}

/// Executable names searched for on `PATH`.
const PATH_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Candidates found by joining each `PATH` entry with each known executable name.
fn path_candidates(path_var: Option<&std::ffi::OsStr>) -> Vec<PathBuf> {
    let Some(path_var) = path_var else {
        return Vec::new();
    };
    std::env::split_paths(path_var)
        .filter(|dir| dir.is_absolute())
        .flat_map(|dir| PATH_NAMES.iter().map(move |name| dir.join(name)))
        .filter(|p| p.is_file())
        .collect()
}

/// Parse `chrome --version` output into a (version, channel) pair.
///
/// Handles "Google Chrome 120.0.6099.109", "Google Chrome Beta 121.0.6143.0",
/// "Chromium 120.0.6099.0" and similar.
pub fn parse_chrome_version(output: &str) -> Option<(String, ChromeChannel)> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    let version_str = trimmed
        .split_whitespace()
        .rev()
        .find(|token| is_version_token(token))?;

    Some((version_str.to_string(), detect_channel(trimmed)))
}

fn is_version_token(token: &str) -> bool {
    !token.is_empty() && token.contains('.') && token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn detect_channel(text: &str) -> ChromeChannel {
    let lower = text.to_ascii_lowercase();
    if lower.contains("canary") {
        ChromeChannel::Canary
    } else if lower.contains("dev") {
        ChromeChannel::Dev
    } else if lower.contains("beta") {
        ChromeChannel::Beta
    } else if lower.contains("chromium") {
        ChromeChannel::Chromium
    } else if lower.contains("chrome") {
        ChromeChannel::Stable
    } else {
        ChromeChannel::Unknown
    }
}

/// Reject binaries reached through `..` or living in a temp directory.
pub fn validate_binary_path(path: &Path) -> Result<(), BrowserError> {
    let path_str = path.to_string_lossy();

    if path.components().any(|c| c == std::path::Component::ParentDir) {
        return Err(BrowserError::InvalidBinaryPath {
            path: path_str.into_owned(),
            reason: "path contains directory traversal (..)".to_string(),
        });
    }

    for prefix in ["/tmp", "/var/tmp"] {
        if path_str.starts_with(prefix) {
            return Err(BrowserError::InvalidBinaryPath {
                path: path_str.into_owned(),
                reason: format!("path is inside a temp directory ({prefix})"),
            });
        }
    }

    Ok(())
}

/// Validate a binary, run `--version`, and classify it.
fn probe_binary(path: &Path) -> Result<ChromeInfo, BrowserError> {
    validate_binary_path(path)?;

    let output = Command::new(path).arg("--version").output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    let (version, channel) = match parse_chrome_version(&stdout) {
        Some((version, channel)) => (Some(version), channel),
        None => (None, detect_channel(&path.to_string_lossy())),
    };

    Ok(ChromeInfo {
        path: path.to_path_buf(),
        version,
        channel,
    })
}

/// Whether `challenger` should replace `current` as the best candidate.
fn is_better_candidate(current: &ChromeInfo, challenger: &ChromeInfo) -> bool {
    let cur_rank = current.channel.preference_rank();
    let new_rank = challenger.channel.preference_rank();
    if new_rank != cur_rank {
        return new_rank < cur_rank;
    }
    match (&challenger.version, &current.version) {
        (Some(new_v), Some(cur_v)) => {
            compare_version_strings(new_v, cur_v) == std::cmp::Ordering::Greater
        }
        (Some(_), None) => true,
        _ => false,
    }
}

/// Numeric comparison of dotted version strings.
fn compare_version_strings(a: &str, b: &str) -> std::cmp::Ordering {
    let mut a_parts = a.split('.');
    let mut b_parts = b.split('.');
    loop {
        match (a_parts.next(), b_parts.next()) {
            (Some(ap), Some(bp)) => {
                let an: u64 = ap.parse().unwrap_or(0);
                let bn: u64 = bp.parse().unwrap_or(0);
                match an.cmp(&bn) {
                    std::cmp::Ordering::Equal => continue,
                    other => return other,
                }
            }
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (None, None) => return std::cmp::Ordering::Equal,
        }
    }
}

/// Find the browser to launch.
///
/// A configured path must exist; it is never silently replaced by a
/// discovered one. This runs `--version` on each candidate and blocks.
pub fn discover_chrome(configured_path: Option<&Path>) -> Result<ChromeInfo, BrowserError> {
    if let Some(path) = configured_path {
        if !path.exists() {
            return Err(BrowserError::InvalidBinaryPath {
                path: path.display().to_string(),
                reason: "file does not exist".to_string(),
            });
        }
        let info = probe_binary(path)?;
        tracing::info!(
            path = %info.path.display(),
            version = ?info.version,
            channel = %info.channel,
            "using configured browser binary"
        );
        return Ok(info);
    }

    let candidates = platform_candidate_paths()
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .chain(path_candidates(std::env::var_os("PATH").as_deref()));

    let mut best: Option<ChromeInfo> = None;
    for candidate in candidates {
        match probe_binary(&candidate) {
            Ok(info) => {
                tracing::debug!(
                    path = %info.path.display(),
                    version = ?info.version,
                    channel = %info.channel,
                    "found browser candidate"
                );
                if best.as_ref().map_or(true, |current| is_better_candidate(current, &info)) {
                    best = Some(info);
                }
            }
            Err(e) => {
                tracing::debug!(path = %candidate.display(), error = %e, "skipping browser candidate");
            }
        }
    }

    let info = best.ok_or(BrowserError::ChromeNotFound)?;
    tracing::info!(
        path = %info.path.display(),
        version = ?info.version,
        channel = %info.channel,
        "selected browser binary"
    );
    Ok(info)
}
