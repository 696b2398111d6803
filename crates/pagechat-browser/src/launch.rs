//! Headless Chrome process management.
//!
//! [`ChromeProcess::launch`] starts Chrome with a throwaway profile and an
//! ephemeral DevTools port, waits for the `DevTools listening on ws://...`
//! banner on stderr, and connects a browser-level [`CdpClient`]. Page
//! targets are created and closed through that connection; each page gets its
//! own [`BrowserDriver`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::cdp::CdpClient;
use crate::discovery::{discover_chrome, ChromeInfo};
use crate::driver::BrowserDriver;
use crate::error::BrowserError;

/// Prefix Chrome prints before its browser WebSocket endpoint.
const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// How long a graceful `Browser.close` may take before the process is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit binary; discovered when `None`.
    pub binary: Option<PathBuf>,
    pub headless: bool,
    /// Passed through as `--proxy-server`.
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    /// Bound on the wait for the DevTools banner.
    pub startup_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            binary: None,
            headless: true,
            proxy: None,
            user_agent: None,
            startup_timeout: Duration::from_secs(20),
        }
    }
}

/// Command-line arguments for a Chrome launch.
pub fn build_launch_args(options: &LaunchOptions, user_data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--disable-popup-blocking".to_string(),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(proxy) = &options.proxy {
        args.push(format!("--proxy-server={proxy}"));
    }
    if let Some(user_agent) = &options.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }
    args.push("about:blank".to_string());
    args
}

/// Extract the browser WebSocket URL from a Chrome stderr line.
pub fn parse_devtools_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(DEVTOOLS_BANNER)?;
    let url = rest.split_whitespace().next()?;
    (url.starts_with("ws://") || url.starts_with("wss://")).then(|| url.to_string())
}

/// Page-target endpoint on the same DevTools server as `browser_ws`.
pub fn page_ws_url(browser_ws: &str, target_id: &str) -> Result<String, BrowserError> {
    let mut url = url::Url::parse(browser_ws).map_err(|e| BrowserError::Protocol {
        detail: format!("invalid DevTools URL {browser_ws:?}: {e}"),
    })?;
    url.set_path(&format!("/devtools/page/{target_id}"));
    Ok(url.to_string())
}

/// A running Chrome instance owned by this process.
pub struct ChromeProcess {
    child: Child,
    browser: CdpClient,
    info: ChromeInfo,
    // Removed when dropped, after the process has exited.
    _profile_dir: tempfile::TempDir,
    closed: bool,
}

impl ChromeProcess {
    /// Discover (if needed) and start Chrome, then connect to its browser target.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let configured = options.binary.clone();
        let info = tokio::task::spawn_blocking(move || discover_chrome(configured.as_deref()))
            .await
            .map_err(|e| BrowserError::LaunchFailed {
                reason: format!("browser discovery task failed: {e}"),
            })??;

        let profile_dir = tempfile::Builder::new().prefix("pagechat-profile-").tempdir()?;
        let args = build_launch_args(options, profile_dir.path());

        tracing::info!(
            binary = %info.path.display(),
            headless = options.headless,
            proxy = ?options.proxy,
            "launching browser"
        );

        let mut child = Command::new(&info.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| BrowserError::LaunchFailed {
            reason: "browser stderr was not captured".to_string(),
        })?;

        let ws_url = match wait_for_banner(stderr, options.startup_timeout).await {
            Ok(url) => url,
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    tracing::debug!(error = %kill_err, "failed to kill browser after launch failure");
                }
                return Err(e);
            }
        };

        let browser = CdpClient::connect(&ws_url).await?;

        Ok(Self {
            child,
            browser,
            info,
            _profile_dir: profile_dir,
            closed: false,
        })
    }

    pub fn info(&self) -> &ChromeInfo {
        &self.info
    }

    /// Create a blank page target and connect a driver to it.
    ///
    /// Returns the target id (needed to close the page) and the driver.
    pub async fn open_page(&self) -> Result<(String, BrowserDriver), BrowserError> {
        let result = self
            .browser
            .send_command("Target.createTarget", serde_json::json!({ "url": "about:blank" }))
            .await?;

        let target_id = result
            .get("targetId")
            .and_then(|t| t.as_str())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "Target.createTarget did not return a targetId".to_string(),
            })?
            .to_string();

        let ws_url = page_ws_url(self.browser.url(), &target_id)?;
        let driver = BrowserDriver::connect(&ws_url).await?;
        tracing::debug!(target_id = %target_id, "page target opened");
        Ok((target_id, driver))
    }

    /// Close a page target previously returned by [`open_page`](Self::open_page).
    pub async fn close_target(&self, target_id: &str) -> Result<(), BrowserError> {
        self.browser
            .send_command("Target.closeTarget", serde_json::json!({ "targetId": target_id }))
            .await?;
        Ok(())
    }

    /// Ask Chrome to exit, killing it if it does not within the grace period.
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self
            .browser
            .send_command_with_timeout("Browser.close", serde_json::json!({}), SHUTDOWN_GRACE)
            .await
        {
            tracing::debug!(error = %e, "Browser.close failed; killing the process");
        }
        self.browser.close().await;

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(status) => {
                tracing::debug!(status = ?status?, "browser exited");
            }
            Err(_) => {
                tracing::warn!("browser did not exit in time; killing it");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Read stderr until the DevTools banner appears, then keep draining it in
/// the background so Chrome never blocks on a full pipe.
async fn wait_for_banner(stderr: ChildStderr, timeout: Duration) -> Result<String, BrowserError> {
    let mut lines = BufReader::new(stderr).lines();

    let found = tokio::time::timeout(timeout, async {
        while let Some(line) = lines.next_line().await? {
            if let Some(url) = parse_devtools_line(&line) {
                return Ok(url);
            }
            tracing::trace!(line = %line, "browser stderr");
        }
        Err(BrowserError::LaunchFailed {
            reason: "browser exited before announcing its DevTools endpoint".to_string(),
        })
    })
    .await
    .map_err(|_| BrowserError::LaunchFailed {
        reason: format!("no DevTools endpoint announced within {timeout:?}"),
    })??;

    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::trace!(line = %line, "browser stderr");
        }
    });

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devtools_line() {
        let line = "DevTools listening on ws://127.0.0.1:41235/devtools/browser/6f1c-42\n";
        assert_eq!(
            parse_devtools_line(line).as_deref(),
            Some("ws://127.0.0.1:41235/devtools/browser/6f1c-42")
        );
    }

    #[test]
    fn test_parse_devtools_line_ignores_noise() {
        assert!(parse_devtools_line("[1234:5678:ERROR:gpu_init.cc(523)] Passthrough").is_none());
        assert!(parse_devtools_line("DevTools listening on http://x").is_none());
        assert!(parse_devtools_line("").is_none());
    }

    #[test]
    fn test_page_ws_url_replaces_path() {
        let url = page_ws_url("ws://127.0.0.1:41235/devtools/browser/6f1c-42", "ABCDEF").unwrap();
        assert_eq!(url, "ws://127.0.0.1:41235/devtools/page/ABCDEF");
    }

    #[test]
    fn test_page_ws_url_rejects_garbage() {
        assert!(matches!(
            page_ws_url("not a url", "X"),
            Err(BrowserError::Protocol { .. })
        ));
    }

    #[test]
    fn test_launch_args_headless_with_proxy_and_agent() {
        let options = LaunchOptions {
            proxy: Some("http://proxy.local:3128".into()),
            user_agent: Some("Agent/1.0".into()),
            ..LaunchOptions::default()
        };
        let args = build_launch_args(&options, Path::new("/home/u/.cache/profile"));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.contains(&"--user-data-dir=/home/u/.cache/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--proxy-server=http://proxy.local:3128".to_string()));
        assert!(args.contains(&"--user-agent=Agent/1.0".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_launch_args_headful_without_proxy() {
        let options = LaunchOptions {
            headless: false,
            ..LaunchOptions::default()
        };
        let args = build_launch_args(&options, Path::new("/p"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
    }
}
