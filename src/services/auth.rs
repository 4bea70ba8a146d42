//! Authorization Redirects
//!
//! Some stages need the user to authorize an external data provider first.
//! The backend answers with an authorization URL which is handed to an
//! [`AuthRedirector`].

use std::sync::Mutex;

use url::Url;

use crate::utils::error::{AppError, AppResult};

/// Sends the user to an authorization page
pub trait AuthRedirector: Send + Sync {
    fn open_authorization(&self, url: &Url) -> AppResult<()>;
}

/// Parse an authorization URL from a backend response. Only absolute
/// http(s) URLs are accepted.
pub fn parse_auth_url(raw: Option<&str>) -> Result<Url, String> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Authorization required but no authorization URL was provided".to_string())?;
    let url = Url::parse(raw).map_err(|e| format!("Invalid authorization URL '{}': {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("Unsupported authorization URL scheme: {}", other)),
    }
}

/// Opens the URL in the system browser
#[derive(Debug, Default)]
pub struct SystemBrowserRedirector;

impl AuthRedirector for SystemBrowserRedirector {
    fn open_authorization(&self, url: &Url) -> AppResult<()> {
        #[cfg(target_os = "linux")]
        let mut command = std::process::Command::new("xdg-open");
        #[cfg(target_os = "macos")]
        let mut command = std::process::Command::new("open");
        #[cfg(target_os = "windows")]
        let mut command = {
            let mut c = std::process::Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        };
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        return Err(AppError::internal(format!(
            "No browser launcher on this platform; open {} manually",
            url
        )));

        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
        {
            command
                .arg(url.as_str())
                .spawn()
                .map_err(|e| AppError::internal(format!("Failed to open browser: {}", e)))?;
            tracing::info!(url = %url, "Opened authorization page");
            Ok(())
        }
    }
}

/// Records the URL instead of opening anything. Used by the CLI, which
/// prints the URL, and by tests.
#[derive(Debug, Default)]
pub struct RecordingRedirector {
    opened: Mutex<Vec<Url>>,
}

impl RecordingRedirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

impl AuthRedirector for RecordingRedirector {
    fn open_authorization(&self, url: &Url) -> AppResult<()> {
        tracing::info!(url = %url, "Authorization required");
        self.opened
            .lock()
            .map_err(|_| AppError::internal("redirector mutex poisoned"))?
            .push(url.clone());
        Ok(())
    }
}
