//! Embedding Configuration

use std::path::PathBuf;

/// `nsIWebBrowserChrome` chrome flags
pub mod chrome {
    pub const CHROME_DEFAULT: u32 = 0x0000_0001;
    pub const CHROME_WINDOW_BORDERS: u32 = 0x0000_0002;
    pub const CHROME_WINDOW_CLOSE: u32 = 0x0000_0004;
    pub const CHROME_WINDOW_RESIZE: u32 = 0x0000_0008;
    pub const CHROME_MENUBAR: u32 = 0x0000_0010;
    pub const CHROME_TOOLBAR: u32 = 0x0000_0020;
    pub const CHROME_LOCATIONBAR: u32 = 0x0000_0040;
    pub const CHROME_STATUSBAR: u32 = 0x0000_0080;
    pub const CHROME_PERSONAL_TOOLBAR: u32 = 0x0000_0100;
    pub const CHROME_SCROLLBARS: u32 = 0x0000_0200;
    pub const CHROME_TITLEBAR: u32 = 0x0000_0400;
    pub const CHROME_MODAL: u32 = 0x2000_0000;
    pub const CHROME_OPENAS_CHROME: u32 = 0x8000_0000;
    pub const CHROME_ALL: u32 = 0x0000_0ffe;
}

/// Environment variable naming the engine runtime directory
pub const GRE_PATH_VAR: &str = "MOZILLA_FIVE_HOME";

/// Embedding configuration options
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Engine runtime directory handed to the embedding library
    pub gre_path: Option<PathBuf>,

    /// Chrome flags for top-level browsers
    pub chrome_flags: u32,

    /// Smallest width/height passed to the native window
    pub min_client_size: i32,

    /// Log every inbound native call at `debug` instead of `trace`
    pub log_native_calls: bool,
}

impl EmbedConfig {
    /// Defaults, with the runtime directory taken from `MOZILLA_FIVE_HOME`.
    pub fn from_env() -> Self {
        let gre_path = std::env::var_os(GRE_PATH_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            gre_path,
            ..Self::default()
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            gre_path: None,
            chrome_flags: chrome::CHROME_DEFAULT,
            min_client_size: 2,
            log_native_calls: false,
        }
    }
}
