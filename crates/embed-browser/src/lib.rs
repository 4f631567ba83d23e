//! embed-browser
//!
//! Hosts a Mozilla-family engine inside a toolkit widget.
//!
//! The engine reports navigation, status and window requests by calling
//! interface tables the host implements; this crate turns those calls into
//! typed events for registered listeners, and turns toolkit requests
//! (navigate, stop, run script) into calls on the engine's interfaces.
//!
//! # Example
//! ```rust,ignore
//! use embed_browser::{Browser, EmbedConfig, HeadlessSite, Runtime, Size};
//! use embed_browser::loopback::LoopbackLibrary;
//!
//! let library = LoopbackLibrary::new();
//! let runtime = Runtime::init(library.clone(), EmbedConfig::from_env())?;
//! let browser = Browser::new(&runtime, Rc::new(HeadlessSite::new(1, Size::new(800, 600))))?;
//! browser.add_title_listener(Rc::new(|e: &TitleEvent| println!("{}", e.title)));
//! browser.set_url("https://example.com")?;
//! ```

mod browser;
mod callbacks;
mod config;
mod error;
mod interfaces;
mod runtime;
pub mod events;
pub mod idle;
pub mod library;
pub mod listeners;
pub mod loopback;
pub mod native;
pub mod site;

pub use browser::Browser;
pub use callbacks::{dim, state};
pub use config::{chrome, EmbedConfig, GRE_PATH_VAR};
pub use error::{BrowserError, Result};
pub use events::{
    LocationEvent, MenuDetectEvent, Point, ProgressEvent, Size, StatusTextEvent, TitleEvent, WindowEvent,
};
pub use idle::IdleQueue;
pub use library::EmbeddingLibrary;
pub use listeners::{
    CloseWindowListener, ListenerRegistry, LocationListener, MenuDetectListener, OpenWindowListener,
    ProgressListener, StatusTextListener, TitleListener, VisibilityWindowListener,
};
pub use runtime::Runtime;
pub use site::{EmbedSite, HeadlessSite, Traversal};

// Re-export the ABI layer for hosts that implement their own library
pub use embed_xpcom as xpcom;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
