//! Embedding Library
//!
//! Process-level entry points of the engine. A native binding implements
//! this over the engine's exported functions; tests and the headless demo
//! use [`crate::loopback::LoopbackLibrary`].

use std::ffi::c_void;
use std::path::Path;

use embed_xpcom::marshal::CStringApi;
use embed_xpcom::{ComPtr, NsResult, Result};

pub trait EmbeddingLibrary {
    /// Start the engine from the runtime directory `gre_path`.
    fn init_embedding(&self, gre_path: Option<&Path>) -> NsResult;

    /// Shut the engine down. Called once, after the last browser is gone.
    fn term_embedding(&self) -> NsResult;

    /// Register the host's `nsIWindowCreator`; null unregisters it.
    fn set_window_creator(&self, creator: *mut c_void) -> NsResult;

    /// Instantiate the web browser component (`nsIWebBrowser`).
    fn create_web_browser(&self) -> Result<ComPtr>;

    /// String glue for `nsACString` arguments.
    fn cstring_api(&self) -> CStringApi;
}
