//! Browser
//!
//! A browser embedded in a host site. Owns one engine web browser (the
//! native handle) and exposes itself to the engine as one reference-counted
//! object implementing the host-side embedding interfaces.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use embed_xpcom::marshal::CStringApi;
use embed_xpcom::{ComIdentity, NativeWord, NS_IWEBPROGRESSLISTENER_IID};

use crate::config::chrome;
use crate::error::{BrowserError, Result};
use crate::events::{Point, Size};
use crate::interfaces::{self, Iface};
use crate::listeners::{
    CloseWindowListener, Listeners, LocationListener, MenuDetectListener, OpenWindowListener, ProgressListener,
    StatusTextListener, TitleListener, VisibilityWindowListener,
};
use crate::native::{BaseWindow, NativeInterface, WebBrowser, WebBrowserFocus, WebBrowserStream, WebNavigation};
use crate::runtime::{Handle, Runtime};
use crate::site::EmbedSite;

pub(crate) const ABOUT_BLANK: &str = "about:blank";

/// Navigation and window state touched by native callbacks
#[derive(Debug, Default)]
pub(crate) struct NavState {
    /// Request whose completion ends the current navigation; 0 when none
    /// is tracked (nothing loading, or the tracked one was redirected)
    pub request: NativeWord,
    pub chrome_flags: u32,
    /// Opened by the engine through the window creator
    pub is_child: bool,
    pub visible: bool,
    /// Bounds requested before the window was shown
    pub location: Option<Point>,
    pub size: Option<Size>,
    /// Document waiting for `about:blank` to finish loading
    pub pending_html: Option<Vec<u8>>,
}

pub(crate) struct BrowserCore {
    pub(crate) runtime: Runtime,
    pub(crate) site: Rc<dyn EmbedSite>,
    pub(crate) identity: Rc<ComIdentity>,
    pub(crate) listeners: Listeners,
    pub(crate) state: RefCell<NavState>,
    /// The engine web browser; released once, when the count reaches zero
    web_browser: RefCell<Option<WebBrowser>>,
    handle: Cell<Option<Handle>>,
    disposed: Cell<bool>,
}

impl BrowserCore {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// A new reference to the engine web browser
    pub(crate) fn web_browser(&self) -> Result<WebBrowser> {
        if self.is_disposed() {
            return Err(BrowserError::Disposed);
        }
        self.web_browser.borrow().clone().ok_or(BrowserError::Disposed)
    }

    pub(crate) fn query<T: NativeInterface>(&self) -> Result<T> {
        let web_browser = self.web_browser()?;
        Ok(T::query(web_browser.ptr())?)
    }

    /// Replace the engine web browser (`SetWebBrowser`).
    pub(crate) fn replace_web_browser(&self, web_browser: Option<WebBrowser>) {
        let old = self.web_browser.replace(web_browser);
        drop(old);
    }

    pub(crate) fn address(&self, iface: Iface) -> *mut c_void {
        self.identity.table_address(iface as usize)
    }

    pub(crate) fn owns(&self, ptr: *const c_void) -> bool {
        self.identity.owns(ptr)
    }

    pub(crate) fn become_child(&self, chrome_flags: u32) {
        let mut state = self.state.borrow_mut();
        state.is_child = true;
        state.chrome_flags = chrome_flags;
    }

    pub(crate) fn strings(&self) -> CStringApi {
        self.runtime.library().cstring_api()
    }

    /// Current top-level location, `about:blank` for in-memory documents
    pub(crate) fn current_url(&self) -> Result<String> {
        let navigation: WebNavigation = self.query()?;
        match navigation.current_uri()? {
            Some(uri) => Ok(uri.spec(self.strings())?),
            None => Ok(String::new()),
        }
    }

    /// Hook the engine web browser up to this browser's interfaces.
    fn attach(&self) -> Result<()> {
        let web_browser = self.web_browser()?;
        web_browser.set_container_window(self.address(Iface::Chrome))?;

        let base_window: BaseWindow = self.query()?;
        let min = self.runtime.config().min_client_size;
        let size = self.site.client_size();
        base_window.init_window(
            self.site.native_handle(),
            0,
            0,
            size.width.max(min),
            size.height.max(min),
        )?;
        base_window.create()?;
        base_window.set_visibility(true)?;

        web_browser.add_web_browser_listener(self.address(Iface::WeakReference), &NS_IWEBPROGRESSLISTENER_IID)?;
        web_browser.set_parent_uri_content_listener(self.address(Iface::UriContentListener))?;
        Ok(())
    }

    /// Unhook from the engine and drop the construction reference.
    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        tracing::debug!(refcount = self.identity.refcount(), "disposing browser");

        let web_browser = self.web_browser.borrow().clone();
        if let Some(web_browser) = web_browser {
            let weak_reference = self.address(Iface::WeakReference);
            if let Err(e) = web_browser.remove_web_browser_listener(weak_reference, &NS_IWEBPROGRESSLISTENER_IID) {
                tracing::warn!(error = %e, "unhooking progress listener failed");
            }
            if let Err(e) = web_browser.set_parent_uri_content_listener(std::ptr::null_mut()) {
                tracing::warn!(error = %e, "unhooking content listener failed");
            }
            match BaseWindow::query(web_browser.ptr()) {
                Ok(base_window) => {
                    if let Err(e) = base_window.destroy() {
                        tracing::warn!(error = %e, "destroying native window failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "no native window to destroy"),
            }
        }

        self.state.borrow_mut().pending_html = None;
        self.identity.release();
    }

    /// Teardown hook: the engine dropped its last reference.
    fn release_native_handle(&self) {
        let web_browser = self.web_browser.borrow_mut().take();
        if web_browser.is_some() {
            tracing::debug!("releasing engine web browser");
        }
        drop(web_browser);
        self.disposed.set(true);
        if let Some(handle) = self.handle.take() {
            self.runtime.unregister(handle);
        }
    }
}

/// An embedded browser.
///
/// Cheap to clone; clones refer to the same browser.
#[derive(Clone)]
pub struct Browser {
    core: Rc<BrowserCore>,
}

impl Browser {
    /// Create a browser inside `site`.
    pub fn new(runtime: &Runtime, site: Rc<dyn EmbedSite>) -> Result<Browser> {
        if !runtime.is_active() {
            return Err(BrowserError::NotInitialized);
        }
        let web_browser = WebBrowser::from_ptr(runtime.library().create_web_browser()?);

        let core = Rc::new(BrowserCore {
            runtime: runtime.clone(),
            site,
            identity: ComIdentity::new("browser"),
            listeners: Listeners::new(),
            state: RefCell::new(NavState {
                chrome_flags: runtime.config().chrome_flags,
                ..NavState::default()
            }),
            web_browser: RefCell::new(Some(web_browser)),
            handle: Cell::new(None),
            disposed: Cell::new(false),
        });

        if let Err(e) = interfaces::install(&core) {
            core.disposed.set(true);
            core.identity.dispose_now();
            return Err(e.into());
        }
        let weak = Rc::downgrade(&core);
        core.identity.on_teardown(move || {
            if let Some(core) = weak.upgrade() {
                core.release_native_handle();
            }
        });
        core.handle.set(Some(runtime.register(core.clone())));

        if let Err(e) = core.attach() {
            tracing::error!(error = %e, "attaching to engine web browser failed");
            core.dispose();
            return Err(e);
        }
        tracing::debug!(browsers = runtime.browser_count(), "browser created");
        Ok(Browser { core })
    }

    pub(crate) fn from_core(core: Rc<BrowserCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Rc<BrowserCore> {
        &self.core
    }

    pub(crate) fn is_same_core(&self, other: &Rc<BrowserCore>) -> bool {
        Rc::ptr_eq(&self.core, other)
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Engine references to this browser, including its own
    pub fn native_refcount(&self) -> u32 {
        self.core.identity.refcount()
    }

    /// Address of this browser's `nsIWebBrowserChrome`
    pub fn chrome(&self) -> *mut c_void {
        self.core.address(Iface::Chrome)
    }

    pub fn is_child(&self) -> bool {
        self.core.state.borrow().is_child
    }

    pub fn chrome_flags(&self) -> u32 {
        self.core.state.borrow().chrome_flags
    }

    /// Navigate to `url`.
    pub fn set_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(BrowserError::InvalidUrl {
                url: url.to_string(),
                reason: "empty".to_string(),
            });
        }
        let navigation: WebNavigation = self.core.query()?;
        self.core.state.borrow_mut().pending_html = None;
        navigation.load_uri(url, WebNavigation::LOAD_FLAGS_NONE)?;
        Ok(())
    }

    /// Show `html`. The document is streamed in once `about:blank` has
    /// loaded, so the usual navigation events fire.
    pub fn set_text(&self, html: &str) -> Result<()> {
        // Fail early if the engine cannot take a stream
        let _stream: WebBrowserStream = self.core.query()?;

        let blank_loading = self
            .core
            .state
            .borrow_mut()
            .pending_html
            .replace(html.as_bytes().to_vec())
            .is_some();
        if blank_loading {
            return Ok(());
        }

        let navigation: WebNavigation = self.core.query()?;
        navigation.load_uri(ABOUT_BLANK, WebNavigation::LOAD_FLAGS_NONE)?;
        Ok(())
    }

    /// Run `script` in the current page.
    pub fn execute(&self, script: &str) -> Result<()> {
        let navigation: WebNavigation = self.core.query()?;
        navigation.load_uri(&format!("javascript:{}", script), WebNavigation::LOAD_FLAGS_NONE)?;
        Ok(())
    }

    /// Go back in history. `Ok(false)` when the engine refused.
    pub fn back(&self) -> Result<bool> {
        let navigation: WebNavigation = self.core.query()?;
        Ok(navigation.go_back().is_ok())
    }

    pub fn forward(&self) -> Result<bool> {
        let navigation: WebNavigation = self.core.query()?;
        Ok(navigation.go_forward().is_ok())
    }

    pub fn is_back_enabled(&self) -> Result<bool> {
        let navigation: WebNavigation = self.core.query()?;
        Ok(navigation.can_go_back()?)
    }

    pub fn is_forward_enabled(&self) -> Result<bool> {
        let navigation: WebNavigation = self.core.query()?;
        Ok(navigation.can_go_forward()?)
    }

    pub fn refresh(&self) -> Result<()> {
        let navigation: WebNavigation = self.core.query()?;
        navigation.reload(WebNavigation::LOAD_FLAGS_NONE)?;
        Ok(())
    }

    /// Stop loading. Listeners may still see a trailing completion.
    pub fn stop(&self) -> Result<()> {
        let navigation: WebNavigation = self.core.query()?;
        navigation.stop(WebNavigation::STOP_ALL)?;
        Ok(())
    }

    /// Current top-level location; empty before the first navigation
    pub fn url(&self) -> Result<String> {
        self.core.current_url()
    }

    /// Resize the engine window to the site's client area.
    pub fn on_resize(&self) -> Result<()> {
        let base_window: BaseWindow = self.core.query()?;
        let min = self.core.runtime.config().min_client_size;
        let size = self.core.site.client_size();
        base_window.set_position_and_size(0, 0, size.width.max(min), size.height.max(min), true)?;
        Ok(())
    }

    pub fn on_focus_gained(&self) -> Result<()> {
        let focus: WebBrowserFocus = self.core.query()?;
        focus.activate()?;
        Ok(())
    }

    pub fn on_focus_lost(&self) -> Result<()> {
        let focus: WebBrowserFocus = self.core.query()?;
        focus.deactivate()?;
        Ok(())
    }

    /// Release the browser. Safe to call more than once.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    pub fn add_location_listener(&self, listener: Rc<dyn LocationListener>) {
        self.core.listeners.location.add(listener);
    }

    pub fn remove_location_listener(&self, listener: &Rc<dyn LocationListener>) {
        self.core.listeners.location.remove(listener);
    }

    pub fn add_progress_listener(&self, listener: Rc<dyn ProgressListener>) {
        self.core.listeners.progress.add(listener);
    }

    pub fn remove_progress_listener(&self, listener: &Rc<dyn ProgressListener>) {
        self.core.listeners.progress.remove(listener);
    }

    pub fn add_status_text_listener(&self, listener: Rc<dyn StatusTextListener>) {
        self.core.listeners.status_text.add(listener);
    }

    pub fn remove_status_text_listener(&self, listener: &Rc<dyn StatusTextListener>) {
        self.core.listeners.status_text.remove(listener);
    }

    pub fn add_title_listener(&self, listener: Rc<dyn TitleListener>) {
        self.core.listeners.title.add(listener);
    }

    pub fn remove_title_listener(&self, listener: &Rc<dyn TitleListener>) {
        self.core.listeners.title.remove(listener);
    }

    pub fn add_visibility_window_listener(&self, listener: Rc<dyn VisibilityWindowListener>) {
        self.core.listeners.visibility_window.add(listener);
    }

    pub fn remove_visibility_window_listener(&self, listener: &Rc<dyn VisibilityWindowListener>) {
        self.core.listeners.visibility_window.remove(listener);
    }

    pub fn add_open_window_listener(&self, listener: Rc<dyn OpenWindowListener>) {
        self.core.listeners.open_window.add(listener);
    }

    pub fn remove_open_window_listener(&self, listener: &Rc<dyn OpenWindowListener>) {
        self.core.listeners.open_window.remove(listener);
    }

    pub fn add_close_window_listener(&self, listener: Rc<dyn CloseWindowListener>) {
        self.core.listeners.close_window.add(listener);
    }

    pub fn remove_close_window_listener(&self, listener: &Rc<dyn CloseWindowListener>) {
        self.core.listeners.close_window.remove(listener);
    }

    pub fn add_menu_detect_listener(&self, listener: Rc<dyn MenuDetectListener>) {
        self.core.listeners.menu_detect.add(listener);
    }

    pub fn remove_menu_detect_listener(&self, listener: &Rc<dyn MenuDetectListener>) {
        self.core.listeners.menu_detect.remove(listener);
    }
}

impl PartialEq for Browser {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.borrow();
        f.debug_struct("Browser")
            .field("disposed", &self.core.is_disposed())
            .field("refcount", &self.core.identity.refcount())
            .field("child", &state.is_child)
            .field("modal", &(state.chrome_flags & chrome::CHROME_MODAL != 0))
            .finish()
    }
}
