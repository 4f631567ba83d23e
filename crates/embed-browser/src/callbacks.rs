//! Inbound native callbacks
//!
//! One function per emulated slot. Arguments arrive as raw native words in
//! declaration order. No `RefCell` borrow of browser state is held while
//! listeners or the engine run, since either may call back in.

use std::ffi::c_void;
use std::rc::Rc;

use embed_xpcom::marshal::{self, write_out, PrBool, PR_FALSE, PR_TRUE};
use embed_xpcom::{ComPtr, NativeWord, NsIid, NsResult, XpcomError, NS_IDOMWINDOW_IID};

use crate::browser::{Browser, BrowserCore, ABOUT_BLANK};
use crate::config::chrome;
use crate::events::{
    LocationEvent, MenuDetectEvent, Point, ProgressEvent, Size, StatusTextEvent, TitleEvent, WindowEvent,
};
use crate::interfaces::Iface;
use crate::native::{MouseEvent, NativeInterface, Uri, WebBrowser, WebBrowserStream, WebProgress};
use crate::site::Traversal;

/// `nsIWebProgressListener` state flags
pub mod state {
    pub const STATE_START: u32 = 0x0000_0001;
    pub const STATE_REDIRECTING: u32 = 0x0000_0002;
    pub const STATE_TRANSFERRING: u32 = 0x0000_0004;
    pub const STATE_NEGOTIATING: u32 = 0x0000_0008;
    pub const STATE_STOP: u32 = 0x0000_0010;
    pub const STATE_IS_REQUEST: u32 = 0x0001_0000;
    pub const STATE_IS_DOCUMENT: u32 = 0x0002_0000;
    pub const STATE_IS_NETWORK: u32 = 0x0004_0000;
    pub const STATE_IS_WINDOW: u32 = 0x0008_0000;
}

/// `nsIEmbeddingSiteWindow` dimension flags
pub mod dim {
    pub const DIM_FLAGS_POSITION: u32 = 1;
    pub const DIM_FLAGS_SIZE_INNER: u32 = 2;
    pub const DIM_FLAGS_SIZE_OUTER: u32 = 4;
}

const CONTENT_MAYBETEXT: &str = "application/x-vnd.mozilla.maybe-text";
const CONTENT_MULTIPART: &str = "multipart/x-mixed-replace";

/// Status for a callback that failed on the managed side
fn failed(slot: &'static str, error: XpcomError) -> NsResult {
    tracing::warn!(slot, %error, "native callback failed");
    error.to_nsresult()
}

fn null() -> *mut c_void {
    std::ptr::null_mut()
}

// ---- nsIWebProgressListener ----

/// `OnStateChange(webProgress, request, stateFlags, status)`
pub(crate) fn on_state_change(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    use state::*;

    let request = args[1];
    let flags = marshal::word_to_u32(args[2]);
    if flags & STATE_IS_DOCUMENT == 0 {
        return NsResult::NS_OK;
    }

    if flags & STATE_START != 0 {
        let mut state = core.state.borrow_mut();
        if state.request == 0 {
            state.request = request;
        }
    } else if flags & STATE_REDIRECTING != 0 {
        let mut state = core.state.borrow_mut();
        if state.request == request {
            state.request = 0;
        }
    } else if flags & STATE_STOP != 0 {
        let defer_completed = flush_pending_html(core);

        let completed = {
            let mut state = core.state.borrow_mut();
            let matches = state.request == request || state.request == 0;
            if matches {
                state.request = 0;
            }
            matches
        };
        if completed {
            let event = StatusTextEvent { text: String::new() };
            core.listeners.status_text.notify(|l| l.changed(&event));

            if defer_completed {
                // Streamed content is parsed after this callback returns
                let weak = Rc::downgrade(core);
                core.runtime.idle().async_exec("progress-completed", move || {
                    if let Some(core) = weak.upgrade().filter(|core| !core.is_disposed()) {
                        fire_completed(&core);
                    }
                });
            } else {
                fire_completed(core);
            }
        }
    }
    NsResult::NS_OK
}

fn fire_completed(core: &BrowserCore) {
    let event = ProgressEvent::done();
    core.listeners.progress.notify(|l| l.completed(&event));
}

/// Stream a `set_text` document into `about:blank` once it has loaded.
/// Returns whether a document was written.
fn flush_pending_html(core: &Rc<BrowserCore>) -> bool {
    if core.state.borrow().pending_html.is_none() {
        return false;
    }
    let write = || -> crate::Result<bool> {
        let web_browser = core.web_browser()?;
        let navigation = crate::native::WebNavigation::query(web_browser.ptr())?;
        let Some(uri) = navigation.current_uri()? else {
            return Ok(false);
        };
        if !uri.spec(core.strings())?.starts_with(ABOUT_BLANK) {
            return Ok(false);
        }
        let Some(html) = core.state.borrow_mut().pending_html.take() else {
            return Ok(false);
        };
        let stream = WebBrowserStream::query(web_browser.ptr())?;
        stream.open_stream(&uri, "text/html")?;
        stream.append(&html)?;
        stream.close_stream()?;
        tracing::debug!(bytes = html.len(), "document streamed into about:blank");
        Ok(true)
    };
    match write() {
        Ok(written) => written,
        Err(e) => {
            tracing::warn!(error = %e, "streaming document failed");
            core.state.borrow_mut().pending_html = None;
            false
        }
    }
}

/// `OnProgressChange(webProgress, request, curSelf, maxSelf, curTotal, maxTotal)`
pub(crate) fn on_progress_change(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    if core.listeners.progress.is_empty() {
        return NsResult::NS_OK;
    }
    let event = ProgressEvent::normalized(marshal::word_to_i32(args[4]), marshal::word_to_i32(args[5]));
    core.listeners.progress.notify(|l| l.changed(&event));
    NsResult::NS_OK
}

/// `OnLocationChange(webProgress, request, location)`. The location is top
/// level when the reporting window is the root of its frame tree.
pub(crate) fn on_location_change(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    if core.listeners.location.is_empty() {
        return NsResult::NS_OK;
    }

    let top = || -> embed_xpcom::Result<bool> {
        // SAFETY: the engine passes a live nsIWebProgress for the duration of the call
        let progress = unsafe { WebProgress::from_borrowed(args[0]) }.ok_or(XpcomError::NoInterface(WebProgress::IID))?;
        let window = progress.dom_window()?;
        Ok(window.is_same(&window.top()?))
    };
    let top = match top() {
        Ok(top) => top,
        Err(e) => return failed("OnLocationChange", e),
    };

    // SAFETY: the engine passes a live nsIURI for the duration of the call
    let Some(uri) = (unsafe { Uri::from_borrowed(args[2]) }) else {
        return NsResult::NS_ERROR_NULL_POINTER;
    };
    let location = match uri.spec(core.strings()) {
        Ok(location) => location,
        Err(e) => return failed("OnLocationChange", e),
    };
    drop(uri);
    if args[1] == 0 && location.starts_with(ABOUT_BLANK) && core.state.borrow().pending_html.is_some() {
        return NsResult::NS_OK;
    }

    let event = LocationEvent::new(location, top);
    core.listeners.location.notify(|l| l.changed(&event));
    NsResult::NS_OK
}

/// `OnStatusChange(webProgress, request, status, message)`
pub(crate) fn on_status_change(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    fire_status(core, "OnStatusChange", args[3])
}

fn fire_status(core: &BrowserCore, slot: &'static str, message: NativeWord) -> NsResult {
    if core.listeners.status_text.is_empty() {
        return NsResult::NS_OK;
    }
    // SAFETY: the engine passes a NUL-terminated PRUnichar string
    let text = match unsafe { marshal::wide_cstr(message) } {
        Ok(text) => text,
        Err(e) => return failed(slot, e),
    };
    let event = StatusTextEvent { text };
    core.listeners.status_text.notify(|l| l.changed(&event));
    NsResult::NS_OK
}

// ---- nsIWebBrowserChrome ----

/// `SetStatus(statusType, status)`
pub(crate) fn set_status(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    fire_status(core, "SetStatus", args[1])
}

/// `GetWebBrowser(nsIWebBrowser**)`
pub(crate) fn get_web_browser(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let raw = match core.web_browser() {
        Ok(web_browser) => web_browser.ptr().clone().into_raw(),
        Err(_) => null(),
    };
    // SAFETY: out-parameter for an interface pointer; the reference moves to the caller
    let rc = unsafe { write_out(args[0], raw) };
    if rc.failed() && !raw.is_null() {
        // SAFETY: adopt back the reference nobody received
        drop(unsafe { ComPtr::from_raw(raw) });
    }
    rc
}

/// `SetWebBrowser(nsIWebBrowser*)`
pub(crate) fn set_web_browser(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    // SAFETY: the engine passes a live nsIWebBrowser or null
    let web_browser = unsafe { ComPtr::from_borrowed(args[0] as *mut c_void) }.map(WebBrowser::from_ptr);
    core.replace_web_browser(web_browser);
    NsResult::NS_OK
}

/// `GetChromeFlags(PRUint32*)`
pub(crate) fn get_chrome_flags(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let flags = core.state.borrow().chrome_flags;
    // SAFETY: PRUint32 out-parameter
    unsafe { write_out(args[0], flags) }
}

/// `SetChromeFlags(PRUint32)`
pub(crate) fn set_chrome_flags(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    core.state.borrow_mut().chrome_flags = marshal::word_to_u32(args[0]);
    NsResult::NS_OK
}

/// `DestroyBrowserWindow()`: the page closed its window.
pub(crate) fn destroy_browser_window(core: &Rc<BrowserCore>, _args: &[NativeWord]) -> NsResult {
    let event = WindowEvent {
        browser: Some(Browser::from_core(core.clone())),
        ..WindowEvent::default()
    };
    core.listeners.close_window.notify(|l| l.close(&event));
    drop(event);
    core.dispose();
    NsResult::NS_OK
}

/// `SizeBrowserTo(cx, cy)`
pub(crate) fn size_browser_to(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let size = Size::new(marshal::word_to_i32(args[0]), marshal::word_to_i32(args[1]));
    let open_as_chrome = {
        let mut state = core.state.borrow_mut();
        state.size = Some(size);
        state.chrome_flags & chrome::CHROME_OPENAS_CHROME != 0
    };
    if open_as_chrome {
        core.site.set_bounds(None, Some(size));
    }
    NsResult::NS_OK
}

/// `IsWindowModal(PRBool*)`: the host runs no modal loop.
pub(crate) fn is_window_modal(_core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    // SAFETY: PRBool out-parameter
    unsafe { write_out::<PrBool>(args[0], PR_FALSE) }
}

// ---- nsIWebBrowserChromeFocus ----

pub(crate) fn focus_next_element(core: &Rc<BrowserCore>, _args: &[NativeWord]) -> NsResult {
    queue_traversal(core, Traversal::TabNext)
}

pub(crate) fn focus_prev_element(core: &Rc<BrowserCore>, _args: &[NativeWord]) -> NsResult {
    queue_traversal(core, Traversal::TabPrevious)
}

/// Focus leaves the browser once the engine has finished its own handling.
fn queue_traversal(core: &Rc<BrowserCore>, direction: Traversal) -> NsResult {
    let weak = Rc::downgrade(core);
    core.runtime.idle().async_exec("focus-traversal", move || {
        if let Some(core) = weak.upgrade().filter(|core| !core.is_disposed()) {
            core.site.traverse(direction);
        }
    });
    NsResult::NS_OK
}

// ---- nsIEmbeddingSiteWindow ----

/// `SetDimensions(flags, x, y, cx, cy)`
pub(crate) fn set_dimensions(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let flags = marshal::word_to_u32(args[0]);
    let location = (flags & dim::DIM_FLAGS_POSITION != 0)
        .then(|| Point::new(marshal::word_to_i32(args[1]), marshal::word_to_i32(args[2])));
    let size = (flags & (dim::DIM_FLAGS_SIZE_INNER | dim::DIM_FLAGS_SIZE_OUTER) != 0)
        .then(|| Size::new(marshal::word_to_i32(args[3]), marshal::word_to_i32(args[4])));

    let open_as_chrome = {
        let mut state = core.state.borrow_mut();
        if location.is_some() {
            state.location = location;
        }
        if size.is_some() {
            state.size = size;
        }
        state.chrome_flags & chrome::CHROME_OPENAS_CHROME != 0
    };
    if open_as_chrome {
        core.site.set_bounds(location, size);
    }
    NsResult::NS_OK
}

/// `GetDimensions(flags, PRInt32* x, y, cx, cy)`; null out-parameters are skipped.
pub(crate) fn get_dimensions(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let flags = marshal::word_to_u32(args[0]);
    // SAFETY: each non-null argument is a PRInt32 out-parameter
    unsafe {
        if flags & dim::DIM_FLAGS_POSITION != 0 {
            let location = core.site.location();
            write_out(args[1], location.x);
            write_out(args[2], location.y);
        }
        if flags & (dim::DIM_FLAGS_SIZE_INNER | dim::DIM_FLAGS_SIZE_OUTER) != 0 {
            let size = core.site.client_size();
            write_out(args[3], size.width);
            write_out(args[4], size.height);
        }
    }
    NsResult::NS_OK
}

/// `SetFocus()`
pub(crate) fn set_focus(core: &Rc<BrowserCore>, _args: &[NativeWord]) -> NsResult {
    match core.query::<crate::native::BaseWindow>() {
        Ok(base_window) => match base_window.set_focus() {
            Ok(()) => NsResult::NS_OK,
            Err(e) => failed("SetFocus", e),
        },
        Err(e) => {
            tracing::debug!(error = %e, "SetFocus without a native window");
            NsResult::NS_ERROR_UNEXPECTED
        }
    }
}

/// `GetVisibility(PRBool*)`
pub(crate) fn get_visibility(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let visible = if core.site.is_visible() { PR_TRUE } else { PR_FALSE };
    // SAFETY: PRBool out-parameter
    unsafe { write_out::<PrBool>(args[0], visible) }
}

/// `SetVisibility(PRBool)`. The engine repeats show requests for windows
/// opened by script; only the first one reaches listeners.
pub(crate) fn set_visibility(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    if marshal::word_to_bool(args[0]) {
        let event = {
            let mut state = core.state.borrow_mut();
            if state.visible {
                return NsResult::NS_OK;
            }
            state.visible = true;
            let mut event = WindowEvent::with_chrome_flags(state.chrome_flags);
            event.location = state.location.take();
            event.size = state.size.take();
            event
        };
        core.listeners.visibility_window.notify(|l| l.show(&event));
    } else {
        core.state.borrow_mut().visible = false;
        let event = WindowEvent::default();
        core.listeners.visibility_window.notify(|l| l.hide(&event));
    }
    NsResult::NS_OK
}

/// `GetTitle(PRUnichar**)`: titles flow one way.
pub(crate) fn get_title(_core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    if args[0] != 0 {
        // SAFETY: string out-parameter
        unsafe { write_out(args[0], null()) };
    }
    NsResult::NS_OK
}

/// `SetTitle(const PRUnichar*)`. Pages without a title report their URL.
pub(crate) fn set_title(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    if core.listeners.title.is_empty() {
        return NsResult::NS_OK;
    }
    let title = if args[0] == 0 {
        String::new()
    } else {
        // SAFETY: NUL-terminated PRUnichar string
        match unsafe { marshal::wide_cstr(args[0]) } {
            Ok(title) => title,
            Err(e) => return failed("SetTitle", e),
        }
    };
    let title = if title.is_empty() {
        core.current_url().unwrap_or_default()
    } else {
        title
    };
    let event = TitleEvent { title };
    core.listeners.title.notify(|l| l.changed(&event));
    NsResult::NS_OK
}

/// `GetSiteWindow(void**)`
pub(crate) fn get_site_window(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    // SAFETY: native window handle out-parameter
    unsafe { write_out(args[0], core.site.site_window()) }
}

// ---- nsIInterfaceRequestor / weak references ----

/// `GetInterface(iid, void**)`
pub(crate) fn get_interface(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    // SAFETY: the engine passes an IID pointer or null
    let Some(iid) = (unsafe { marshal::read_in::<NsIid>(args[0]) }) else {
        return NsResult::NS_ERROR_NO_INTERFACE;
    };
    if iid != NS_IDOMWINDOW_IID {
        // SAFETY: same contract as QueryInterface
        return unsafe { core.identity.query_interface(args[0], args[1]) };
    }

    let window = core.web_browser().map_err(|_| XpcomError::Disposed);
    let window = match window.and_then(|web_browser| web_browser.content_dom_window()) {
        Ok(window) => window.map_or(null(), ComPtr::into_raw),
        Err(e) => return failed("GetInterface", e),
    };
    // SAFETY: interface out-parameter; the reference moves to the caller
    let rc = unsafe { write_out(args[1], window) };
    if rc.failed() && !window.is_null() {
        // SAFETY: adopt back the reference nobody received
        drop(unsafe { ComPtr::from_raw(window) });
    }
    if window.is_null() && rc.succeeded() {
        return NsResult::NS_ERROR_NO_INTERFACE;
    }
    rc
}

/// `QueryReferent(iid, void**)`: the referent is the browser itself.
pub(crate) fn query_referent(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    // SAFETY: same contract as QueryInterface
    unsafe { core.identity.query_interface(args[0], args[1]) }
}

/// `GetWeakReference(nsIWeakReference**)`
pub(crate) fn get_weak_reference(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let address = core.address(Iface::WeakReference);
    if address.is_null() {
        return NsResult::NS_ERROR_UNEXPECTED;
    }
    // SAFETY: interface out-parameter
    let rc = unsafe { write_out(args[0], address) };
    if rc.succeeded() {
        core.identity.add_ref();
    }
    rc
}

// ---- nsIContextMenuListener ----

/// `OnShowContextMenu(contextFlags, nsIDOMEvent*, nsIDOMNode*)`. Only mouse
/// events carry a location; anything else fails with `NS_ERROR_NO_INTERFACE`.
pub(crate) fn on_show_context_menu(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let screen = || -> embed_xpcom::Result<(i32, i32)> {
        // SAFETY: the engine passes a live nsIDOMEvent for the duration of the call
        let event = unsafe { ComPtr::from_borrowed(args[1] as *mut c_void) }
            .ok_or(XpcomError::NoInterface(MouseEvent::IID))?;
        MouseEvent::query(&event)?.screen()
    };
    let (x, y) = match screen() {
        Ok(at) => at,
        Err(e) => return failed("OnShowContextMenu", e),
    };

    let mut event = MenuDetectEvent::new(Point::new(x, y));
    core.listeners.menu_detect.notify(|l| l.detected(&mut event));
    if event.doit && !core.is_disposed() {
        core.site.show_context_menu(event.location);
    }
    NsResult::NS_OK
}

// ---- nsIURIContentListener ----

/// `OnStartURIOpen(nsIURI*, PRBool* abort)`. Only navigations starting
/// while no document load is tracked can be vetoed; opens inside a running
/// load (frames, redirects) always proceed.
pub(crate) fn on_start_uri_open(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let mut doit = true;
    if !core.listeners.location.is_empty() && core.state.borrow().request == 0 {
        // SAFETY: the engine passes a live nsIURI for the duration of the call
        let location = match unsafe { Uri::from_borrowed(args[0]) } {
            Some(uri) => match uri.spec(core.strings()) {
                Ok(location) => location,
                Err(e) => return failed("OnStartURIOpen", e),
            },
            None => return NsResult::NS_ERROR_NULL_POINTER,
        };
        let mut event = LocationEvent::new(location, true);
        core.listeners.location.notify(|l| l.changing(&mut event));
        doit = event.doit;
    }
    // SAFETY: PRBool out-parameter; true aborts the load
    unsafe { write_out::<PrBool>(args[1], if doit { PR_FALSE } else { PR_TRUE }) }
}

/// `IsPreferred(const char* contentType, char** desired, PRBool*)`
pub(crate) fn is_preferred(_core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    let preferred = if args[0] == 0 {
        false
    } else {
        // SAFETY: NUL-terminated content type
        match unsafe { marshal::utf8_cstr(args[0]) } {
            Ok(content_type) => {
                !content_type.is_empty() && content_type != CONTENT_MAYBETEXT && content_type != CONTENT_MULTIPART
            }
            Err(e) => return failed("IsPreferred", e),
        }
    };
    // SAFETY: PRBool out-parameter
    unsafe { write_out::<PrBool>(args[2], if preferred { PR_TRUE } else { PR_FALSE }) }
}

// ---- nsITooltipListener ----

/// `OnShowTooltip(x, y, const PRUnichar* text)`
pub(crate) fn on_show_tooltip(core: &Rc<BrowserCore>, args: &[NativeWord]) -> NsResult {
    // SAFETY: NUL-terminated PRUnichar string
    let text = match unsafe { marshal::wide_cstr(args[2]) } {
        Ok(text) => text,
        Err(e) => return failed("OnShowTooltip", e),
    };
    let at = Point::new(marshal::word_to_i32(args[0]), marshal::word_to_i32(args[1]));
    core.site.show_tooltip(at, &text);
    NsResult::NS_OK
}

pub(crate) fn on_hide_tooltip(core: &Rc<BrowserCore>, _args: &[NativeWord]) -> NsResult {
    core.site.hide_tooltip();
    NsResult::NS_OK
}
