//! Loopback Engine
//!
//! An in-process [`EmbeddingLibrary`]. Its web browsers, URIs and DOM
//! windows are real interface tables, so the bridge reaches them through
//! the same native calls it makes against the engine, and notifications
//! sent back travel through the bridge's own tables.
//!
//! Navigation is committed when `LoadURI` is called; the matching progress
//! notifications are emitted by [`LoopbackBrowser::pump`], the way the
//! engine emits them from its event loop.

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_void, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use embed_xpcom::marshal::{
    self, read_in, write_out, CStringApi, CStringContainer, PrBool, WideString, PR_FALSE, PR_TRUE,
};
use embed_xpcom::{
    ComIdentity, ComPtr, InterfaceTable, NativeWord, NsIid, NsResult, Result, Slot, XpcomError, SLOT_RELEASE,
    NS_IBASEWINDOW_IID, NS_ICONTEXTMENULISTENER_IID, NS_IDOMMOUSEEVENT_IID, NS_IDOMWINDOW_IID,
    NS_IEMBEDDINGSITEWINDOW_IID, NS_IINTERFACEREQUESTOR_IID, NS_ISUPPORTS_IID, NS_ISUPPORTSWEAKREFERENCE_IID,
    NS_ITOOLTIPLISTENER_IID, NS_IURI_IID, NS_IWEBBROWSERCHROME_IID, NS_IWEBBROWSERCHROMEFOCUS_IID,
    NS_IWEBBROWSERFOCUS_IID, NS_IWEBBROWSERSTREAM_IID, NS_IWEBBROWSER_IID, NS_IWEBNAVIGATION_IID,
    NS_IWEBPROGRESSLISTENER_IID, NS_IWEBPROGRESS_IID,
};

use crate::callbacks::state::*;
use crate::library::EmbeddingLibrary;
use crate::native::{BaseWindow, DomWindow, MouseEvent, NativeInterface, Uri, WebProgress};

const JAVASCRIPT_SCHEME: &str = "javascript:";

/// `nsIContextMenuListener::CONTEXT_DOCUMENT`
const CONTEXT_DOCUMENT: NativeWord = 4;

fn iid_word(iid: &NsIid) -> NativeWord {
    iid as *const NsIid as NativeWord
}

/// An engine object that owns itself until its last reference is released.
fn standalone(interface: &'static str, iid: NsIid, slots: Vec<Slot>) -> Result<ComPtr> {
    let identity = ComIdentity::new(interface);
    let weak = Rc::downgrade(&identity);
    let supports = InterfaceTable::new("nsISupports", ComIdentity::supports_slots(&weak).to_vec())?;
    identity.add_table(&[NS_ISUPPORTS_IID], supports);

    let mut all = ComIdentity::supports_slots(&weak).to_vec();
    all.extend(slots);
    let index = identity.add_table(&[iid], InterfaceTable::new(interface, all)?);

    let keep_alive = identity.clone();
    identity.on_teardown(move || drop(keep_alive));
    // SAFETY: the construction reference moves into the pointer
    unsafe { ComPtr::from_raw(identity.table_address(index)) }.ok_or(XpcomError::Disposed)
}

// ---- string glue ----
// A container's `d1` owns a boxed byte buffer.

/// # Safety
/// `container` must be null or a container initialized by this glue.
unsafe fn cstring_buffer<'a>(container: *mut CStringContainer) -> Option<&'a mut Vec<u8>> {
    if container.is_null() {
        return None;
    }
    (*container).d1.cast::<Vec<u8>>().as_mut()
}

unsafe extern "C" fn cstring_init(container: *mut CStringContainer) -> NsResult {
    if container.is_null() {
        return NsResult::NS_ERROR_NULL_POINTER;
    }
    (*container).d1 = Box::into_raw(Box::<Vec<u8>>::default()).cast();
    (*container).d2 = 0;
    NsResult::NS_OK
}

unsafe extern "C" fn cstring_get_data(
    container: *const CStringContainer,
    data: *mut *const c_char,
    terminated: *mut PrBool,
) -> u32 {
    let buffer = cstring_buffer(container.cast_mut());
    if !data.is_null() {
        *data = buffer.as_ref().map_or(std::ptr::null(), |b| b.as_ptr().cast());
    }
    if !terminated.is_null() {
        *terminated = PR_FALSE;
    }
    buffer.map_or(0, |b| b.len() as u32)
}

unsafe extern "C" fn cstring_finish(container: *mut CStringContainer) {
    if container.is_null() || (*container).d1.is_null() {
        return;
    }
    drop(Box::from_raw((*container).d1.cast::<Vec<u8>>()));
    (*container).d1 = std::ptr::null_mut();
}

/// String glue of the loopback engine
pub const STRINGS: CStringApi = CStringApi {
    container_init: cstring_init,
    get_data: cstring_get_data,
    container_finish: cstring_finish,
};

/// A `nsIURI` whose `GetSpec` assigns `spec`.
pub fn new_uri(spec: &str) -> Result<Uri> {
    let spec = spec.as_bytes().to_vec();
    let get_spec = Slot::new(1, move |args| {
        // SAFETY: (nsACString&) from this engine's string glue
        match unsafe { cstring_buffer(args[0] as *mut CStringContainer) } {
            Some(buffer) => {
                buffer.clear();
                buffer.extend_from_slice(&spec);
                NsResult::NS_OK
            }
            None => NsResult::NS_ERROR_NULL_POINTER,
        }
    });
    standalone("nsIURI", NS_IURI_IID, vec![get_spec]).map(Uri::from_ptr)
}

/// A `nsIDOMWindow` whose parent and top are `top`, or itself when `top`
/// is `None`.
fn new_dom_window(top: Option<ComPtr>) -> Result<DomWindow> {
    let this = Rc::new(Cell::new(std::ptr::null_mut::<c_void>()));
    let root = {
        let this = this.clone();
        move || match &top {
            Some(top) => Some(top.clone()),
            // SAFETY: slots only run while the window is alive
            None => unsafe { ComPtr::from_borrowed(this.get()) },
        }
    };
    let parent = root.clone();
    let slots = vec![
        Slot::not_implemented(1),
        Slot::new(1, move |args| give_out(args[0], parent())),
        Slot::new(1, move |args| give_out(args[0], root())),
    ];
    let window = standalone("nsIDOMWindow", NS_IDOMWINDOW_IID, slots)?;
    this.set(window.as_ptr());
    Ok(DomWindow::from_ptr(window))
}

/// `nsIWebProgress` slots; `GetDOMWindow` is the only one implemented.
fn web_progress_slots(get_dom_window: Slot) -> Vec<Slot> {
    vec![
        Slot::not_implemented(2),
        Slot::not_implemented(1),
        get_dom_window,
        Slot::not_implemented(1),
    ]
}

/// A `nsIDOMMouseEvent` at screen `(x, y)`
fn new_mouse_event(x: i32, y: i32) -> Result<MouseEvent> {
    // nsIDOMEvent, then nsIDOMUIEvent
    const EVENT_ARITIES: [usize; MouseEvent::GET_SCREEN_X - 3] = [1, 1, 1, 1, 1, 1, 1, 0, 0, 3, 1, 1, 5];
    let mut slots: Vec<Slot> = EVENT_ARITIES.iter().map(|&arity| Slot::not_implemented(arity)).collect();
    // SAFETY: PRInt32 out-parameters
    slots.push(Slot::new(1, move |args| unsafe { write_out(args[0], x) }));
    slots.push(Slot::new(1, move |args| unsafe { write_out(args[0], y) }));
    standalone("nsIDOMMouseEvent", NS_IDOMMOUSEEVENT_IID, slots).map(MouseEvent::from_ptr)
}

/// Native window state as set through `nsIBaseWindow`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeWindow {
    pub parent: NativeWord,
    /// x, y, width, height
    pub bounds: Option<(i32, i32, i32, i32)>,
    pub created: bool,
    pub destroyed: bool,
    pub visible: bool,
    pub focus_requests: u32,
    /// Activated through `nsIWebBrowserFocus`
    pub active: bool,
}

/// A document written through `nsIWebBrowserStream`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamedDocument {
    pub base: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub appends: usize,
}

#[derive(Default)]
struct EngineState {
    /// Host chrome (`SetContainerWindow`)
    container: Option<ComPtr>,
    /// Weak reference registered with `AddWebBrowserListener`
    progress: Option<ComPtr>,
    content_listener: Option<ComPtr>,
    /// Top-level content window, created on first request
    dom_window: Option<DomWindow>,

    history: Vec<String>,
    index: usize,
    pending: Option<String>,
    loads: Vec<String>,
    vetoed: Vec<String>,
    scripts: Vec<String>,
    reloads: u32,
    stops: u32,
    next_request: NativeWord,

    window: NativeWindow,
    stream: Option<StreamedDocument>,
    documents: Vec<StreamedDocument>,
}

impl EngineState {
    fn current(&self) -> Option<&String> {
        self.history.get(self.index)
    }
}

type Handler = fn(&LoopbackBrowser, &[NativeWord]) -> NsResult;

fn on(browser: &Weak<LoopbackBrowser>, arity: usize, handler: Handler) -> Slot {
    let browser = browser.clone();
    Slot::new(arity, move |args| match browser.upgrade() {
        Some(browser) => handler(&browser, args),
        None => NsResult::NS_ERROR_UNEXPECTED,
    })
}

/// One engine web browser
pub struct LoopbackBrowser {
    identity: Rc<ComIdentity>,
    state: RefCell<EngineState>,
    over_releases: Cell<u32>,
}

impl LoopbackBrowser {
    const WEB_BROWSER: usize = 1;
    const WEB_PROGRESS: usize = 6;

    fn new() -> Result<Rc<Self>> {
        let browser = Rc::new(Self {
            identity: ComIdentity::new("loopback-browser"),
            state: RefCell::new(EngineState {
                next_request: 0x1000,
                ..EngineState::default()
            }),
            over_releases: Cell::new(0),
        });
        browser.install()?;

        let weak = Rc::downgrade(&browser);
        browser.identity.on_teardown(move || {
            if let Some(browser) = weak.upgrade() {
                let held = {
                    let mut state = browser.state.borrow_mut();
                    (
                        state.container.take(),
                        state.progress.take(),
                        state.content_listener.take(),
                        state.dom_window.take(),
                    )
                };
                drop(held);
                tracing::debug!("loopback web browser released");
            }
        });
        Ok(browser)
    }

    /// `nsISupports` slots; `Release` also counts calls after disposal.
    fn supports_slots(self: &Rc<Self>) -> Vec<Slot> {
        let mut slots = ComIdentity::supports_slots(&Rc::downgrade(&self.identity)).to_vec();
        let weak = Rc::downgrade(self);
        slots[SLOT_RELEASE] = Slot::new(0, move |_| match weak.upgrade() {
            Some(browser) => {
                if browser.identity.is_disposed() {
                    browser.over_releases.set(browser.over_releases.get() + 1);
                }
                NsResult(browser.identity.release())
            }
            None => NsResult(0),
        });
        slots
    }

    fn install(self: &Rc<Self>) -> Result<()> {
        let weak = Rc::downgrade(self);
        let table = |name: &'static str, iid: NsIid, slots: Vec<Slot>| -> Result<usize> {
            let mut all = self.supports_slots();
            all.extend(slots);
            Ok(self.identity.add_table(&[iid], InterfaceTable::new(name, all)?))
        };

        table("nsISupports", NS_ISUPPORTS_IID, Vec::new())?;
        table(
            "nsIWebBrowser",
            NS_IWEBBROWSER_IID,
            vec![
                on(&weak, 2, Self::add_web_browser_listener),
                on(&weak, 2, Self::remove_web_browser_listener),
                on(&weak, 1, Self::get_container_window),
                on(&weak, 1, Self::set_container_window),
                on(&weak, 1, Self::get_parent_uri_content_listener),
                on(&weak, 1, Self::set_parent_uri_content_listener),
                on(&weak, 1, Self::get_content_dom_window),
            ],
        )?;
        table(
            "nsIWebNavigation",
            NS_IWEBNAVIGATION_IID,
            vec![
                on(&weak, 1, Self::get_can_go_back),
                on(&weak, 1, Self::get_can_go_forward),
                on(&weak, 0, Self::go_back),
                on(&weak, 0, Self::go_forward),
                on(&weak, 1, Self::goto_index),
                on(&weak, 5, Self::load_uri),
                on(&weak, 1, Self::reload),
                on(&weak, 1, Self::stop),
                Slot::not_implemented(1),
                on(&weak, 1, Self::get_current_uri),
            ],
        )?;
        table("nsIBaseWindow", NS_IBASEWINDOW_IID, Self::base_window_slots(&weak))?;
        table(
            "nsIWebBrowserFocus",
            NS_IWEBBROWSERFOCUS_IID,
            vec![on(&weak, 0, Self::activate), on(&weak, 0, Self::deactivate)],
        )?;
        table(
            "nsIWebBrowserStream",
            NS_IWEBBROWSERSTREAM_IID,
            vec![
                on(&weak, 2, Self::open_stream),
                on(&weak, 2, Self::append_to_stream),
                on(&weak, 0, Self::close_stream),
            ],
        )?;
        table(
            "nsIWebProgress",
            NS_IWEBPROGRESS_IID,
            web_progress_slots(on(&weak, 1, Self::get_content_dom_window)),
        )?;
        Ok(())
    }

    fn base_window_slots(weak: &Weak<Self>) -> Vec<Slot> {
        // Arity per ordinal, starting after nsISupports
        const ARITIES: [usize; BaseWindow::SLOT_COUNT - 3] =
            [6, 0, 0, 2, 2, 3, 2, 5, 4, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1, 1];
        ARITIES
            .iter()
            .enumerate()
            .map(|(i, &arity)| match i + 3 {
                BaseWindow::INIT_WINDOW => on(weak, arity, Self::init_window),
                BaseWindow::CREATE => on(weak, arity, Self::create),
                BaseWindow::DESTROY => on(weak, arity, Self::destroy),
                BaseWindow::SET_POSITION_AND_SIZE => on(weak, arity, Self::set_position_and_size),
                BaseWindow::SET_VISIBILITY => on(weak, arity, Self::base_set_visibility),
                BaseWindow::SET_FOCUS => on(weak, arity, Self::set_focus),
                _ => Slot::not_implemented(arity),
            })
            .collect()
    }

    /// `nsIWebBrowser` pointer carrying one new reference
    fn web_browser_ptr(&self) -> Option<ComPtr> {
        // SAFETY: the table is live while the identity is
        unsafe { ComPtr::from_borrowed(self.identity.table_address(Self::WEB_BROWSER)) }
    }

    // ---- nsIWebBrowser ----

    fn add_web_browser_listener(&self, args: &[NativeWord]) -> NsResult {
        // SAFETY: (nsIWeakReference*, const nsIID&)
        let Some(iid) = (unsafe { read_in::<NsIid>(args[1]) }) else {
            return NsResult::NS_ERROR_NULL_POINTER;
        };
        if iid != NS_IWEBPROGRESSLISTENER_IID {
            return NsResult::NS_ERROR_NOT_IMPLEMENTED;
        }
        // SAFETY: live weak reference from the host
        let Some(listener) = (unsafe { ComPtr::from_borrowed(args[0] as *mut c_void) }) else {
            return NsResult::NS_ERROR_NULL_POINTER;
        };
        let old = self.state.borrow_mut().progress.replace(listener);
        drop(old);
        NsResult::NS_OK
    }

    fn remove_web_browser_listener(&self, args: &[NativeWord]) -> NsResult {
        let removed = {
            let mut state = self.state.borrow_mut();
            let registered = state.progress.as_ref().map_or(false, |l| l.as_word() == args[0]);
            if registered {
                state.progress.take()
            } else {
                None
            }
        };
        match removed {
            Some(listener) => {
                drop(listener);
                NsResult::NS_OK
            }
            None => NsResult::NS_ERROR_FAILURE,
        }
    }

    fn get_container_window(&self, args: &[NativeWord]) -> NsResult {
        let container = self.state.borrow().container.clone();
        give_out(args[0], container)
    }

    fn set_container_window(&self, args: &[NativeWord]) -> NsResult {
        // SAFETY: live nsIWebBrowserChrome or null
        let container = unsafe { ComPtr::from_borrowed(args[0] as *mut c_void) };
        let old = std::mem::replace(&mut self.state.borrow_mut().container, container);
        drop(old);
        NsResult::NS_OK
    }

    fn get_parent_uri_content_listener(&self, args: &[NativeWord]) -> NsResult {
        let listener = self.state.borrow().content_listener.clone();
        give_out(args[0], listener)
    }

    fn set_parent_uri_content_listener(&self, args: &[NativeWord]) -> NsResult {
        // SAFETY: live nsIURIContentListener or null
        let listener = unsafe { ComPtr::from_borrowed(args[0] as *mut c_void) };
        let old = std::mem::replace(&mut self.state.borrow_mut().content_listener, listener);
        drop(old);
        NsResult::NS_OK
    }

    fn get_content_dom_window(&self, args: &[NativeWord]) -> NsResult {
        match self.top_window() {
            Ok(window) => give_out(args[0], Some(window.ptr().clone())),
            Err(e) => e.to_nsresult(),
        }
    }

    fn top_window(&self) -> Result<DomWindow> {
        if let Some(window) = self.state.borrow().dom_window.clone() {
            return Ok(window);
        }
        let window = new_dom_window(None)?;
        self.state.borrow_mut().dom_window = Some(window.clone());
        Ok(window)
    }

    // ---- nsIWebNavigation ----

    fn get_can_go_back(&self, args: &[NativeWord]) -> NsResult {
        let can = self.can_go_back();
        // SAFETY: PRBool out-parameter
        unsafe { write_out::<PrBool>(args[0], if can { PR_TRUE } else { PR_FALSE }) }
    }

    fn get_can_go_forward(&self, args: &[NativeWord]) -> NsResult {
        let can = self.can_go_forward();
        // SAFETY: PRBool out-parameter
        unsafe { write_out::<PrBool>(args[0], if can { PR_TRUE } else { PR_FALSE }) }
    }

    fn go_back(&self, _args: &[NativeWord]) -> NsResult {
        let index = self.state.borrow().index;
        if !self.can_go_back() {
            return NsResult::NS_ERROR_FAILURE;
        }
        self.go_to(index - 1)
    }

    fn go_forward(&self, _args: &[NativeWord]) -> NsResult {
        let index = self.state.borrow().index;
        if !self.can_go_forward() {
            return NsResult::NS_ERROR_FAILURE;
        }
        self.go_to(index + 1)
    }

    fn goto_index(&self, args: &[NativeWord]) -> NsResult {
        let index = marshal::word_to_i32(args[0]);
        match usize::try_from(index) {
            Ok(index) if index < self.state.borrow().history.len() => self.go_to(index),
            _ => NsResult::NS_ERROR_INVALID_ARG,
        }
    }

    fn go_to(&self, index: usize) -> NsResult {
        let mut state = self.state.borrow_mut();
        state.index = index;
        state.pending = state.current().cloned();
        NsResult::NS_OK
    }

    fn load_uri(&self, args: &[NativeWord]) -> NsResult {
        // SAFETY: NUL-terminated PRUnichar string
        let uri = match unsafe { marshal::wide_cstr(args[0]) } {
            Ok(uri) => uri,
            Err(e) => return e.to_nsresult(),
        };
        if let Some(script) = uri.strip_prefix(JAVASCRIPT_SCHEME) {
            self.state.borrow_mut().scripts.push(script.to_string());
            return NsResult::NS_OK;
        }
        self.state.borrow_mut().loads.push(uri.clone());

        if self.start_uri_open(&uri) == Some(true) {
            self.state.borrow_mut().vetoed.push(uri);
            return NsResult::NS_OK;
        }

        let mut state = self.state.borrow_mut();
        if !state.history.is_empty() {
            let keep = state.index + 1;
            state.history.truncate(keep);
        }
        state.history.push(uri.clone());
        state.index = state.history.len() - 1;
        state.pending = Some(uri);
        NsResult::NS_OK
    }

    fn reload(&self, _args: &[NativeWord]) -> NsResult {
        let mut state = self.state.borrow_mut();
        state.reloads += 1;
        state.pending = state.current().cloned();
        NsResult::NS_OK
    }

    fn stop(&self, _args: &[NativeWord]) -> NsResult {
        let mut state = self.state.borrow_mut();
        state.stops += 1;
        state.pending = None;
        NsResult::NS_OK
    }

    fn get_current_uri(&self, args: &[NativeWord]) -> NsResult {
        let current = self.state.borrow().current().cloned();
        let uri = match current.map(|spec| new_uri(&spec)).transpose() {
            Ok(uri) => uri,
            Err(e) => return e.to_nsresult(),
        };
        give_out(args[0], uri.map(|uri| uri.ptr().clone()))
    }

    // ---- nsIBaseWindow ----

    fn init_window(&self, args: &[NativeWord]) -> NsResult {
        let mut state = self.state.borrow_mut();
        state.window.parent = args[0];
        state.window.bounds = Some((
            marshal::word_to_i32(args[2]),
            marshal::word_to_i32(args[3]),
            marshal::word_to_i32(args[4]),
            marshal::word_to_i32(args[5]),
        ));
        NsResult::NS_OK
    }

    fn create(&self, _args: &[NativeWord]) -> NsResult {
        self.state.borrow_mut().window.created = true;
        NsResult::NS_OK
    }

    fn destroy(&self, _args: &[NativeWord]) -> NsResult {
        let container = {
            let mut state = self.state.borrow_mut();
            state.window.destroyed = true;
            state.window.visible = false;
            state.container.take()
        };
        drop(container);
        NsResult::NS_OK
    }

    fn set_position_and_size(&self, args: &[NativeWord]) -> NsResult {
        self.state.borrow_mut().window.bounds = Some((
            marshal::word_to_i32(args[0]),
            marshal::word_to_i32(args[1]),
            marshal::word_to_i32(args[2]),
            marshal::word_to_i32(args[3]),
        ));
        NsResult::NS_OK
    }

    fn base_set_visibility(&self, args: &[NativeWord]) -> NsResult {
        self.state.borrow_mut().window.visible = marshal::word_to_bool(args[0]);
        NsResult::NS_OK
    }

    fn set_focus(&self, _args: &[NativeWord]) -> NsResult {
        self.state.borrow_mut().window.focus_requests += 1;
        NsResult::NS_OK
    }

    // ---- nsIWebBrowserFocus ----

    fn activate(&self, _args: &[NativeWord]) -> NsResult {
        self.state.borrow_mut().window.active = true;
        NsResult::NS_OK
    }

    fn deactivate(&self, _args: &[NativeWord]) -> NsResult {
        self.state.borrow_mut().window.active = false;
        NsResult::NS_OK
    }

    // ---- nsIWebBrowserStream ----

    fn open_stream(&self, args: &[NativeWord]) -> NsResult {
        if self.state.borrow().stream.is_some() {
            return NsResult::NS_ERROR_UNEXPECTED;
        }
        // SAFETY: live nsIURI
        let Some(base) = (unsafe { Uri::from_borrowed(args[0]) }) else {
            return NsResult::NS_ERROR_NULL_POINTER;
        };
        // SAFETY: NUL-terminated content type
        let document = base.spec(STRINGS).and_then(|base| {
            let content_type = unsafe { marshal::utf8_cstr(args[1]) }?;
            Ok(StreamedDocument {
                base,
                content_type,
                ..StreamedDocument::default()
            })
        });
        match document {
            Ok(document) => {
                self.state.borrow_mut().stream = Some(document);
                NsResult::NS_OK
            }
            Err(e) => e.to_nsresult(),
        }
    }

    fn append_to_stream(&self, args: &[NativeWord]) -> NsResult {
        let mut state = self.state.borrow_mut();
        let Some(stream) = state.stream.as_mut() else {
            return NsResult::NS_ERROR_UNEXPECTED;
        };
        let len = marshal::word_to_u32(args[1]) as usize;
        if len > 0 {
            if args[0] == 0 {
                return NsResult::NS_ERROR_NULL_POINTER;
            }
            // SAFETY: the caller passes `len` readable bytes
            let bytes = unsafe { std::slice::from_raw_parts(args[0] as *const u8, len) };
            stream.data.extend_from_slice(bytes);
        }
        stream.appends += 1;
        NsResult::NS_OK
    }

    fn close_stream(&self, _args: &[NativeWord]) -> NsResult {
        let mut state = self.state.borrow_mut();
        match state.stream.take() {
            Some(document) => {
                state.documents.push(document);
                NsResult::NS_OK
            }
            None => NsResult::NS_ERROR_UNEXPECTED,
        }
    }

    // ---- inspection ----

    pub fn refcount(&self) -> u32 {
        self.identity.refcount()
    }

    /// The host released its last reference
    pub fn is_released(&self) -> bool {
        self.identity.is_disposed()
    }

    /// `Release` calls received after the count reached zero
    pub fn over_releases(&self) -> u32 {
        self.over_releases.get()
    }

    /// Host chrome set as container window; null when none
    pub fn chrome_ptr(&self) -> *mut c_void {
        self.state
            .borrow()
            .container
            .as_ref()
            .map_or(std::ptr::null_mut(), ComPtr::as_ptr)
    }

    pub fn has_progress_listener(&self) -> bool {
        self.state.borrow().progress.is_some()
    }

    pub fn has_content_listener(&self) -> bool {
        self.state.borrow().content_listener.is_some()
    }

    pub fn current(&self) -> Option<String> {
        self.state.borrow().current().cloned()
    }

    pub fn history(&self) -> Vec<String> {
        self.state.borrow().history.clone()
    }

    /// Every `LoadURI` except `javascript:` ones
    pub fn loads(&self) -> Vec<String> {
        self.state.borrow().loads.clone()
    }

    /// Loads the host vetoed in `OnStartURIOpen`
    pub fn vetoed(&self) -> Vec<String> {
        self.state.borrow().vetoed.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.borrow().scripts.clone()
    }

    pub fn reloads(&self) -> u32 {
        self.state.borrow().reloads
    }

    pub fn stops(&self) -> u32 {
        self.state.borrow().stops
    }

    pub fn window(&self) -> NativeWindow {
        self.state.borrow().window.clone()
    }

    pub fn documents(&self) -> Vec<StreamedDocument> {
        self.state.borrow().documents.clone()
    }

    pub fn can_go_back(&self) -> bool {
        self.state.borrow().index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        let state = self.state.borrow();
        state.index + 1 < state.history.len()
    }

    // ---- notifications to the host ----

    /// A fresh request id
    pub fn next_request(&self) -> NativeWord {
        let mut state = self.state.borrow_mut();
        state.next_request += 0x10;
        state.next_request
    }

    /// Host progress listener, resolved through its weak reference
    fn progress_listener(&self) -> Option<ComPtr> {
        let weak_reference = self.state.borrow().progress.clone()?;
        // SAFETY: nsIWeakReference::QueryReferent(const nsIID&, void**)
        unsafe {
            weak_reference.call_for_interface(
                3,
                &[iid_word(&NS_IWEBPROGRESSLISTENER_IID)],
                "nsIWeakReference::QueryReferent",
            )
        }
        .ok()
        .flatten()
    }

    /// Another interface of the host chrome
    pub fn chrome_interface(&self, iid: &NsIid) -> Option<ComPtr> {
        let container = self.state.borrow().container.clone()?;
        container.query_interface(iid).ok()
    }

    fn call_progress(&self, ordinal: usize, args: &[NativeWord]) -> NsResult {
        match self.progress_listener() {
            // SAFETY: nsIWebProgressListener slot with matching arguments
            Some(listener) => unsafe { listener.call(ordinal, args) },
            None => NsResult::NS_ERROR_NOT_INITIALIZED,
        }
    }

    fn call_chrome(&self, iid: &NsIid, ordinal: usize, args: &[NativeWord]) -> NsResult {
        match self.chrome_interface(iid) {
            // SAFETY: slot of `iid` with matching arguments
            Some(target) => unsafe { target.call(ordinal, args) },
            None => NsResult::NS_ERROR_NO_INTERFACE,
        }
    }

    fn web_progress_word(&self) -> NativeWord {
        self.identity.table_address(Self::WEB_PROGRESS) as NativeWord
    }

    /// `nsIWebProgress` of a sub-frame inside the top-level window
    fn frame_progress(&self) -> Result<WebProgress> {
        let frame = new_dom_window(Some(self.top_window()?.ptr().clone()))?;
        let get_dom_window = Slot::new(1, move |args| give_out(args[0], Some(frame.ptr().clone())));
        standalone("nsIWebProgress", NS_IWEBPROGRESS_IID, web_progress_slots(get_dom_window))
            .map(WebProgress::from_ptr)
    }

    pub fn state_change(&self, request: NativeWord, flags: u32, status: NsResult) -> NsResult {
        let args = [self.web_progress_word(), request, flags as NativeWord, status.0 as NativeWord];
        self.call_progress(3, &args)
    }

    pub fn progress_change(&self, current: i32, total: i32) -> NsResult {
        let (current, total) = (marshal::i32_to_word(current), marshal::i32_to_word(total));
        let args = [self.web_progress_word(), 0, current, total, current, total];
        self.call_progress(4, &args)
    }

    pub fn location_change(&self, request: NativeWord, location: &str) -> NsResult {
        self.notify_location(self.web_progress_word(), request, location)
    }

    /// `OnLocationChange` reported by a sub-frame of the page
    pub fn frame_location_change(&self, request: NativeWord, location: &str) -> NsResult {
        match self.frame_progress() {
            Ok(progress) => self.notify_location(progress.ptr().as_word(), request, location),
            Err(e) => e.to_nsresult(),
        }
    }

    fn notify_location(&self, web_progress: NativeWord, request: NativeWord, location: &str) -> NsResult {
        let uri = match new_uri(location) {
            Ok(uri) => uri,
            Err(e) => return e.to_nsresult(),
        };
        self.call_progress(5, &[web_progress, request, uri.ptr().as_word()])
    }

    pub fn status_change(&self, message: &str) -> NsResult {
        let message = WideString::new(message);
        self.call_progress(6, &[self.web_progress_word(), 0, 0, message.as_word()])
    }

    pub fn security_change(&self, state: u32) -> NsResult {
        self.call_progress(7, &[self.web_progress_word(), 0, state as NativeWord])
    }

    /// `nsIWebBrowserChrome::SetStatus`
    pub fn set_status(&self, text: &str) -> NsResult {
        let text = WideString::new(text);
        self.call_chrome(&NS_IWEBBROWSERCHROME_IID, 3, &[1, text.as_word()])
    }

    /// `nsIWebBrowserChrome::GetWebBrowser`, as the engine pointer it returns
    pub fn chrome_web_browser(&self) -> Option<ComPtr> {
        let chrome = self.chrome_interface(&NS_IWEBBROWSERCHROME_IID)?;
        // SAFETY: (nsIWebBrowser**)
        unsafe { chrome.call_for_interface(4, &[], "nsIWebBrowserChrome::GetWebBrowser") }
            .ok()
            .flatten()
    }

    pub fn chrome_flags(&self) -> Option<u32> {
        let chrome = self.chrome_interface(&NS_IWEBBROWSERCHROME_IID)?;
        // SAFETY: (PRUint32*)
        unsafe { chrome.call_for::<u32>(6, &[], "nsIWebBrowserChrome::GetChromeFlags") }.ok()
    }

    pub fn set_chrome_flags(&self, flags: u32) -> NsResult {
        self.call_chrome(&NS_IWEBBROWSERCHROME_IID, 7, &[flags as NativeWord])
    }

    /// `window.close()` from the page
    pub fn destroy_browser_window(&self) -> NsResult {
        self.call_chrome(&NS_IWEBBROWSERCHROME_IID, 8, &[])
    }

    pub fn size_browser_to(&self, width: i32, height: i32) -> NsResult {
        let args = [marshal::i32_to_word(width), marshal::i32_to_word(height)];
        self.call_chrome(&NS_IWEBBROWSERCHROME_IID, 9, &args)
    }

    pub fn show_as_modal(&self) -> NsResult {
        self.call_chrome(&NS_IWEBBROWSERCHROME_IID, 10, &[])
    }

    pub fn is_window_modal(&self) -> Option<bool> {
        let chrome = self.chrome_interface(&NS_IWEBBROWSERCHROME_IID)?;
        // SAFETY: (PRBool*)
        unsafe { chrome.call_for::<PrBool>(11, &[], "nsIWebBrowserChrome::IsWindowModal") }
            .ok()
            .map(|modal| modal != 0)
    }

    pub fn focus_next_element(&self) -> NsResult {
        self.call_chrome(&NS_IWEBBROWSERCHROMEFOCUS_IID, 3, &[])
    }

    pub fn focus_prev_element(&self) -> NsResult {
        self.call_chrome(&NS_IWEBBROWSERCHROMEFOCUS_IID, 4, &[])
    }

    pub fn set_dimensions(&self, flags: u32, x: i32, y: i32, width: i32, height: i32) -> NsResult {
        let args = [
            flags as NativeWord,
            marshal::i32_to_word(x),
            marshal::i32_to_word(y),
            marshal::i32_to_word(width),
            marshal::i32_to_word(height),
        ];
        self.call_chrome(&NS_IEMBEDDINGSITEWINDOW_IID, 3, &args)
    }

    /// `GetDimensions` as (x, y, width, height)
    pub fn get_dimensions(&self, flags: u32) -> Option<(i32, i32, i32, i32)> {
        let (mut x, mut y, mut width, mut height) = (0i32, 0i32, 0i32, 0i32);
        let args = [
            flags as NativeWord,
            &mut x as *mut i32 as NativeWord,
            &mut y as *mut i32 as NativeWord,
            &mut width as *mut i32 as NativeWord,
            &mut height as *mut i32 as NativeWord,
        ];
        let rc = self.call_chrome(&NS_IEMBEDDINGSITEWINDOW_IID, 4, &args);
        rc.succeeded().then_some((x, y, width, height))
    }

    pub fn site_set_focus(&self) -> NsResult {
        self.call_chrome(&NS_IEMBEDDINGSITEWINDOW_IID, 5, &[])
    }

    pub fn get_visibility(&self) -> Option<bool> {
        let site = self.chrome_interface(&NS_IEMBEDDINGSITEWINDOW_IID)?;
        // SAFETY: (PRBool*)
        unsafe { site.call_for::<PrBool>(6, &[], "nsIEmbeddingSiteWindow::GetVisibility") }
            .ok()
            .map(|visible| visible != 0)
    }

    pub fn set_visibility(&self, visible: bool) -> NsResult {
        self.call_chrome(&NS_IEMBEDDINGSITEWINDOW_IID, 7, &[marshal::bool_to_word(visible)])
    }

    pub fn set_title(&self, title: &str) -> NsResult {
        let title = WideString::new(title);
        self.call_chrome(&NS_IEMBEDDINGSITEWINDOW_IID, 9, &[title.as_word()])
    }

    pub fn site_window(&self) -> Option<NativeWord> {
        let site = self.chrome_interface(&NS_IEMBEDDINGSITEWINDOW_IID)?;
        // SAFETY: (void**)
        unsafe { site.call_for::<NativeWord>(10, &[], "nsIEmbeddingSiteWindow::GetSiteWindow") }.ok()
    }

    /// `nsIInterfaceRequestor::GetInterface` on the host chrome
    pub fn get_interface(&self, iid: &NsIid) -> Option<ComPtr> {
        let requestor = self.chrome_interface(&NS_IINTERFACEREQUESTOR_IID)?;
        // SAFETY: (const nsIID&, void**)
        unsafe { requestor.call_for_interface(3, &[iid_word(iid)], "nsIInterfaceRequestor::GetInterface") }
            .ok()
            .flatten()
    }

    /// `nsISupportsWeakReference::GetWeakReference` on the host chrome
    pub fn get_weak_reference(&self) -> Option<ComPtr> {
        let source = self.chrome_interface(&NS_ISUPPORTSWEAKREFERENCE_IID)?;
        // SAFETY: (nsIWeakReference**)
        unsafe { source.call_for_interface(3, &[], "nsISupportsWeakReference::GetWeakReference") }
            .ok()
            .flatten()
    }

    /// `OnStartURIOpen`; `Some(true)` when the host vetoed the load.
    pub fn start_uri_open(&self, location: &str) -> Option<bool> {
        let listener = self.state.borrow().content_listener.clone()?;
        let uri = new_uri(location).ok()?;
        let mut abort: PrBool = PR_FALSE;
        // SAFETY: (nsIURI*, PRBool*)
        let rc = unsafe { listener.call(3, &[uri.ptr().as_word(), &mut abort as *mut PrBool as NativeWord]) };
        rc.succeeded().then_some(abort != 0)
    }

    /// `IsPreferred`; `None` when the call failed
    pub fn is_preferred(&self, content_type: &str) -> Option<bool> {
        let listener = self.state.borrow().content_listener.clone()?;
        let content_type = CString::new(content_type).ok()?;
        let mut desired: NativeWord = 0;
        let mut preferred: PrBool = PR_FALSE;
        let args = [
            content_type.as_ptr() as NativeWord,
            &mut desired as *mut NativeWord as NativeWord,
            &mut preferred as *mut PrBool as NativeWord,
        ];
        // SAFETY: (const char*, char**, PRBool*)
        let rc = unsafe { listener.call(5, &args) };
        rc.succeeded().then_some(preferred != 0)
    }

    /// Any other `nsIURIContentListener` slot, with null arguments
    pub fn content_listener_call(&self, ordinal: usize, arity: usize) -> NsResult {
        let Some(listener) = self.state.borrow().content_listener.clone() else {
            return NsResult::NS_ERROR_NOT_INITIALIZED;
        };
        let args = vec![0; arity];
        // SAFETY: callee treats null arguments as absent
        unsafe { listener.call(ordinal, &args) }
    }

    pub fn show_tooltip(&self, x: i32, y: i32, text: &str) -> NsResult {
        let text = WideString::new(text);
        let args = [marshal::i32_to_word(x), marshal::i32_to_word(y), text.as_word()];
        self.call_chrome(&NS_ITOOLTIPLISTENER_IID, 3, &args)
    }

    pub fn hide_tooltip(&self) -> NsResult {
        self.call_chrome(&NS_ITOOLTIPLISTENER_IID, 4, &[])
    }

    /// Right click on the document at screen `(x, y)`
    pub fn show_context_menu(&self, x: i32, y: i32) -> NsResult {
        match new_mouse_event(x, y) {
            Ok(event) => self.show_context_menu_for(event.ptr()),
            Err(e) => e.to_nsresult(),
        }
    }

    /// `OnShowContextMenu` carrying `event` as the DOM event
    pub fn show_context_menu_for(&self, event: &ComPtr) -> NsResult {
        self.call_chrome(&NS_ICONTEXTMENULISTENER_IID, 3, &[CONTEXT_DOCUMENT, event.as_word(), 0])
    }

    /// Emit the notifications of the committed navigation, as the engine
    /// does from its event loop. Returns false when nothing was pending.
    pub fn pump(&self) -> bool {
        let Some(location) = self.state.borrow_mut().pending.take() else {
            return false;
        };
        let request = self.next_request();
        let document = STATE_IS_REQUEST | STATE_IS_DOCUMENT | STATE_IS_NETWORK | STATE_IS_WINDOW;

        self.state_change(request, STATE_START | document, NsResult::NS_OK);
        self.location_change(request, &location);
        self.status_change(&format!("Loading {}", location));
        self.progress_change(50, 100);
        self.progress_change(100, 100);
        self.state_change(request, STATE_STOP | document, NsResult::NS_OK);
        true
    }
}

/// Write an interface out-parameter, moving one reference to the caller.
fn give_out(out: NativeWord, value: Option<ComPtr>) -> NsResult {
    let raw = value.map_or(std::ptr::null_mut(), ComPtr::into_raw);
    // SAFETY: interface out-parameter
    let rc = unsafe { write_out(out, raw) };
    if rc.failed() && !raw.is_null() {
        // SAFETY: adopt back the reference nobody received
        drop(unsafe { ComPtr::from_raw(raw) });
    }
    rc
}

impl fmt::Debug for LoopbackBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LoopbackBrowser")
            .field("refcount", &self.identity.refcount())
            .field("current", &state.current())
            .field("window", &state.window)
            .finish()
    }
}

/// In-process embedding library
#[derive(Default)]
pub struct LoopbackLibrary {
    init_status: Cell<NsResult>,
    initialized: Cell<bool>,
    init_calls: Cell<u32>,
    term_calls: Cell<u32>,
    gre_path: RefCell<Option<PathBuf>>,
    window_creator: RefCell<Option<ComPtr>>,
    browsers: RefCell<Vec<Rc<LoopbackBrowser>>>,
}

impl LoopbackLibrary {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Make the next `init_embedding` fail with `rc`.
    pub fn fail_init_with(&self, rc: NsResult) {
        self.init_status.set(rc);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls.get()
    }

    pub fn term_calls(&self) -> u32 {
        self.term_calls.get()
    }

    pub fn gre_path(&self) -> Option<PathBuf> {
        self.gre_path.borrow().clone()
    }

    pub fn has_window_creator(&self) -> bool {
        self.window_creator.borrow().is_some()
    }

    /// Another reference to the registered window creator
    pub fn window_creator(&self) -> Option<ComPtr> {
        self.window_creator.borrow().clone()
    }

    /// Every web browser created so far, including released ones
    pub fn browsers(&self) -> Vec<Rc<LoopbackBrowser>> {
        self.browsers.borrow().clone()
    }

    pub fn last_browser(&self) -> Option<Rc<LoopbackBrowser>> {
        self.browsers.borrow().last().cloned()
    }

    /// The web browser whose container is `chrome`
    pub fn browser_for_chrome(&self, chrome: *mut c_void) -> Option<Rc<LoopbackBrowser>> {
        if chrome.is_null() {
            return None;
        }
        self.browsers
            .borrow()
            .iter()
            .find(|b| b.chrome_ptr() == chrome)
            .cloned()
    }

    /// Pump every browser until no navigation is pending.
    pub fn pump_all(&self) -> usize {
        let mut emitted = 0;
        loop {
            let browsers = self.browsers();
            let round = browsers.iter().filter(|b| b.pump()).count();
            if round == 0 {
                return emitted;
            }
            emitted += round;
        }
    }

    /// `window.open` from a page in `parent`: ask the host's window creator
    /// for a chrome. Returns the status and the chrome it handed over.
    pub fn open_window(&self, parent: &LoopbackBrowser, flags: u32) -> (NsResult, Option<ComPtr>) {
        let Some(creator) = self.window_creator.borrow().clone() else {
            return (NsResult::NS_ERROR_NOT_INITIALIZED, None);
        };
        let mut out: *mut c_void = std::ptr::null_mut();
        let args = [
            parent.chrome_ptr() as NativeWord,
            flags as NativeWord,
            &mut out as *mut *mut c_void as NativeWord,
        ];
        // SAFETY: nsIWindowCreator::CreateChromeWindow(parent, flags, retval)
        let rc = unsafe { creator.call(3, &args) };
        // SAFETY: a returned chrome carries one reference
        (rc, unsafe { ComPtr::from_raw(out) })
    }
}

impl EmbeddingLibrary for LoopbackLibrary {
    fn init_embedding(&self, gre_path: Option<&Path>) -> NsResult {
        self.init_calls.set(self.init_calls.get() + 1);
        *self.gre_path.borrow_mut() = gre_path.map(Path::to_path_buf);
        let rc = self.init_status.replace(NsResult::NS_OK);
        if rc.succeeded() {
            self.initialized.set(true);
        }
        rc
    }

    fn term_embedding(&self) -> NsResult {
        self.term_calls.set(self.term_calls.get() + 1);
        if !self.initialized.replace(false) {
            return NsResult::NS_ERROR_NOT_INITIALIZED;
        }
        NsResult::NS_OK
    }

    fn set_window_creator(&self, creator: *mut c_void) -> NsResult {
        // SAFETY: live nsIWindowCreator or null
        let creator = unsafe { ComPtr::from_borrowed(creator) };
        let old = std::mem::replace(&mut *self.window_creator.borrow_mut(), creator);
        drop(old);
        NsResult::NS_OK
    }

    fn cstring_api(&self) -> CStringApi {
        STRINGS
    }

    fn create_web_browser(&self) -> Result<ComPtr> {
        if !self.initialized.get() {
            return Err(XpcomError::Native {
                code: NsResult::NS_ERROR_NOT_INITIALIZED,
                context: "CreateInstance",
            });
        }
        let browser = LoopbackBrowser::new()?;
        let ptr = browser.web_browser_ptr().ok_or(XpcomError::Disposed)?;
        // Hand the construction reference over with the pointer
        browser.identity.release();
        self.browsers.borrow_mut().push(browser);
        Ok(ptr)
    }
}

impl fmt::Debug for LoopbackLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackLibrary")
            .field("initialized", &self.initialized.get())
            .field("browsers", &self.browsers.borrow().len())
            .finish()
    }
}
