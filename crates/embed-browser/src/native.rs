//! Native engine interfaces
//!
//! Typed views over interface pointers the engine hands to the host. Each
//! wrapper owns one reference through [`ComPtr`] and knows its slot
//! ordinals; slot 0-2 are always `nsISupports`.

use std::ffi::c_void;

use embed_xpcom::marshal::{self, CStringApi, EmbedCString, NarrowString, PrBool, WideString};
use embed_xpcom::{
    ComPtr, NativeWord, NsIid, Result, XpcomError, NS_IBASEWINDOW_IID, NS_IDOMMOUSEEVENT_IID, NS_IDOMWINDOW_IID,
    NS_IURI_IID, NS_IWEBBROWSERFOCUS_IID, NS_IWEBBROWSERSTREAM_IID, NS_IWEBBROWSER_IID, NS_IWEBNAVIGATION_IID,
    NS_IWEBPROGRESS_IID,
};

/// An interface the host can acquire from an engine object.
pub trait NativeInterface: Sized {
    const IID: NsIid;
    const NAME: &'static str;

    /// Wrap a pointer already known to implement this interface.
    fn from_ptr(ptr: ComPtr) -> Self;

    fn ptr(&self) -> &ComPtr;

    /// `QueryInterface` another engine object for this interface.
    fn query(from: &ComPtr) -> Result<Self> {
        from.query_interface(&Self::IID).map(Self::from_ptr)
    }
}

macro_rules! native_interface {
    ($ty:ident, $iid:expr, $name:literal) => {
        #[derive(Debug, Clone)]
        pub struct $ty(ComPtr);

        impl NativeInterface for $ty {
            const IID: NsIid = $iid;
            const NAME: &'static str = $name;

            fn from_ptr(ptr: ComPtr) -> Self {
                Self(ptr)
            }

            fn ptr(&self) -> &ComPtr {
                &self.0
            }
        }
    };
}

native_interface!(WebBrowser, NS_IWEBBROWSER_IID, "nsIWebBrowser");
native_interface!(WebNavigation, NS_IWEBNAVIGATION_IID, "nsIWebNavigation");
native_interface!(BaseWindow, NS_IBASEWINDOW_IID, "nsIBaseWindow");
native_interface!(WebBrowserFocus, NS_IWEBBROWSERFOCUS_IID, "nsIWebBrowserFocus");
native_interface!(WebBrowserStream, NS_IWEBBROWSERSTREAM_IID, "nsIWebBrowserStream");
native_interface!(Uri, NS_IURI_IID, "nsIURI");
native_interface!(WebProgress, NS_IWEBPROGRESS_IID, "nsIWebProgress");
native_interface!(DomWindow, NS_IDOMWINDOW_IID, "nsIDOMWindow");
native_interface!(MouseEvent, NS_IDOMMOUSEEVENT_IID, "nsIDOMMouseEvent");

fn word(ptr: *mut c_void) -> NativeWord {
    ptr as NativeWord
}

impl WebBrowser {
    pub const ADD_WEB_BROWSER_LISTENER: usize = 3;
    pub const REMOVE_WEB_BROWSER_LISTENER: usize = 4;
    pub const GET_CONTAINER_WINDOW: usize = 5;
    pub const SET_CONTAINER_WINDOW: usize = 6;
    pub const GET_PARENT_URI_CONTENT_LISTENER: usize = 7;
    pub const SET_PARENT_URI_CONTENT_LISTENER: usize = 8;
    pub const GET_CONTENT_DOM_WINDOW: usize = 9;

    pub fn add_web_browser_listener(&self, listener: *mut c_void, iid: &NsIid) -> Result<()> {
        // SAFETY: (nsIWeakReference*, const nsIID&)
        unsafe {
            self.0.call(
                Self::ADD_WEB_BROWSER_LISTENER,
                &[word(listener), iid as *const NsIid as NativeWord],
            )
        }
        .check("nsIWebBrowser::AddWebBrowserListener")
    }

    pub fn remove_web_browser_listener(&self, listener: *mut c_void, iid: &NsIid) -> Result<()> {
        // SAFETY: (nsIWeakReference*, const nsIID&)
        unsafe {
            self.0.call(
                Self::REMOVE_WEB_BROWSER_LISTENER,
                &[word(listener), iid as *const NsIid as NativeWord],
            )
        }
        .check("nsIWebBrowser::RemoveWebBrowserListener")
    }

    pub fn set_container_window(&self, chrome: *mut c_void) -> Result<()> {
        // SAFETY: (nsIWebBrowserChrome*)
        unsafe { self.0.call(Self::SET_CONTAINER_WINDOW, &[word(chrome)]) }
            .check("nsIWebBrowser::SetContainerWindow")
    }

    pub fn set_parent_uri_content_listener(&self, listener: *mut c_void) -> Result<()> {
        // SAFETY: (nsIURIContentListener*)
        unsafe { self.0.call(Self::SET_PARENT_URI_CONTENT_LISTENER, &[word(listener)]) }
            .check("nsIWebBrowser::SetParentURIContentListener")
    }

    /// Top-level DOM window of the content, with one reference
    pub fn content_dom_window(&self) -> Result<Option<ComPtr>> {
        // SAFETY: (nsIDOMWindow**)
        unsafe {
            self.0.call_for_interface(
                Self::GET_CONTENT_DOM_WINDOW,
                &[],
                "nsIWebBrowser::GetContentDOMWindow",
            )
        }
    }
}

impl WebNavigation {
    pub const GET_CAN_GO_BACK: usize = 3;
    pub const GET_CAN_GO_FORWARD: usize = 4;
    pub const GO_BACK: usize = 5;
    pub const GO_FORWARD: usize = 6;
    pub const GOTO_INDEX: usize = 7;
    pub const LOAD_URI: usize = 8;
    pub const RELOAD: usize = 9;
    pub const STOP: usize = 10;
    pub const GET_DOCUMENT: usize = 11;
    pub const GET_CURRENT_URI: usize = 12;

    pub const LOAD_FLAGS_NONE: u32 = 0;
    pub const STOP_ALL: u32 = 3;

    pub fn can_go_back(&self) -> Result<bool> {
        // SAFETY: (PRBool*)
        let value: PrBool =
            unsafe { self.0.call_for(Self::GET_CAN_GO_BACK, &[], "nsIWebNavigation::GetCanGoBack") }?;
        Ok(value != 0)
    }

    pub fn can_go_forward(&self) -> Result<bool> {
        // SAFETY: (PRBool*)
        let value: PrBool = unsafe {
            self.0
                .call_for(Self::GET_CAN_GO_FORWARD, &[], "nsIWebNavigation::GetCanGoForward")
        }?;
        Ok(value != 0)
    }

    pub fn go_back(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::GO_BACK, &[]) }.check("nsIWebNavigation::GoBack")
    }

    pub fn go_forward(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::GO_FORWARD, &[]) }.check("nsIWebNavigation::GoForward")
    }

    /// Navigate; no referrer, post data or extra headers.
    pub fn load_uri(&self, uri: &str, flags: u32) -> Result<()> {
        let wide = WideString::new(uri);
        // SAFETY: (const PRUnichar*, PRUint32, nsIURI*, nsIInputStream*, nsIInputStream*);
        // `wide` outlives the call
        unsafe {
            self.0
                .call(Self::LOAD_URI, &[wide.as_word(), flags as NativeWord, 0, 0, 0])
        }
        .check("nsIWebNavigation::LoadURI")
    }

    pub fn reload(&self, flags: u32) -> Result<()> {
        // SAFETY: (PRUint32)
        unsafe { self.0.call(Self::RELOAD, &[flags as NativeWord]) }.check("nsIWebNavigation::Reload")
    }

    pub fn stop(&self, flags: u32) -> Result<()> {
        // SAFETY: (PRUint32)
        unsafe { self.0.call(Self::STOP, &[flags as NativeWord]) }.check("nsIWebNavigation::Stop")
    }

    pub fn current_uri(&self) -> Result<Option<Uri>> {
        // SAFETY: (nsIURI**)
        let uri = unsafe {
            self.0
                .call_for_interface(Self::GET_CURRENT_URI, &[], "nsIWebNavigation::GetCurrentURI")
        }?;
        Ok(uri.map(Uri::from_ptr))
    }
}

impl BaseWindow {
    pub const INIT_WINDOW: usize = 3;
    pub const CREATE: usize = 4;
    pub const DESTROY: usize = 5;
    pub const SET_POSITION_AND_SIZE: usize = 10;
    pub const SET_VISIBILITY: usize = 18;
    pub const SET_FOCUS: usize = 24;

    /// Slots including `nsISupports`
    pub const SLOT_COUNT: usize = 27;

    pub fn init_window(&self, parent: NativeWord, x: i32, y: i32, cx: i32, cy: i32) -> Result<()> {
        let args = [
            parent,
            0,
            marshal::i32_to_word(x),
            marshal::i32_to_word(y),
            marshal::i32_to_word(cx),
            marshal::i32_to_word(cy),
        ];
        // SAFETY: (nativeWindow, nsIWidget*, PRInt32 x4)
        unsafe { self.0.call(Self::INIT_WINDOW, &args) }.check("nsIBaseWindow::InitWindow")
    }

    pub fn create(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::CREATE, &[]) }.check("nsIBaseWindow::Create")
    }

    pub fn destroy(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::DESTROY, &[]) }.check("nsIBaseWindow::Destroy")
    }

    pub fn set_position_and_size(&self, x: i32, y: i32, cx: i32, cy: i32, repaint: bool) -> Result<()> {
        let args = [
            marshal::i32_to_word(x),
            marshal::i32_to_word(y),
            marshal::i32_to_word(cx),
            marshal::i32_to_word(cy),
            marshal::bool_to_word(repaint),
        ];
        // SAFETY: (PRInt32 x4, PRBool)
        unsafe { self.0.call(Self::SET_POSITION_AND_SIZE, &args) }
            .check("nsIBaseWindow::SetPositionAndSize")
    }

    pub fn set_focus(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::SET_FOCUS, &[]) }.check("nsIBaseWindow::SetFocus")
    }

    pub fn set_visibility(&self, visible: bool) -> Result<()> {
        // SAFETY: (PRBool)
        unsafe { self.0.call(Self::SET_VISIBILITY, &[marshal::bool_to_word(visible)]) }
            .check("nsIBaseWindow::SetVisibility")
    }
}

impl WebBrowserFocus {
    pub const ACTIVATE: usize = 3;
    pub const DEACTIVATE: usize = 4;

    pub fn activate(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::ACTIVATE, &[]) }.check("nsIWebBrowserFocus::Activate")
    }

    pub fn deactivate(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::DEACTIVATE, &[]) }.check("nsIWebBrowserFocus::Deactivate")
    }
}

impl WebBrowserStream {
    pub const OPEN_STREAM: usize = 3;
    pub const APPEND_TO_STREAM: usize = 4;
    pub const CLOSE_STREAM: usize = 5;

    /// Bytes handed to the engine per `AppendToStream`
    pub const PAGE_SIZE: usize = 8192;

    pub fn open_stream(&self, base_uri: &Uri, content_type: &str) -> Result<()> {
        let content_type = NarrowString::new(content_type)?;
        // SAFETY: (nsIURI*, const char*); `content_type` outlives the call
        unsafe {
            self.0
                .call(Self::OPEN_STREAM, &[base_uri.ptr().as_word(), content_type.as_word()])
        }
        .check("nsIWebBrowserStream::OpenStream")
    }

    /// Append `data` in [`Self::PAGE_SIZE`] chunks.
    pub fn append(&self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(Self::PAGE_SIZE) {
            // SAFETY: (const PRUint8*, PRUint32); `chunk` outlives the call
            unsafe {
                self.0.call(
                    Self::APPEND_TO_STREAM,
                    &[chunk.as_ptr() as NativeWord, chunk.len() as NativeWord],
                )
            }
            .check("nsIWebBrowserStream::AppendToStream")?;
        }
        Ok(())
    }

    pub fn close_stream(&self) -> Result<()> {
        // SAFETY: no arguments
        unsafe { self.0.call(Self::CLOSE_STREAM, &[]) }.check("nsIWebBrowserStream::CloseStream")
    }
}

impl Uri {
    pub const GET_SPEC: usize = 3;

    /// Adopt a borrowed `nsIURI*` argument of a native callback.
    ///
    /// # Safety
    /// `raw` must be zero or a live `nsIURI` pointer.
    pub unsafe fn from_borrowed(raw: NativeWord) -> Option<Self> {
        ComPtr::from_borrowed(raw as *mut c_void).map(Self)
    }

    /// The URI as a UTF-8 string, read through the engine's string glue
    pub fn spec(&self, strings: CStringApi) -> Result<String> {
        let mut spec = EmbedCString::new(strings)?;
        // SAFETY: (nsACString&); `spec` outlives the call
        unsafe { self.0.call(Self::GET_SPEC, &[spec.as_word()]) }.check("nsIURI::GetSpec")?;
        spec.value()
    }
}

impl WebProgress {
    pub const ADD_PROGRESS_LISTENER: usize = 3;
    pub const REMOVE_PROGRESS_LISTENER: usize = 4;
    pub const GET_DOM_WINDOW: usize = 5;
    pub const GET_IS_LOADING_DOCUMENT: usize = 6;

    /// # Safety
    /// `raw` must be zero or a live `nsIWebProgress` pointer.
    pub unsafe fn from_borrowed(raw: NativeWord) -> Option<Self> {
        ComPtr::from_borrowed(raw as *mut c_void).map(Self)
    }

    /// Window whose loads this progress reports. Null is an error.
    pub fn dom_window(&self) -> Result<DomWindow> {
        // SAFETY: (nsIDOMWindow**)
        let window = unsafe {
            self.0
                .call_for_interface(Self::GET_DOM_WINDOW, &[], "nsIWebProgress::GetDOMWindow")
        }?;
        window
            .map(DomWindow::from_ptr)
            .ok_or(XpcomError::NoInterface(NS_IDOMWINDOW_IID))
    }
}

impl DomWindow {
    pub const GET_DOCUMENT: usize = 3;
    pub const GET_PARENT: usize = 4;
    pub const GET_TOP: usize = 5;

    /// Root window of this window's frame tree. Null is an error.
    pub fn top(&self) -> Result<DomWindow> {
        // SAFETY: (nsIDOMWindow**)
        let top = unsafe { self.0.call_for_interface(Self::GET_TOP, &[], "nsIDOMWindow::GetTop") }?;
        top.map(DomWindow::from_ptr)
            .ok_or(XpcomError::NoInterface(NS_IDOMWINDOW_IID))
    }

    /// Same native object as `other`
    pub fn is_same(&self, other: &DomWindow) -> bool {
        self.0.as_ptr() == other.0.as_ptr()
    }
}

impl MouseEvent {
    // nsIDOMEvent 3-12, nsIDOMUIEvent 13-15
    pub const GET_SCREEN_X: usize = 16;
    pub const GET_SCREEN_Y: usize = 17;

    /// Screen coordinates of the event
    pub fn screen(&self) -> Result<(i32, i32)> {
        // SAFETY: (PRInt32*)
        let x: i32 = unsafe { self.0.call_for(Self::GET_SCREEN_X, &[], "nsIDOMMouseEvent::GetScreenX") }?;
        // SAFETY: (PRInt32*)
        let y: i32 = unsafe { self.0.call_for(Self::GET_SCREEN_Y, &[], "nsIDOMMouseEvent::GetScreenY") }?;
        Ok((x, y))
    }
}
