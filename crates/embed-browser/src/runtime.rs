//! Embedding Runtime
//!
//! One-time engine bootstrap, the registry of live browsers and the host's
//! `nsIWindowCreator`.

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use embed_xpcom::marshal::{self, write_out};
use embed_xpcom::{
    ComIdentity, InterfaceTable, NativeWord, NsResult, Slot, NS_ISUPPORTS_IID,
    NS_IWEBBROWSERCHROME_IID, NS_IWINDOWCREATOR_IID,
};

use crate::browser::{Browser, BrowserCore};
use crate::config::EmbedConfig;
use crate::error::{BrowserError, Result};
use crate::events::WindowEvent;
use crate::idle::IdleQueue;
use crate::library::EmbeddingLibrary;

/// Set while an engine is initialized in this process
static INITIALIZED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static CURRENT: RefCell<Weak<RuntimeInner>> = RefCell::new(Weak::new());
}

/// `nsIWindowCreator::CreateChromeWindow`
const CREATE_CHROME_WINDOW: usize = 3;

/// Registration of one live browser. Never reused within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Handle(u64);

/// Live entries in registration order
struct Registry<T> {
    last: u64,
    entries: Vec<(Handle, T)>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            last: 0,
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> Handle {
        self.last += 1;
        let handle = Handle(self.last);
        self.entries.push((handle, value));
        handle
    }

    /// Stale handles return `None`
    fn remove(&mut self, handle: Handle) -> Option<T> {
        let position = self.entries.iter().position(|(h, _)| *h == handle)?;
        Some(self.entries.remove(position).1)
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, value)| value)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct RuntimeInner {
    library: Rc<dyn EmbeddingLibrary>,
    config: EmbedConfig,
    browsers: RefCell<Registry<Rc<BrowserCore>>>,
    idle: IdleQueue,
    window_creator: RefCell<Option<Rc<ComIdentity>>>,
}

/// Handle to the initialized embedding engine.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Initialize the engine. Fails if an engine is already initialized.
    pub fn init(library: Rc<dyn EmbeddingLibrary>, config: EmbedConfig) -> Result<Runtime> {
        if INITIALIZED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BrowserError::AlreadyInitialized);
        }

        tracing::info!(gre_path = ?config.gre_path, "initializing embedding engine");
        if let Err(e) = library.init_embedding(config.gre_path.as_deref()).check("InitEmbedding") {
            INITIALIZED.store(false, Ordering::Release);
            return Err(e.into());
        }

        let inner = Rc::new(RuntimeInner {
            library,
            config,
            browsers: RefCell::new(Registry::new()),
            idle: IdleQueue::new(),
            window_creator: RefCell::new(None),
        });
        let runtime = Runtime { inner };

        if let Err(e) = runtime.install_window_creator() {
            runtime.library().term_embedding();
            INITIALIZED.store(false, Ordering::Release);
            return Err(e);
        }
        CURRENT.with(|current| *current.borrow_mut() = Rc::downgrade(&runtime.inner));
        Ok(runtime)
    }

    /// The runtime initialized on this thread
    pub fn current() -> Result<Runtime> {
        CURRENT
            .with(|current| current.borrow().upgrade())
            .map(|inner| Runtime { inner })
            .ok_or(BrowserError::NotInitialized)
    }

    pub fn is_initialized() -> bool {
        INITIALIZED.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.inner.config
    }

    pub fn idle(&self) -> &IdleQueue {
        &self.inner.idle
    }

    /// Run deferred work; the host calls this from its event loop.
    pub fn run_pending(&self) -> usize {
        self.inner.idle.run_pending()
    }

    /// Browsers whose native objects are still referenced
    pub fn browser_count(&self) -> usize {
        self.inner.browsers.borrow().len()
    }

    pub fn browsers(&self) -> Vec<Browser> {
        self.inner
            .browsers
            .borrow()
            .values()
            .map(|core| Browser::from_core(core.clone()))
            .collect()
    }

    /// Dispose every live browser.
    pub fn dispose_all(&self) {
        for browser in self.browsers() {
            browser.dispose();
        }
    }

    /// Shut the engine down. Refused while browsers are alive.
    pub fn shutdown(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let live = self.browser_count();
        if live > 0 {
            return Err(BrowserError::BrowsersAlive(live));
        }
        self.teardown();
        Ok(())
    }

    pub(crate) fn library(&self) -> &Rc<dyn EmbeddingLibrary> {
        &self.inner.library
    }

    pub(crate) fn is_active(&self) -> bool {
        self.inner.window_creator.borrow().is_some()
    }

    pub(crate) fn register(&self, core: Rc<BrowserCore>) -> Handle {
        self.inner.browsers.borrow_mut().insert(core)
    }

    pub(crate) fn unregister(&self, handle: Handle) {
        let removed = self.inner.browsers.borrow_mut().remove(handle);
        drop(removed);
    }

    /// Browser whose chrome (or any other table) is at `ptr`
    pub(crate) fn find_by_address(&self, ptr: *const c_void) -> Option<Rc<BrowserCore>> {
        if ptr.is_null() {
            return None;
        }
        self.inner
            .browsers
            .borrow()
            .values()
            .find(|core| core.owns(ptr))
            .cloned()
    }

    fn install_window_creator(&self) -> Result<()> {
        let identity = ComIdentity::new("window-creator");
        let weak = Rc::downgrade(&identity);
        let runtime = Rc::downgrade(&self.inner);

        let supports = InterfaceTable::new("nsISupports", ComIdentity::supports_slots(&weak).to_vec())?;
        identity.add_table(&[NS_ISUPPORTS_IID], supports);

        let mut slots = ComIdentity::supports_slots(&weak).to_vec();
        slots.push(Slot::new(3, move |args| match runtime.upgrade() {
            Some(inner) => Runtime { inner }.create_chrome_window(args[0], marshal::word_to_u32(args[1]), args[2]),
            None => NsResult::NS_ERROR_NOT_INITIALIZED,
        }));
        let creator = InterfaceTable::new("nsIWindowCreator", slots)?;
        let index = identity.add_table(&[NS_IWINDOWCREATOR_IID], creator);

        // Outlives the runtime while the engine still holds a reference
        let keep_alive = identity.clone();
        identity.on_teardown(move || drop(keep_alive));

        let rc = self.inner.library.set_window_creator(identity.table_address(index));
        if let Err(e) = rc.check("SetWindowCreator") {
            identity.dispose_now();
            return Err(e.into());
        }
        *self.inner.window_creator.borrow_mut() = Some(identity);
        Ok(())
    }

    /// A page asked for a new window. Open-window listeners of the parent
    /// browser supply the browser that hosts it.
    fn create_chrome_window(&self, parent: NativeWord, flags: u32, retval: NativeWord) -> NsResult {
        tracing::trace!(slot = CREATE_CHROME_WINDOW, parent, flags, "CreateChromeWindow");
        if retval == 0 {
            return NsResult::NS_ERROR_NULL_POINTER;
        }
        if !self.is_active() {
            // SAFETY: retval checked non-null; native passes an nsIWebBrowserChrome**
            unsafe { write_out(retval, std::ptr::null_mut::<c_void>()) };
            return NsResult::NS_ERROR_NOT_INITIALIZED;
        }
        let Some(parent) = self.find_by_address(parent as *const c_void) else {
            tracing::debug!("CreateChromeWindow without a known parent browser");
            // SAFETY: retval checked non-null; native passes an nsIWebBrowserChrome**
            unsafe { write_out(retval, std::ptr::null_mut::<c_void>()) };
            return NsResult::NS_ERROR_NOT_IMPLEMENTED;
        };

        let mut event = WindowEvent::with_chrome_flags(flags);
        event.required = true;
        parent.listeners.open_window.notify(|l| l.open(&mut event));

        let child = event
            .browser
            .take()
            .filter(|b| !b.is_disposed() && !b.is_same_core(&parent));
        let chrome = child.and_then(|child| {
            child.core().become_child(flags);
            child.core().identity.query(&NS_IWEBBROWSERCHROME_IID).ok()
        });

        match chrome {
            // SAFETY: retval checked non-null; the reference taken above moves to the caller
            Some(address) => unsafe { write_out(retval, address) },
            None => {
                // SAFETY: as above
                unsafe { write_out(retval, std::ptr::null_mut::<c_void>()) };
                NsResult::NS_ERROR_NOT_IMPLEMENTED
            }
        }
    }

    fn teardown(&self) {
        self.inner.teardown();
    }
}

impl RuntimeInner {
    fn teardown(&self) {
        self.idle.clear();
        let Some(creator) = self.window_creator.borrow_mut().take() else {
            return;
        };
        let rc = self.library.set_window_creator(std::ptr::null_mut());
        if rc.failed() {
            tracing::warn!(%rc, "unregistering window creator failed");
        }
        creator.release();

        let rc = self.library.term_embedding();
        if rc.failed() {
            tracing::warn!(%rc, "TermEmbedding failed");
        }
        // The thread-local may already be gone when dropped at thread exit
        let _ = CURRENT.try_with(|current| {
            let mut current = current.borrow_mut();
            if std::ptr::eq(current.as_ptr(), self) || current.strong_count() == 0 {
                *current = Weak::new();
            }
        });
        INITIALIZED.store(false, Ordering::Release);
        tracing::info!("embedding engine shut down");
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        if self.window_creator.borrow().is_some() {
            tracing::warn!("runtime dropped without shutdown");
            self.teardown();
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("active", &self.is_active())
            .field("browsers", &self.browser_count())
            .field("idle", &self.inner.idle)
            .finish()
    }
}
