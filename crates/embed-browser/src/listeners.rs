//! Listener Registries
//!
//! Typed listener capabilities and the ordered registries that fan events
//! out to them. Listeners run in registration order; a panicking listener is
//! logged and skipped so the remaining listeners and the native call that
//! triggered the event are unaffected.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::events::{LocationEvent, MenuDetectEvent, ProgressEvent, StatusTextEvent, TitleEvent, WindowEvent};

pub trait LocationListener {
    /// Navigation is about to start; clear `event.doit` to veto it.
    fn changing(&self, _event: &mut LocationEvent) {}
    fn changed(&self, _event: &LocationEvent) {}
}

pub trait ProgressListener {
    fn changed(&self, _event: &ProgressEvent) {}
    fn completed(&self, _event: &ProgressEvent) {}
}

pub trait StatusTextListener {
    fn changed(&self, event: &StatusTextEvent);
}

pub trait TitleListener {
    fn changed(&self, event: &TitleEvent);
}

pub trait VisibilityWindowListener {
    fn show(&self, _event: &WindowEvent) {}
    fn hide(&self, _event: &WindowEvent) {}
}

pub trait OpenWindowListener {
    /// Set `event.browser` to host the new window.
    fn open(&self, event: &mut WindowEvent);
}

pub trait CloseWindowListener {
    fn close(&self, event: &WindowEvent);
}

pub trait MenuDetectListener {
    /// A context menu is about to open at `event.location`.
    fn detected(&self, event: &mut MenuDetectEvent);
}

impl<F: Fn(&StatusTextEvent)> StatusTextListener for F {
    fn changed(&self, event: &StatusTextEvent) {
        self(event)
    }
}

impl<F: Fn(&TitleEvent)> TitleListener for F {
    fn changed(&self, event: &TitleEvent) {
        self(event)
    }
}

impl<F: Fn(&mut WindowEvent)> OpenWindowListener for F {
    fn open(&self, event: &mut WindowEvent) {
        self(event)
    }
}

impl<F: Fn(&WindowEvent)> CloseWindowListener for F {
    fn close(&self, event: &WindowEvent) {
        self(event)
    }
}

impl<F: Fn(&mut MenuDetectEvent)> MenuDetectListener for F {
    fn detected(&self, event: &mut MenuDetectEvent) {
        self(event)
    }
}

/// Ordered listeners of one capability.
pub struct ListenerRegistry<T: ?Sized> {
    kind: &'static str,
    listeners: RefCell<Vec<Rc<T>>>,
}

impl<T: ?Sized> ListenerRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Append; the same listener may be added more than once.
    pub fn add(&self, listener: Rc<T>) {
        self.listeners.borrow_mut().push(listener);
    }

    /// Remove the first registration of `listener`.
    pub fn remove(&self, listener: &Rc<T>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        match listeners.iter().position(|l| Rc::ptr_eq(l, listener)) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Call `f` for every listener registered when notification starts.
    ///
    /// Listeners may add or remove listeners while being notified. Returns
    /// the number of listeners that panicked.
    pub fn notify(&self, mut f: impl FnMut(&T)) -> usize {
        let snapshot: Vec<Rc<T>> = self.listeners.borrow().clone();
        let mut failures = 0;
        for (position, listener) in snapshot.iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(listener))) {
                failures += 1;
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                tracing::error!(kind = self.kind, position, %message, "listener panicked");
            }
        }
        failures
    }
}

impl<T: ?Sized> fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}

/// One registry per event category
#[derive(Debug)]
pub struct Listeners {
    pub location: ListenerRegistry<dyn LocationListener>,
    pub progress: ListenerRegistry<dyn ProgressListener>,
    pub status_text: ListenerRegistry<dyn StatusTextListener>,
    pub title: ListenerRegistry<dyn TitleListener>,
    pub visibility_window: ListenerRegistry<dyn VisibilityWindowListener>,
    pub open_window: ListenerRegistry<dyn OpenWindowListener>,
    pub close_window: ListenerRegistry<dyn CloseWindowListener>,
    pub menu_detect: ListenerRegistry<dyn MenuDetectListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            location: ListenerRegistry::new("location"),
            progress: ListenerRegistry::new("progress"),
            status_text: ListenerRegistry::new("status_text"),
            title: ListenerRegistry::new("title"),
            visibility_window: ListenerRegistry::new("visibility_window"),
            open_window: ListenerRegistry::new("open_window"),
            close_window: ListenerRegistry::new("close_window"),
            menu_detect: ListenerRegistry::new("menu_detect"),
        }
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}
