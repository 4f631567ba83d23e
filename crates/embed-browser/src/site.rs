//! Host Site
//!
//! The toolkit widget a browser is embedded in. The bridge calls back into
//! the site for everything that belongs to the host window system.

use std::cell::{Cell, RefCell};

use embed_xpcom::NativeWord;

use crate::events::{Point, Size};

/// Keyboard focus traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    TabNext,
    TabPrevious,
}

/// Host window services used by a browser.
pub trait EmbedSite {
    /// Native parent window handle the engine draws into
    fn native_handle(&self) -> NativeWord;

    /// Client area of the host widget
    fn client_size(&self) -> Size;

    /// Screen position of the top-level host window
    fn location(&self) -> Point {
        Point::default()
    }

    fn is_visible(&self) -> bool {
        true
    }

    /// Move keyboard focus out of the browser.
    fn traverse(&self, _direction: Traversal) {}

    /// Move or resize the host window; only honored for chrome windows.
    fn set_bounds(&self, _location: Option<Point>, _size: Option<Size>) {}

    fn show_tooltip(&self, _at: Point, _text: &str) {}

    fn hide_tooltip(&self) {}

    /// Open the widget's context menu at a screen location.
    fn show_context_menu(&self, _at: Point) {}

    /// Handle returned to the engine for dialogs (print, for instance)
    fn site_window(&self) -> NativeWord {
        self.native_handle()
    }
}

/// Site without a window system, recording what the bridge asked of it.
#[derive(Debug, Default)]
pub struct HeadlessSite {
    pub handle: NativeWord,
    pub size: Cell<Size>,
    pub traversals: RefCell<Vec<Traversal>>,
    pub tooltip: RefCell<Option<(Point, String)>>,
    pub context_menu: Cell<Option<Point>>,
}

impl HeadlessSite {
    pub fn new(handle: NativeWord, size: Size) -> Self {
        Self {
            handle,
            size: Cell::new(size),
            ..Self::default()
        }
    }
}

impl EmbedSite for HeadlessSite {
    fn native_handle(&self) -> NativeWord {
        self.handle
    }

    fn client_size(&self) -> Size {
        self.size.get()
    }

    fn traverse(&self, direction: Traversal) {
        self.traversals.borrow_mut().push(direction);
    }

    fn set_bounds(&self, _location: Option<Point>, size: Option<Size>) {
        if let Some(size) = size {
            self.size.set(size);
        }
    }

    fn show_tooltip(&self, at: Point, text: &str) {
        *self.tooltip.borrow_mut() = Some((at, text.to_string()));
    }

    fn hide_tooltip(&self) {
        self.tooltip.borrow_mut().take();
    }

    fn show_context_menu(&self, at: Point) {
        self.context_menu.set(Some(at));
    }
}
