//! Browser Events
//!
//! Toolkit-level events produced from native notifications.

use url::Url;

use crate::Browser;

/// Location in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Navigation event.
///
/// For `changing`, clearing `doit` vetoes the navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEvent {
    pub location: String,
    /// The top-level frame navigated, not a sub-frame
    pub top: bool,
    pub doit: bool,
}

impl LocationEvent {
    pub fn new(location: impl Into<String>, top: bool) -> Self {
        Self {
            location: location.into(),
            top,
            doit: true,
        }
    }

    /// Parsed location, if it is an absolute URL
    pub fn url(&self) -> Option<Url> {
        Url::parse(&self.location).ok()
    }
}

/// Load progress. `total` is positive in `changed` events; the event sent
/// to `completed` carries zero for both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub current: i32,
    pub total: i32,
}

impl ProgressEvent {
    /// Unknown totals (zero or negative) become `i32::MAX`.
    pub fn normalized(current: i32, total: i32) -> Self {
        Self {
            current,
            total: if total <= 0 { i32::MAX } else { total },
        }
    }

    /// Event sent to `completed`
    pub fn done() -> Self {
        Self {
            current: 0,
            total: 0,
        }
    }
}

/// Context menu request at a screen location. Listeners may move the
/// menu, or clear `doit` to suppress it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuDetectEvent {
    pub location: Point,
    pub doit: bool,
}

impl MenuDetectEvent {
    pub fn new(location: Point) -> Self {
        Self { location, doit: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTextEvent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleEvent {
    pub title: String,
}

/// Window open, show, hide and close requests.
#[derive(Debug, Clone, Default)]
pub struct WindowEvent {
    pub location: Option<Point>,
    pub size: Option<Size>,
    pub address_bar: bool,
    pub menu_bar: bool,
    pub status_bar: bool,
    pub tool_bar: bool,
    /// The engine requires a browser for the new window
    pub required: bool,
    /// Set by open-window listeners to the browser hosting the new window
    pub browser: Option<Browser>,
}

impl WindowEvent {
    /// Bar visibility as requested by chrome flags
    pub fn with_chrome_flags(flags: u32) -> Self {
        use crate::config::chrome::*;
        Self {
            address_bar: flags & CHROME_LOCATIONBAR != 0,
            menu_bar: flags & CHROME_MENUBAR != 0,
            status_bar: flags & CHROME_STATUSBAR != 0,
            tool_bar: flags & CHROME_TOOLBAR != 0,
            ..Self::default()
        }
    }
}
