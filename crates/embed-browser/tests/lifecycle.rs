//! Runtime and browser lifecycle tests

mod common;

use std::cell::RefCell;
use std::ffi::c_void;
use std::path::PathBuf;
use std::rc::Rc;

use common::{lock_engine, Fixture};
use embed_browser::chrome::*;
use embed_browser::loopback::LoopbackLibrary;
use embed_browser::xpcom::{NativeWord, NsResult, XpcomError, NS_IWINDOWCREATOR_IID};
use embed_browser::{Browser, BrowserError, EmbedConfig, OpenWindowListener, Runtime, WindowEvent};

// ============================================================================
// RUNTIME TESTS
// ============================================================================

#[test]
fn test_init_twice_fails() {
    let fx = Fixture::new();
    assert!(Runtime::is_initialized());
    let again = Runtime::init(LoopbackLibrary::new(), EmbedConfig::default());
    assert_eq!(again.unwrap_err(), BrowserError::AlreadyInitialized);
    assert_eq!(fx.library.init_calls(), 1);
}

#[test]
fn test_failed_init_can_be_retried() {
    let _guard = lock_engine();
    let library = LoopbackLibrary::new();
    library.fail_init_with(NsResult::NS_ERROR_FAILURE);

    let err = Runtime::init(library.clone(), EmbedConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        BrowserError::Xpcom(XpcomError::Native {
            code: NsResult::NS_ERROR_FAILURE,
            ..
        })
    ));
    assert!(!Runtime::is_initialized());

    let runtime = Runtime::init(library.clone(), EmbedConfig::default()).unwrap();
    assert!(library.is_initialized());
    assert!(library.has_window_creator());
    runtime.shutdown().unwrap();
    assert!(!library.is_initialized());
    assert!(!library.has_window_creator());
}

#[test]
fn test_gre_path_passed_to_library() {
    let config = EmbedConfig {
        gre_path: Some(PathBuf::from("/opt/xulrunner")),
        ..EmbedConfig::default()
    };
    let fx = Fixture::with_config(config);
    assert_eq!(fx.library.gre_path(), Some(PathBuf::from("/opt/xulrunner")));
}

#[test]
fn test_current_runtime() {
    let fx = Fixture::new();
    let current = Runtime::current().unwrap();
    assert_eq!(current.browser_count(), 0);
    fx.runtime.shutdown().unwrap();
    assert_eq!(Runtime::current().unwrap_err(), BrowserError::NotInitialized);
    assert_eq!(fx.library.term_calls(), 1);
}

#[test]
fn test_shutdown_refused_while_browsers_alive() {
    let fx = Fixture::new();
    let (browser, _engine, _site) = fx.browser();

    assert_eq!(fx.runtime.shutdown().unwrap_err(), BrowserError::BrowsersAlive(1));
    assert!(Runtime::is_initialized());

    browser.dispose();
    fx.runtime.shutdown().unwrap();
    assert!(!Runtime::is_initialized());
    assert_eq!(fx.library.term_calls(), 1);

    // Nothing left to tear down
    fx.runtime.shutdown().unwrap();
    assert_eq!(fx.library.term_calls(), 1);
}

#[test]
fn test_browser_after_shutdown_fails() {
    let fx = Fixture::new();
    fx.runtime.shutdown().unwrap();
    let err = Browser::new(&fx.runtime, Fixture::site()).unwrap_err();
    assert_eq!(err, BrowserError::NotInitialized);
}

// ============================================================================
// BROWSER CREATION TESTS
// ============================================================================

#[test]
fn test_browser_attaches_to_engine() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    assert_eq!(engine.chrome_ptr(), browser.chrome());
    assert!(engine.has_progress_listener());
    assert!(engine.has_content_listener());

    let window = engine.window();
    assert_eq!(window.parent, 0xB0B);
    assert_eq!(window.bounds, Some((0, 0, 800, 600)));
    assert!(window.created);
    assert!(window.visible);

    // Own reference, container, progress listener and content listener
    assert_eq!(browser.native_refcount(), 4);
    assert_eq!(fx.runtime.browser_count(), 1);
    assert!(!browser.is_child());
}

#[test]
fn test_tiny_site_clamped() {
    let fx = Fixture::new();
    let site = Fixture::site();
    site.size.set(embed_browser::Size::new(0, 0));
    let _browser = Browser::new(&fx.runtime, site.clone()).unwrap();
    let engine = fx.library.last_browser().unwrap();
    assert_eq!(engine.window().bounds, Some((0, 0, 2, 2)));
}

// ============================================================================
// DISPOSE TESTS
// ============================================================================

#[test]
fn test_dispose_is_idempotent() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    browser.dispose();
    browser.dispose();

    assert!(browser.is_disposed());
    assert_eq!(browser.native_refcount(), 0);
    assert!(engine.is_released());
    assert_eq!(engine.over_releases(), 0);
    assert!(!engine.has_progress_listener());
    assert!(!engine.has_content_listener());
    assert!(engine.window().destroyed);
    assert_eq!(fx.runtime.browser_count(), 0);
}

#[test]
fn test_operations_after_dispose() {
    let fx = Fixture::new();
    let (browser, _engine, _site) = fx.browser();
    browser.dispose();

    assert_eq!(browser.set_url("https://example.com/").unwrap_err(), BrowserError::Disposed);
    assert_eq!(browser.set_text("<p/>").unwrap_err(), BrowserError::Disposed);
    assert_eq!(browser.back().unwrap_err(), BrowserError::Disposed);
    assert_eq!(browser.url().unwrap_err(), BrowserError::Disposed);
}

#[test]
fn test_engine_reference_outlives_dispose() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let weak_reference = engine.get_weak_reference().unwrap();

    browser.dispose();
    assert!(browser.is_disposed());
    assert_eq!(browser.native_refcount(), 1);
    assert!(!engine.is_released());
    assert_eq!(fx.runtime.browser_count(), 1);

    drop(weak_reference);
    assert_eq!(browser.native_refcount(), 0);
    assert!(engine.is_released());
    assert_eq!(engine.over_releases(), 0);
    assert_eq!(fx.runtime.browser_count(), 0);
}

#[test]
fn test_empty_url_rejected() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    assert!(matches!(browser.set_url("  "), Err(BrowserError::InvalidUrl { .. })));
    assert!(engine.loads().is_empty());
}

// ============================================================================
// NAVIGATION TESTS
// ============================================================================

#[test]
fn test_history_navigation() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    assert!(!browser.back().unwrap());
    browser.set_url("https://a.example/").unwrap();
    browser.set_url("https://b.example/").unwrap();
    fx.library.pump_all();

    assert!(browser.is_back_enabled().unwrap());
    assert!(!browser.is_forward_enabled().unwrap());
    assert!(browser.back().unwrap());
    assert_eq!(browser.url().unwrap(), "https://a.example/");
    assert!(browser.is_forward_enabled().unwrap());
    assert!(browser.forward().unwrap());
    assert_eq!(engine.current().as_deref(), Some("https://b.example/"));
}

#[test]
fn test_script_refresh_stop() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    browser.execute("document.title = 'x'").unwrap();
    assert_eq!(engine.scripts(), vec!["document.title = 'x'"]);
    assert!(engine.loads().is_empty());

    browser.refresh().unwrap();
    browser.stop().unwrap();
    assert_eq!(engine.reloads(), 1);
    assert_eq!(engine.stops(), 1);
}

#[test]
fn test_resize_and_focus() {
    let fx = Fixture::new();
    let (browser, engine, site) = fx.browser();

    site.size.set(embed_browser::Size::new(1024, 768));
    browser.on_resize().unwrap();
    assert_eq!(engine.window().bounds, Some((0, 0, 1024, 768)));

    browser.on_focus_gained().unwrap();
    assert!(engine.window().active);
    browser.on_focus_lost().unwrap();
    assert!(!engine.window().active);
}

// ============================================================================
// WINDOW CREATOR TESTS
// ============================================================================

#[test]
fn test_window_creator_uses_open_window_listener() {
    let fx = Fixture::new();
    let (parent, parent_engine, _site) = fx.browser();

    let opened: Rc<RefCell<Option<Browser>>> = Rc::new(RefCell::new(None));
    let runtime = fx.runtime.clone();
    let slot = opened.clone();
    parent.add_open_window_listener(Rc::new(move |event: &mut WindowEvent| {
        assert!(event.required);
        assert!(event.status_bar);
        let child = Browser::new(&runtime, Fixture::site()).expect("child browser");
        *slot.borrow_mut() = Some(child.clone());
        event.browser = Some(child);
    }));

    let flags = CHROME_OPENAS_CHROME | CHROME_STATUSBAR;
    let (rc, chrome) = fx.library.open_window(&parent_engine, flags);
    assert_eq!(rc, NsResult::NS_OK);

    let child = opened.borrow_mut().take().expect("listener ran");
    let chrome = chrome.expect("chrome handed to the engine");
    assert_eq!(chrome.as_ptr(), child.chrome());
    assert!(child.is_child());
    assert_eq!(child.chrome_flags(), flags);
    assert_eq!(child.native_refcount(), 5);

    drop(chrome);
    assert_eq!(child.native_refcount(), 4);
    assert_eq!(fx.runtime.browser_count(), 2);
    assert!(fx.library.browser_for_chrome(child.chrome()).is_some());
}

#[test]
fn test_window_creator_without_listener() {
    let fx = Fixture::new();
    let (_parent, parent_engine, _site) = fx.browser();

    let (rc, chrome) = fx.library.open_window(&parent_engine, CHROME_ALL);
    assert_eq!(rc, NsResult::NS_ERROR_NOT_IMPLEMENTED);
    assert!(chrome.is_none());
    assert_eq!(fx.runtime.browser_count(), 1);
}

#[test]
fn test_window_creator_rejects_parent_as_child() {
    let fx = Fixture::new();
    let (parent, parent_engine, _site) = fx.browser();

    let same = parent.clone();
    let listener: Rc<dyn OpenWindowListener> = Rc::new(move |event: &mut WindowEvent| {
        event.browser = Some(same.clone());
    });
    parent.add_open_window_listener(listener.clone());

    let (rc, chrome) = fx.library.open_window(&parent_engine, CHROME_ALL);
    assert_eq!(rc, NsResult::NS_ERROR_NOT_IMPLEMENTED);
    assert!(chrome.is_none());
    assert!(!parent.is_child());
    parent.remove_open_window_listener(&listener);
}

#[test]
fn test_window_creator_outlives_shutdown_while_held() {
    let fx = Fixture::new();
    let held = fx.library.window_creator().expect("creator registered");

    fx.runtime.shutdown().unwrap();
    assert!(!fx.library.has_window_creator());

    // The engine's own reference still resolves and answers calls
    assert!(held.query_interface(&NS_IWINDOWCREATOR_IID).is_ok());
    let mut out: *mut c_void = 0x1 as *mut c_void;
    let args = [0, CHROME_ALL as NativeWord, &mut out as *mut *mut c_void as NativeWord];
    let rc = unsafe { held.call(3, &args) };
    assert_eq!(rc, NsResult::NS_ERROR_NOT_INITIALIZED);
    assert!(out.is_null());
}
