//! Native callback dispatch tests
//!
//! The loopback engine calls the browser's interface tables through their
//! function pointers, exactly as the engine does.

mod common;

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::Rc;

use common::{Fixture, Recorder};
use embed_browser::chrome::*;
use embed_browser::dim::*;
use embed_browser::state::*;
use embed_browser::loopback::new_uri;
use embed_browser::native::NativeInterface;
use embed_browser::xpcom::*;
use embed_browser::{
    LocationEvent, LocationListener, MenuDetectEvent, Point, Size, StatusTextEvent, StatusTextListener, Traversal,
};

const DOCUMENT: u32 = STATE_IS_DOCUMENT | STATE_IS_REQUEST;

// ============================================================================
// PROGRESS AND STATUS TESTS
// ============================================================================

#[test]
fn test_progress_totals_normalized() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    assert_eq!(engine.progress_change(10, 0), NsResult::NS_OK);
    assert_eq!(engine.progress_change(10, -1), NsResult::NS_OK);
    assert_eq!(engine.progress_change(250, 500), NsResult::NS_OK);

    let max = i32::MAX;
    assert_eq!(
        recorder.take(),
        vec![
            format!("progress 10/{}", max),
            format!("progress 10/{}", max),
            "progress 250/500".to_string(),
        ]
    );
}

#[test]
fn test_status_from_progress_listener_and_chrome() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    engine.status_change("Resolving host");
    engine.set_status("https://example.com/link");
    assert_eq!(
        recorder.take(),
        vec!["status Resolving host", "status https://example.com/link"]
    );

    // Accepted and ignored
    assert_eq!(engine.security_change(4), NsResult::NS_OK);
    assert!(recorder.take().is_empty());
}

#[test]
fn test_navigation_event_sequence() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    browser.set_url("https://example.com/").unwrap();
    assert!(engine.pump());
    assert!(!engine.pump());

    assert_eq!(
        recorder.take(),
        vec![
            "changing https://example.com/",
            "changed https://example.com/ top=true",
            "status Loading https://example.com/",
            "progress 50/100",
            "progress 100/100",
            "status ",
            "completed",
        ]
    );
    assert_eq!(browser.url().unwrap(), "https://example.com/");
}

// ============================================================================
// REQUEST TRACKING TESTS
// ============================================================================

#[test]
fn test_redirect_completes_once() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    let a = engine.next_request();
    let b = engine.next_request();
    engine.state_change(a, STATE_START | DOCUMENT, NsResult::NS_OK);
    engine.state_change(a, STATE_REDIRECTING | DOCUMENT, NsResult::NS_OK);
    engine.state_change(b, STATE_STOP | DOCUMENT, NsResult::NS_OK);

    assert_eq!(recorder.count("completed"), 1);
}

#[test]
fn test_stop_of_other_request_does_not_complete() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    let a = engine.next_request();
    let c = engine.next_request();
    engine.state_change(a, STATE_START | DOCUMENT, NsResult::NS_OK);
    engine.state_change(c, STATE_START | DOCUMENT, NsResult::NS_OK);
    engine.state_change(c, STATE_STOP | DOCUMENT, NsResult::NS_OK);
    assert_eq!(recorder.count("completed"), 0);

    engine.state_change(a, STATE_STOP | DOCUMENT, NsResult::NS_OK);
    assert_eq!(recorder.count("completed"), 1);
}

#[test]
fn test_frame_load_inside_page_completes_once() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    let page = engine.next_request();
    let frame = engine.next_request();
    engine.state_change(page, STATE_START | DOCUMENT, NsResult::NS_OK);
    engine.location_change(page, "https://example.com/");
    engine.state_change(frame, STATE_START | DOCUMENT, NsResult::NS_OK);
    engine.frame_location_change(frame, "https://ads.example/frame");
    engine.state_change(frame, STATE_STOP | DOCUMENT, NsResult::NS_OK);
    assert_eq!(recorder.count("completed"), 0);

    engine.state_change(page, STATE_STOP | DOCUMENT, NsResult::NS_OK);
    assert_eq!(recorder.count("completed"), 1);
}

#[test]
fn test_non_document_states_ignored() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    let image = engine.next_request();
    engine.state_change(image, STATE_START | STATE_IS_REQUEST, NsResult::NS_OK);
    engine.state_change(image, STATE_STOP | STATE_IS_REQUEST, NsResult::NS_OK);
    assert!(recorder.take().is_empty());
}

// ============================================================================
// LOCATION TESTS
// ============================================================================

struct Veto;

impl LocationListener for Veto {
    fn changing(&self, event: &mut LocationEvent) {
        if event.location.contains("blocked") {
            event.doit = false;
        }
    }
}

#[test]
fn test_changing_listener_vetoes_load() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    browser.add_location_listener(Rc::new(Veto));

    browser.set_url("https://blocked.example/").unwrap();
    browser.set_url("https://allowed.example/").unwrap();

    assert_eq!(engine.vetoed(), vec!["https://blocked.example/"]);
    assert_eq!(engine.history(), vec!["https://allowed.example/"]);
}

#[test]
fn test_start_uri_open_without_listeners_allows() {
    let fx = Fixture::new();
    let (_browser, engine, _site) = fx.browser();
    assert_eq!(engine.start_uri_open("https://example.com/"), Some(false));
}

#[test]
fn test_open_during_load_is_not_vetoable() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    browser.add_location_listener(Rc::new(Veto));
    let recorder = Recorder::attach(&browser);

    let page = engine.next_request();
    engine.state_change(page, STATE_START | DOCUMENT, NsResult::NS_OK);
    assert_eq!(engine.start_uri_open("https://blocked.example/frame"), Some(false));
    assert!(recorder.take().is_empty());

    engine.state_change(page, STATE_STOP | DOCUMENT, NsResult::NS_OK);
    recorder.take();
    assert_eq!(engine.start_uri_open("https://blocked.example/next"), Some(true));
    assert_eq!(recorder.take(), vec!["changing https://blocked.example/next"]);
}

#[test]
fn test_sub_frame_location_is_not_top() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    browser.set_url("https://example.com/").unwrap();
    engine.pump();
    let recorder = Recorder::attach(&browser);

    let frame = engine.next_request();
    engine.frame_location_change(frame, "https://ads.example/frame");
    assert_eq!(recorder.take(), vec!["changed https://ads.example/frame top=false"]);
}

#[test]
fn test_top_follows_window_not_url() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    browser.set_url("https://example.com/").unwrap();
    engine.pump();
    let recorder = Recorder::attach(&browser);

    // A frame showing the page's own URL is still a frame
    engine.frame_location_change(engine.next_request(), "https://example.com/");
    // The top window moves before the browser commits the new URL
    engine.location_change(engine.next_request(), "https://other.example/");
    assert_eq!(
        recorder.take(),
        vec![
            "changed https://example.com/ top=false",
            "changed https://other.example/ top=true",
        ]
    );
}

// ============================================================================
// DOCUMENT STREAMING TESTS
// ============================================================================

#[test]
fn test_set_text_streams_into_blank_page() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    browser.set_text("<p>hello</p>").unwrap();
    assert_eq!(engine.loads(), vec!["about:blank"]);
    assert!(engine.documents().is_empty());

    engine.pump();
    let documents = engine.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].base, "about:blank");
    assert_eq!(documents[0].content_type, "text/html");
    assert_eq!(documents[0].data, b"<p>hello</p>");

    // Completion waits for the host event loop
    assert_eq!(recorder.count("completed"), 0);
    assert_eq!(fx.runtime.run_pending(), 1);
    assert_eq!(recorder.count("completed"), 1);
}

#[test]
fn test_set_text_twice_keeps_latest_document() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    browser.set_text("<p>first</p>").unwrap();
    browser.set_text("<p>second</p>").unwrap();
    assert_eq!(engine.loads(), vec!["about:blank"]);

    engine.pump();
    let documents = engine.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].data, b"<p>second</p>");
}

#[test]
fn test_large_document_streamed_in_pages() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    let html = format!("<pre>{}</pre>", "x".repeat(20_000));
    browser.set_text(&html).unwrap();
    engine.pump();

    let documents = engine.documents();
    assert_eq!(documents[0].data.len(), html.len());
    assert!(documents[0].appends > 1);
}

#[test]
fn test_set_url_drops_pending_document() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    browser.set_text("<p>never shown</p>").unwrap();
    browser.set_url("https://example.com/").unwrap();
    fx.library.pump_all();
    assert!(engine.documents().is_empty());
}

// ============================================================================
// WINDOW TESTS
// ============================================================================

#[test]
fn test_show_fires_once() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    engine.set_visibility(true);
    engine.set_visibility(true);
    assert_eq!(recorder.count("show"), 1);

    engine.set_visibility(false);
    engine.set_visibility(true);
    assert_eq!(recorder.count("show"), 2);
    assert_eq!(recorder.count("hide"), 1);
}

#[test]
fn test_show_carries_requested_bounds() {
    let fx = Fixture::new();
    let (browser, engine, site) = fx.browser();
    let recorder = Recorder::attach(&browser);

    engine.set_dimensions(DIM_FLAGS_POSITION | DIM_FLAGS_SIZE_INNER, 10, 20, 300, 200);
    engine.set_visibility(true);

    let expected = format!("show {:?} {:?}", Some(Point::new(10, 20)), Some(Size::new(300, 200)));
    assert_eq!(recorder.take(), vec![expected]);
    // Not a chrome window; the host widget keeps its size
    assert_eq!(site.size.get(), Size::new(800, 600));
}

#[test]
fn test_chrome_window_resized_by_engine() {
    let fx = Fixture::new();
    let (_browser, engine, site) = fx.browser();

    engine.size_browser_to(300, 200);
    assert_eq!(site.size.get(), Size::new(800, 600));

    engine.set_chrome_flags(CHROME_OPENAS_CHROME);
    engine.size_browser_to(300, 200);
    assert_eq!(site.size.get(), Size::new(300, 200));
}

#[test]
fn test_get_dimensions_from_site() {
    let fx = Fixture::new();
    let (_browser, engine, _site) = fx.browser();
    assert_eq!(
        engine.get_dimensions(DIM_FLAGS_POSITION | DIM_FLAGS_SIZE_INNER),
        Some((0, 0, 800, 600))
    );
    assert_eq!(engine.get_visibility(), Some(true));
    assert_eq!(engine.site_window(), Some(0xB0B));
    assert_eq!(engine.site_set_focus(), NsResult::NS_OK);
}

#[test]
fn test_chrome_flags_round_trip() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    assert_eq!(engine.chrome_flags(), Some(CHROME_DEFAULT));
    engine.set_chrome_flags(CHROME_ALL | CHROME_MODAL);
    assert_eq!(engine.chrome_flags(), Some(CHROME_ALL | CHROME_MODAL));
    assert_eq!(browser.chrome_flags(), CHROME_ALL | CHROME_MODAL);

    assert_eq!(engine.is_window_modal(), Some(false));
    assert_eq!(engine.show_as_modal(), NsResult::NS_ERROR_NOT_IMPLEMENTED);
}

#[test]
fn test_chrome_hands_out_web_browser() {
    let fx = Fixture::new();
    let (_browser, engine, _site) = fx.browser();
    let before = engine.refcount();
    let web_browser = engine.chrome_web_browser().expect("web browser");
    assert_eq!(engine.refcount(), before + 1);
    assert!(web_browser.query_interface(&NS_IWEBBROWSER_IID).is_ok());
}

#[test]
fn test_close_from_page_disposes() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let recorder = Recorder::attach(&browser);
    let closed = Rc::new(RefCell::new(None));
    let sink = closed.clone();
    browser.add_close_window_listener(Rc::new(move |e: &embed_browser::WindowEvent| {
        *sink.borrow_mut() = e.browser.clone();
    }));

    assert_eq!(engine.destroy_browser_window(), NsResult::NS_OK);
    assert_eq!(recorder.take(), vec!["close"]);
    assert_eq!(closed.borrow().as_ref(), Some(&browser));
    assert!(browser.is_disposed());
    assert!(engine.is_released());
    assert_eq!(fx.runtime.browser_count(), 0);
    closed.borrow_mut().take();
}

// ============================================================================
// TITLE, FOCUS AND TOOLTIP TESTS
// ============================================================================

#[test]
fn test_title_falls_back_to_url() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    browser.set_url("https://example.com/untitled").unwrap();
    engine.pump();
    let recorder = Recorder::attach(&browser);

    engine.set_title("Example");
    engine.set_title("");
    assert_eq!(
        recorder.take(),
        vec!["title Example", "title https://example.com/untitled"]
    );
}

#[test]
fn test_focus_traversal_deferred() {
    let fx = Fixture::new();
    let (_browser, engine, site) = fx.browser();

    assert_eq!(engine.focus_next_element(), NsResult::NS_OK);
    assert_eq!(engine.focus_prev_element(), NsResult::NS_OK);
    assert!(site.traversals.borrow().is_empty());

    assert_eq!(fx.runtime.run_pending(), 2);
    assert_eq!(*site.traversals.borrow(), vec![Traversal::TabNext, Traversal::TabPrevious]);
}

#[test]
fn test_traversal_skipped_after_dispose() {
    let fx = Fixture::new();
    let (browser, engine, site) = fx.browser();

    engine.focus_next_element();
    browser.dispose();
    fx.runtime.run_pending();
    assert!(site.traversals.borrow().is_empty());
}

#[test]
fn test_tooltips_reach_site() {
    let fx = Fixture::new();
    let (_browser, engine, site) = fx.browser();

    engine.show_tooltip(12, 34, "Open in new tab");
    assert_eq!(
        *site.tooltip.borrow(),
        Some((Point::new(12, 34), "Open in new tab".to_string()))
    );
    engine.hide_tooltip();
    assert!(site.tooltip.borrow().is_none());
}

// ============================================================================
// CONTEXT MENU TESTS
// ============================================================================

#[test]
fn test_context_menu_shown_at_pointer() {
    let fx = Fixture::new();
    let (browser, engine, site) = fx.browser();
    let seen = Rc::new(Cell::new(None));
    let sink = seen.clone();
    browser.add_menu_detect_listener(Rc::new(move |e: &mut MenuDetectEvent| sink.set(Some(e.location))));

    assert_eq!(engine.show_context_menu(120, 45), NsResult::NS_OK);
    assert_eq!(seen.get(), Some(Point::new(120, 45)));
    assert_eq!(site.context_menu.get(), Some(Point::new(120, 45)));
}

#[test]
fn test_menu_detect_listener_moves_menu() {
    let fx = Fixture::new();
    let (browser, engine, site) = fx.browser();
    browser.add_menu_detect_listener(Rc::new(|e: &mut MenuDetectEvent| e.location = Point::new(10, 10)));

    engine.show_context_menu(120, 45);
    assert_eq!(site.context_menu.get(), Some(Point::new(10, 10)));
}

#[test]
fn test_menu_detect_veto_suppresses_menu() {
    let fx = Fixture::new();
    let (browser, engine, site) = fx.browser();
    browser.add_menu_detect_listener(Rc::new(|e: &mut MenuDetectEvent| e.doit = false));

    assert_eq!(engine.show_context_menu(120, 45), NsResult::NS_OK);
    assert!(site.context_menu.get().is_none());
}

#[test]
fn test_context_menu_needs_mouse_event() {
    let fx = Fixture::new();
    let (_browser, engine, site) = fx.browser();

    let not_an_event = new_uri("about:blank").unwrap();
    assert_eq!(
        engine.show_context_menu_for(not_an_event.ptr()),
        NsResult::NS_ERROR_NO_INTERFACE
    );
    assert!(site.context_menu.get().is_none());
}

// ============================================================================
// INTERFACE LOOKUP TESTS
// ============================================================================

#[test]
fn test_every_host_interface_answers_query_interface() {
    let fx = Fixture::new();
    let (browser, _engine, _site) = fx.browser();
    let chrome = browser.chrome();
    let host = [
        NS_ISUPPORTS_IID,
        NS_IWEAKREFERENCE_IID,
        NS_IWEBPROGRESSLISTENER_IID,
        NS_IWEBBROWSERCHROME_IID,
        NS_IWEBBROWSERCHROMEFOCUS_IID,
        NS_IEMBEDDINGSITEWINDOW_IID,
        NS_IINTERFACEREQUESTOR_IID,
        NS_ISUPPORTSWEAKREFERENCE_IID,
        NS_ICONTEXTMENULISTENER_IID,
        NS_IURICONTENTLISTENER_IID,
        NS_ITOOLTIPLISTENER_IID,
    ];
    let before = browser.native_refcount();

    for iid in &host {
        let mut out: *mut c_void = std::ptr::null_mut();
        let args = [iid as *const NsIid as NativeWord, &mut out as *mut *mut c_void as NativeWord];
        let rc = unsafe { call_slot(chrome, SLOT_QUERY_INTERFACE, &args) };
        assert_eq!(rc, NsResult::NS_OK, "QueryInterface({})", iid);
        assert!(!out.is_null(), "QueryInterface({})", iid);
        assert_eq!(browser.native_refcount(), before + 1);

        unsafe { call_slot(out, SLOT_RELEASE, &[]) };
        assert_eq!(browser.native_refcount(), before);
    }

    let mut out: *mut c_void = 0x1 as *mut c_void;
    let args = [
        &NS_IWEBBROWSER_IID as *const NsIid as NativeWord,
        &mut out as *mut *mut c_void as NativeWord,
    ];
    let rc = unsafe { call_slot(chrome, SLOT_QUERY_INTERFACE, &args) };
    assert_eq!(rc, NsResult::NS_ERROR_NO_INTERFACE);
    assert!(out.is_null());
    assert_eq!(browser.native_refcount(), before);
}

#[test]
fn test_get_interface_dom_window_and_chrome() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    assert!(engine.get_interface(&NS_IDOMWINDOW_IID).is_some());
    let chrome = engine.get_interface(&NS_IWEBBROWSERCHROME_IID).expect("chrome");
    assert_eq!(chrome.as_ptr(), browser.chrome());
    assert!(engine.get_interface(&NS_IWEBBROWSER_IID).is_none());
}

#[test]
fn test_weak_reference_holds_a_reference() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();

    let before = browser.native_refcount();
    let weak_reference = engine.get_weak_reference().expect("weak reference");
    assert_eq!(browser.native_refcount(), before + 1);
    drop(weak_reference);
    assert_eq!(browser.native_refcount(), before);
}

#[test]
fn test_content_preferences() {
    let fx = Fixture::new();
    let (_browser, engine, _site) = fx.browser();

    assert_eq!(engine.is_preferred("text/html"), Some(true));
    assert_eq!(engine.is_preferred("application/x-vnd.mozilla.maybe-text"), Some(false));
    assert_eq!(engine.is_preferred("multipart/x-mixed-replace"), Some(false));

    // DoContent and CanHandleContent are not supported
    assert_eq!(engine.content_listener_call(4, 5), NsResult::NS_ERROR_NOT_IMPLEMENTED);
    assert_eq!(engine.content_listener_call(6, 4), NsResult::NS_ERROR_NOT_IMPLEMENTED);
}

// ============================================================================
// LISTENER REGISTRY TESTS
// ============================================================================

#[test]
fn test_listeners_run_in_registration_order() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    let order = Rc::new(RefCell::new(Vec::new()));

    let mut listeners: Vec<Rc<dyn StatusTextListener>> = Vec::new();
    for name in ["A", "B", "C"] {
        let order = order.clone();
        let listener: Rc<dyn StatusTextListener> =
            Rc::new(move |_: &StatusTextEvent| order.borrow_mut().push(name));
        browser.add_status_text_listener(listener.clone());
        listeners.push(listener);
    }

    engine.status_change("one");
    assert_eq!(*order.borrow(), vec!["A", "B", "C"]);

    order.borrow_mut().clear();
    browser.remove_status_text_listener(&listeners[1]);
    engine.status_change("two");
    assert_eq!(*order.borrow(), vec!["A", "C"]);
}

#[test]
fn test_panicking_listener_skipped() {
    let fx = Fixture::new();
    let (browser, engine, _site) = fx.browser();
    browser.add_status_text_listener(Rc::new(|_: &StatusTextEvent| panic!("listener bug")));
    let recorder = Recorder::attach(&browser);

    assert_eq!(engine.status_change("still delivered"), NsResult::NS_OK);
    assert_eq!(recorder.take(), vec!["status still delivered"]);
}
