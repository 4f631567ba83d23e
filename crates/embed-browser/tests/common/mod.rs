//! Shared fixture for embed-browser integration tests
//!
//! The engine is process-wide, so tests in one binary take turns.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use embed_browser::loopback::{LoopbackBrowser, LoopbackLibrary};
use embed_browser::{
    Browser, CloseWindowListener, EmbedConfig, HeadlessSite, LocationEvent, LocationListener, ProgressEvent,
    ProgressListener, Runtime, Size, StatusTextEvent, StatusTextListener, TitleEvent, TitleListener,
    VisibilityWindowListener, WindowEvent,
};

static ENGINE: Mutex<()> = Mutex::new(());

pub fn lock_engine() -> MutexGuard<'static, ()> {
    ENGINE.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Fixture {
    pub library: Rc<LoopbackLibrary>,
    pub runtime: Runtime,
    _guard: MutexGuard<'static, ()>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EmbedConfig::default())
    }

    pub fn with_config(config: EmbedConfig) -> Self {
        let guard = lock_engine();
        let library = LoopbackLibrary::new();
        let runtime = Runtime::init(library.clone(), config).expect("engine init");
        Self {
            library,
            runtime,
            _guard: guard,
        }
    }

    pub fn site() -> Rc<HeadlessSite> {
        Rc::new(HeadlessSite::new(0xB0B, Size::new(800, 600)))
    }

    /// A browser, its engine web browser and the site it lives in
    pub fn browser(&self) -> (Browser, Rc<LoopbackBrowser>, Rc<HeadlessSite>) {
        let site = Self::site();
        let browser = Browser::new(&self.runtime, site.clone()).expect("browser");
        let engine = self.library.last_browser().expect("engine web browser");
        (browser, engine, site)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.runtime.dispose_all();
        if let Err(e) = self.runtime.shutdown() {
            eprintln!("fixture shutdown: {}", e);
        }
    }
}

/// Listener for every event kind, recording one line per event
#[derive(Default)]
pub struct Recorder {
    pub log: RefCell<Vec<String>>,
}

impl Recorder {
    pub fn attach(browser: &Browser) -> Rc<Recorder> {
        let recorder = Rc::new(Recorder::default());
        browser.add_location_listener(recorder.clone());
        browser.add_progress_listener(recorder.clone());
        browser.add_status_text_listener(recorder.clone());
        browser.add_title_listener(recorder.clone());
        browser.add_visibility_window_listener(recorder.clone());
        browser.add_close_window_listener(recorder.clone());
        recorder
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log.borrow().iter().filter(|line| line.starts_with(prefix)).count()
    }

    fn push(&self, line: String) {
        self.log.borrow_mut().push(line);
    }
}

impl LocationListener for Recorder {
    fn changing(&self, event: &mut LocationEvent) {
        self.push(format!("changing {}", event.location));
    }

    fn changed(&self, event: &LocationEvent) {
        self.push(format!("changed {} top={}", event.location, event.top));
    }
}

impl ProgressListener for Recorder {
    fn changed(&self, event: &ProgressEvent) {
        self.push(format!("progress {}/{}", event.current, event.total));
    }

    fn completed(&self, _event: &ProgressEvent) {
        self.push("completed".to_string());
    }
}

impl StatusTextListener for Recorder {
    fn changed(&self, event: &StatusTextEvent) {
        self.push(format!("status {}", event.text));
    }
}

impl TitleListener for Recorder {
    fn changed(&self, event: &TitleEvent) {
        self.push(format!("title {}", event.title));
    }
}

impl VisibilityWindowListener for Recorder {
    fn show(&self, event: &WindowEvent) {
        self.push(format!("show {:?} {:?}", event.location, event.size));
    }

    fn hide(&self, _event: &WindowEvent) {
        self.push("hide".to_string());
    }
}

impl CloseWindowListener for Recorder {
    fn close(&self, _event: &WindowEvent) {
        self.push("close".to_string());
    }
}
