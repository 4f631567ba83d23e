//! Drive a browser against the in-process loopback engine.
//!
//! Run with `RUST_LOG=embed_browser=debug` to see native calls.

use std::rc::Rc;

use anyhow::Result;
use embed_browser::loopback::LoopbackLibrary;
use embed_browser::{
    Browser, EmbedConfig, HeadlessSite, LocationEvent, LocationListener, ProgressEvent, ProgressListener, Runtime,
    Size, StatusTextEvent, TitleEvent,
};

struct Printer;

impl LocationListener for Printer {
    fn changing(&self, event: &mut LocationEvent) {
        println!("navigating to {}", event.location);
    }

    fn changed(&self, event: &LocationEvent) {
        let host = event.url().and_then(|url| url.host_str().map(str::to_string));
        println!("at {} (host {:?}, top {})", event.location, host, event.top);
    }
}

impl ProgressListener for Printer {
    fn changed(&self, event: &ProgressEvent) {
        println!("progress {}/{}", event.current, event.total);
    }

    fn completed(&self, _event: &ProgressEvent) {
        println!("done");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let library = LoopbackLibrary::new();
    let runtime = Runtime::init(library.clone(), EmbedConfig::from_env())?;

    let site = Rc::new(HeadlessSite::new(1, Size::new(1024, 768)));
    let browser = Browser::new(&runtime, site)?;
    let printer = Rc::new(Printer);
    browser.add_location_listener(printer.clone());
    browser.add_progress_listener(printer);
    browser.add_status_text_listener(Rc::new(|e: &StatusTextEvent| {
        if !e.text.is_empty() {
            println!("status: {}", e.text);
        }
    }));
    browser.add_title_listener(Rc::new(|e: &TitleEvent| println!("title: {}", e.title)));

    browser.set_url("https://www.example.com/")?;
    library.pump_all();

    browser.set_text("<html><body><h1>Hello</h1></body></html>")?;
    library.pump_all();
    runtime.run_pending();

    if let Some(engine) = library.last_browser() {
        engine.set_title("Hello");
        for document in engine.documents() {
            println!("streamed {} bytes of {}", document.data.len(), document.content_type);
        }
    }

    println!("back enabled: {}", browser.is_back_enabled()?);
    browser.dispose();
    runtime.shutdown()?;
    Ok(())
}
