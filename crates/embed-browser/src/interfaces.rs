//! Emulated host interfaces
//!
//! Builds the interface tables one browser exposes to the engine. Slot
//! order and arity follow the native declarations; every table starts with
//! the three `nsISupports` slots of the shared identity.

use std::rc::{Rc, Weak};

use embed_xpcom::{
    ComIdentity, InterfaceTable, NativeWord, NsIid, NsResult, Result, Slot, NS_ICONTEXTMENULISTENER_IID,
    NS_IEMBEDDINGSITEWINDOW_IID, NS_IINTERFACEREQUESTOR_IID, NS_ISUPPORTSWEAKREFERENCE_IID, NS_ISUPPORTS_IID,
    NS_ITOOLTIPLISTENER_IID, NS_IURICONTENTLISTENER_IID, NS_IWEAKREFERENCE_IID, NS_IWEBBROWSERCHROMEFOCUS_IID,
    NS_IWEBBROWSERCHROME_IID, NS_IWEBPROGRESSLISTENER_IID,
};

use crate::browser::BrowserCore;
use crate::callbacks;

/// Table indices within a browser's identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum Iface {
    Supports = 0,
    WeakReference,
    WebProgressListener,
    Chrome,
    ChromeFocus,
    EmbeddingSiteWindow,
    InterfaceRequestor,
    SupportsWeakReference,
    ContextMenuListener,
    UriContentListener,
    TooltipListener,
}

type Callback = fn(&Rc<BrowserCore>, &[NativeWord]) -> NsResult;

/// Slot forwarding to `callback` while the browser is alive.
fn on(core: &Weak<BrowserCore>, name: &'static str, arity: usize, callback: Callback) -> Slot {
    let core = core.clone();
    Slot::new(arity, move |args| {
        let Some(core) = core.upgrade() else {
            tracing::warn!(slot = name, "native call into a dropped browser");
            return NsResult::NS_ERROR_UNEXPECTED;
        };
        if core.runtime.config().log_native_calls {
            tracing::debug!(slot = name, ?args, "native call");
        } else {
            tracing::trace!(slot = name, "native call");
        }
        callback(&core, args)
    })
}

struct Builder<'a> {
    identity: &'a Rc<ComIdentity>,
    weak_identity: Weak<ComIdentity>,
    core: Weak<BrowserCore>,
}

impl Builder<'_> {
    fn table(&self, expected: Iface, name: &'static str, iids: &[NsIid], slots: Vec<Slot>) -> Result<()> {
        let mut all = ComIdentity::supports_slots(&self.weak_identity).to_vec();
        all.extend(slots);
        let index = self.identity.add_table(iids, InterfaceTable::new(name, all)?);
        debug_assert_eq!(index, expected as usize);
        Ok(())
    }

    fn on(&self, name: &'static str, arity: usize, callback: Callback) -> Slot {
        on(&self.core, name, arity, callback)
    }
}

/// Add every host interface table to `core`'s identity.
pub(crate) fn install(core: &Rc<BrowserCore>) -> Result<()> {
    let b = Builder {
        identity: &core.identity,
        weak_identity: Rc::downgrade(&core.identity),
        core: Rc::downgrade(core),
    };

    b.table(Iface::Supports, "nsISupports", &[NS_ISUPPORTS_IID], Vec::new())?;

    b.table(
        Iface::WeakReference,
        "nsIWeakReference",
        &[NS_IWEAKREFERENCE_IID],
        vec![b.on("QueryReferent", 2, callbacks::query_referent)],
    )?;

    b.table(
        Iface::WebProgressListener,
        "nsIWebProgressListener",
        &[NS_IWEBPROGRESSLISTENER_IID],
        vec![
            b.on("OnStateChange", 4, callbacks::on_state_change),
            b.on("OnProgressChange", 6, callbacks::on_progress_change),
            b.on("OnLocationChange", 3, callbacks::on_location_change),
            b.on("OnStatusChange", 4, callbacks::on_status_change),
            Slot::ok(3),
        ],
    )?;

    b.table(
        Iface::Chrome,
        "nsIWebBrowserChrome",
        &[NS_IWEBBROWSERCHROME_IID],
        vec![
            b.on("SetStatus", 2, callbacks::set_status),
            b.on("GetWebBrowser", 1, callbacks::get_web_browser),
            b.on("SetWebBrowser", 1, callbacks::set_web_browser),
            b.on("GetChromeFlags", 1, callbacks::get_chrome_flags),
            b.on("SetChromeFlags", 1, callbacks::set_chrome_flags),
            b.on("DestroyBrowserWindow", 0, callbacks::destroy_browser_window),
            b.on("SizeBrowserTo", 2, callbacks::size_browser_to),
            Slot::not_implemented(0),
            b.on("IsWindowModal", 1, callbacks::is_window_modal),
            Slot::ok(1),
        ],
    )?;

    b.table(
        Iface::ChromeFocus,
        "nsIWebBrowserChromeFocus",
        &[NS_IWEBBROWSERCHROMEFOCUS_IID],
        vec![
            b.on("FocusNextElement", 0, callbacks::focus_next_element),
            b.on("FocusPrevElement", 0, callbacks::focus_prev_element),
        ],
    )?;

    b.table(
        Iface::EmbeddingSiteWindow,
        "nsIEmbeddingSiteWindow",
        &[NS_IEMBEDDINGSITEWINDOW_IID],
        vec![
            b.on("SetDimensions", 5, callbacks::set_dimensions),
            b.on("GetDimensions", 5, callbacks::get_dimensions),
            b.on("SetFocus", 0, callbacks::set_focus),
            b.on("GetVisibility", 1, callbacks::get_visibility),
            b.on("SetVisibility", 1, callbacks::set_visibility),
            b.on("GetTitle", 1, callbacks::get_title),
            b.on("SetTitle", 1, callbacks::set_title),
            b.on("GetSiteWindow", 1, callbacks::get_site_window),
        ],
    )?;

    b.table(
        Iface::InterfaceRequestor,
        "nsIInterfaceRequestor",
        &[NS_IINTERFACEREQUESTOR_IID],
        vec![b.on("GetInterface", 2, callbacks::get_interface)],
    )?;

    b.table(
        Iface::SupportsWeakReference,
        "nsISupportsWeakReference",
        &[NS_ISUPPORTSWEAKREFERENCE_IID],
        vec![b.on("GetWeakReference", 1, callbacks::get_weak_reference)],
    )?;

    b.table(
        Iface::ContextMenuListener,
        "nsIContextMenuListener",
        &[NS_ICONTEXTMENULISTENER_IID],
        vec![b.on("OnShowContextMenu", 3, callbacks::on_show_context_menu)],
    )?;

    b.table(
        Iface::UriContentListener,
        "nsIURIContentListener",
        &[NS_IURICONTENTLISTENER_IID],
        vec![
            b.on("OnStartURIOpen", 2, callbacks::on_start_uri_open),
            Slot::not_implemented(5),
            b.on("IsPreferred", 3, callbacks::is_preferred),
            Slot::not_implemented(4),
            Slot::not_implemented(1),
            Slot::not_implemented(1),
            Slot::not_implemented(1),
            Slot::not_implemented(1),
        ],
    )?;

    b.table(
        Iface::TooltipListener,
        "nsITooltipListener",
        &[NS_ITOOLTIPLISTENER_IID],
        vec![
            b.on("OnShowTooltip", 3, callbacks::on_show_tooltip),
            b.on("OnHideTooltip", 0, callbacks::on_hide_tooltip),
        ],
    )?;

    Ok(())
}
