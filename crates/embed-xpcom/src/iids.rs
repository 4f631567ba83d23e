//! Well-known interface and class ids
//!
//! Must be kept in sync with the native interface definitions of the
//! embedding library.

use crate::NsId;

pub const NS_ISUPPORTS_IID: NsId =
    NsId::new(0x00000000, 0x0000, 0x0000, [0xc0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46]);

pub const NS_IWEAKREFERENCE_IID: NsId =
    NsId::new(0x9188bc85, 0xf92e, 0x11d2, [0x81, 0xef, 0x00, 0x60, 0x08, 0x3a, 0x0b, 0xcf]);

pub const NS_ISUPPORTSWEAKREFERENCE_IID: NsId =
    NsId::new(0x9188bc86, 0xf92e, 0x11d2, [0x81, 0xef, 0x00, 0x60, 0x08, 0x3a, 0x0b, 0xcf]);

pub const NS_IWEBPROGRESSLISTENER_IID: NsId =
    NsId::new(0x570f39d1, 0xefd0, 0x11d3, [0xb0, 0x93, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);

pub const NS_IWEBBROWSERCHROME_IID: NsId =
    NsId::new(0xba434c60, 0x9d52, 0x11d3, [0xaf, 0xb0, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);

pub const NS_IWEBBROWSERCHROMEFOCUS_IID: NsId =
    NsId::new(0xd2206418, 0x1dd1, 0x11b2, [0x8e, 0x55, 0xac, 0xdd, 0xcd, 0x2b, 0xcf, 0xb8]);

pub const NS_IEMBEDDINGSITEWINDOW_IID: NsId =
    NsId::new(0x3e5432cd, 0x9568, 0x4bd1, [0x8c, 0xbe, 0xd5, 0x0a, 0xba, 0x11, 0x07, 0x43]);

pub const NS_IINTERFACEREQUESTOR_IID: NsId =
    NsId::new(0x033a1470, 0x8b2a, 0x11d3, [0xaf, 0x88, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);

pub const NS_ICONTEXTMENULISTENER_IID: NsId =
    NsId::new(0x3478b6b0, 0x3875, 0x11d4, [0x94, 0xef, 0x00, 0x20, 0x18, 0x3b, 0xf1, 0x81]);

pub const NS_IURICONTENTLISTENER_IID: NsId =
    NsId::new(0x94928ab3, 0x8b63, 0x11d3, [0x98, 0x9d, 0x00, 0x10, 0x83, 0x01, 0x0e, 0x9b]);

pub const NS_ITOOLTIPLISTENER_IID: NsId =
    NsId::new(0x44b78386, 0x1dd2, 0x11b2, [0x9a, 0xd2, 0xe4, 0xee, 0xe2, 0xca, 0x19, 0x16]);

pub const NS_IWEBBROWSER_IID: NsId =
    NsId::new(0x69e5df00, 0x7b8b, 0x11d3, [0xaf, 0x61, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);

pub const NS_IWEBNAVIGATION_IID: NsId =
    NsId::new(0xf5d9e7b0, 0xd930, 0x11d3, [0xb0, 0x57, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);

pub const NS_IBASEWINDOW_IID: NsId =
    NsId::new(0x046bc8a0, 0x8015, 0x11d3, [0xaf, 0x70, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);

pub const NS_IWEBBROWSERFOCUS_IID: NsId =
    NsId::new(0x9c5d3c58, 0x1dd1, 0x11b2, [0xa1, 0xc9, 0xf3, 0x69, 0x92, 0x84, 0x65, 0x7a]);

pub const NS_IWEBBROWSERSTREAM_IID: NsId =
    NsId::new(0x86d02f0e, 0x219b, 0x4cfc, [0x92, 0x09, 0x23, 0x42, 0xd4, 0x63, 0x42, 0xa0]);

pub const NS_IURI_IID: NsId =
    NsId::new(0x07a22cc0, 0x0ce5, 0x11d3, [0x93, 0x31, 0x00, 0x10, 0x4b, 0xa0, 0xfd, 0x40]);

pub const NS_IDOMWINDOW_IID: NsId =
    NsId::new(0xa6cf906b, 0x15b3, 0x11d2, [0x93, 0x2e, 0x00, 0x80, 0x5f, 0x8a, 0xdd, 0x32]);

pub const NS_IWEBPROGRESS_IID: NsId =
    NsId::new(0x570f39d0, 0xefd0, 0x11d3, [0xb0, 0x93, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);

pub const NS_IDOMMOUSEEVENT_IID: NsId =
    NsId::new(0xff751edc, 0x8b02, 0xaae7, [0x00, 0x10, 0x83, 0x01, 0x83, 0x8a, 0x31, 0x23]);

pub const NS_IWINDOWCREATOR_IID: NsId =
    NsId::new(0x30465632, 0xa777, 0x44cc, [0x90, 0xf9, 0x81, 0x45, 0x47, 0x5e, 0xf9, 0x99]);

/// Class id of the embeddable web browser component
pub const NS_WEBBROWSER_CID: NsId =
    NsId::new(0xf1eac761, 0x87e9, 0x11d3, [0xaf, 0x80, 0x00, 0xa0, 0x24, 0xff, 0xc0, 0x8c]);
