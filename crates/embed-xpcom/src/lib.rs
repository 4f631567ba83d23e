//! embed-xpcom
//!
//! Emulated native interface tables for embedding a Mozilla-family engine.
//!
//! The engine talks to its host through reference-counted interface
//! pointers. This crate builds those tables out of Rust closures, keeps the
//! shared reference count for an object, answers `QueryInterface`, and calls
//! into native interfaces the engine hands back.
//!
//! # Example
//! ```rust,ignore
//! use embed_xpcom::{ComIdentity, InterfaceTable, NS_ISUPPORTS_IID};
//!
//! let object = ComIdentity::new("site");
//! let slots = ComIdentity::supports_slots(&std::rc::Rc::downgrade(&object));
//! let table = InterfaceTable::new("nsISupports", slots.to_vec())?;
//! object.add_table(&[NS_ISUPPORTS_IID], table);
//! ```

mod comptr;
mod error;
mod identity;
mod nsid;
mod nsresult;
mod refcount;
mod vtable;
pub mod iids;
pub mod marshal;

pub use comptr::ComPtr;
pub use error::{Result, XpcomError};
pub use identity::{ComIdentity, SLOT_ADD_REF, SLOT_QUERY_INTERFACE, SLOT_RELEASE};
pub use iids::*;
pub use nsid::{NsCid, NsId, NsIid, ParseIdError};
pub use nsresult::NsResult;
pub use refcount::{Lifecycle, RefCount, Released};
pub use vtable::{call_slot, InterfaceTable, NativeWord, Slot, MAX_ARGS, MAX_SLOTS};
