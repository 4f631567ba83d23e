//! Object identity
//!
//! A [`ComIdentity`] is one managed object as native code sees it: a single
//! reference count shared by every interface table the object exposes, and
//! the interface-id map `QueryInterface` resolves against.

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Result, XpcomError};
use crate::marshal::{read_in, write_out};
use crate::refcount::{Lifecycle, RefCount, Released};
use crate::vtable::{InterfaceTable, NativeWord, Slot};
use crate::{NsIid, NsResult};

/// `QueryInterface`, `AddRef` and `Release` ordinals
pub const SLOT_QUERY_INTERFACE: usize = 0;
pub const SLOT_ADD_REF: usize = 1;
pub const SLOT_RELEASE: usize = 2;

type Teardown = Box<dyn FnOnce()>;

/// A managed object exposed to native code through several interface tables.
pub struct ComIdentity {
    name: &'static str,
    refcount: RefCount,
    tables: RefCell<Vec<InterfaceTable>>,
    /// Interface id to table index, many-to-one
    interfaces: RefCell<Vec<(NsIid, usize)>>,
    teardown: RefCell<Option<Teardown>>,
}

impl ComIdentity {
    /// New identity holding the construction reference.
    pub fn new(name: &'static str) -> Rc<Self> {
        Rc::new(Self {
            name,
            refcount: RefCount::new(),
            tables: RefCell::new(Vec::new()),
            interfaces: RefCell::new(Vec::new()),
            teardown: RefCell::new(None),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The three `nsISupports` slots, forwarding to this identity.
    ///
    /// Closures hold a weak reference; the identity owns its tables.
    pub fn supports_slots(this: &Weak<Self>) -> [Slot; 3] {
        let qi = this.clone();
        let add = this.clone();
        let rel = this.clone();
        [
            Slot::new(2, move |args| match qi.upgrade() {
                // SAFETY: native caller passes an IID pointer and an out pointer
                Some(identity) => unsafe { identity.query_interface(args[0], args[1]) },
                None => NsResult::NS_ERROR_UNEXPECTED,
            }),
            Slot::new(0, move |_| match add.upgrade() {
                Some(identity) => NsResult(identity.add_ref()),
                None => NsResult(0),
            }),
            Slot::new(0, move |_| match rel.upgrade() {
                Some(identity) => NsResult(identity.release()),
                None => NsResult(0),
            }),
        ]
    }

    /// Register a table reachable under each of `iids`. Returns its index.
    pub fn add_table(&self, iids: &[NsIid], table: InterfaceTable) -> usize {
        let mut tables = self.tables.borrow_mut();
        let index = tables.len();
        tables.push(table);
        drop(tables);

        let mut interfaces = self.interfaces.borrow_mut();
        for iid in iids {
            interfaces.retain(|(known, _)| known != iid);
            interfaces.push((*iid, index));
        }
        index
    }

    /// Run `teardown` once, right after the count reaches zero.
    pub fn on_teardown<F: FnOnce() + 'static>(&self, teardown: F) {
        *self.teardown.borrow_mut() = Some(Box::new(teardown));
    }

    /// Native address of table `index`; null when disposed or unknown.
    pub fn table_address(&self, index: usize) -> *mut c_void {
        self.tables
            .borrow()
            .get(index)
            .map_or(std::ptr::null_mut(), InterfaceTable::address)
    }

    /// Address of the table implementing `iid`, without touching the count.
    pub fn resolve(&self, iid: &NsIid) -> Option<*mut c_void> {
        if self.refcount.is_disposed() {
            return None;
        }
        let index = self
            .interfaces
            .borrow()
            .iter()
            .find(|(known, _)| known == iid)
            .map(|(_, index)| *index)?;
        let address = self.table_address(index);
        (!address.is_null()).then_some(address)
    }

    /// Does `ptr` name one of this identity's tables?
    pub fn owns(&self, ptr: *const c_void) -> bool {
        self.tables.borrow().iter().any(|t| t.is_address(ptr))
    }

    /// Managed-side `QueryInterface`: resolve and take a reference.
    pub fn query(&self, iid: &NsIid) -> Result<*mut c_void> {
        if self.refcount.is_disposed() {
            return Err(XpcomError::Disposed);
        }
        let address = self.resolve(iid).ok_or(XpcomError::NoInterface(*iid))?;
        self.add_ref();
        Ok(address)
    }

    /// Native `QueryInterface(riid, result)`.
    ///
    /// On success writes the table address and takes exactly one reference.
    /// On failure writes null (when `out` is non-null) and leaves the count.
    ///
    /// # Safety
    /// `riid` must be zero or point to an IID; `out` must be zero or point to
    /// a writable pointer.
    pub unsafe fn query_interface(&self, riid: NativeWord, out: NativeWord) -> NsResult {
        let Some(iid) = read_in::<NsIid>(riid) else {
            return NsResult::NS_ERROR_NO_INTERFACE;
        };
        if out == 0 {
            return NsResult::NS_ERROR_NO_INTERFACE;
        }
        match self.resolve(&iid) {
            Some(address) => {
                write_out(out, address);
                self.add_ref();
                NsResult::NS_OK
            }
            None => {
                tracing::debug!(object = self.name, %iid, "QueryInterface: no interface");
                write_out(out, std::ptr::null_mut::<c_void>());
                NsResult::NS_ERROR_NO_INTERFACE
            }
        }
    }

    pub fn add_ref(&self) -> u32 {
        self.refcount.add_ref()
    }

    /// Drop a reference; the last one disposes every table and runs teardown.
    pub fn release(&self) -> u32 {
        let released = self.refcount.release();
        if released == Released::Disposed {
            tracing::debug!(object = self.name, "reference count reached zero");
            self.teardown();
        }
        released.count()
    }

    /// Dispose immediately regardless of outstanding references.
    pub fn dispose_now(&self) {
        if self.refcount.force_dispose() {
            tracing::debug!(object = self.name, "forced disposal");
            self.teardown();
        }
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.count()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.refcount.state()
    }

    pub fn is_disposed(&self) -> bool {
        self.refcount.is_disposed()
    }

    fn teardown(&self) {
        // Tables are moved out before being dropped so no borrow is held
        // while their closures are freed.
        let tables = std::mem::take(&mut *self.tables.borrow_mut());
        drop(tables);
        self.interfaces.borrow_mut().clear();

        let hook = self.teardown.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for ComIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComIdentity")
            .field("name", &self.name)
            .field("state", &self.refcount.state())
            .field("tables", &self.tables.borrow().len())
            .finish()
    }
}
