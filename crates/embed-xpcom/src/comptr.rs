//! Owned native interface pointers
//!
//! [`ComPtr`] holds exactly one reference on a native object. Dropping it
//! releases that reference; cloning takes another.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{Result, XpcomError};
use crate::identity::{SLOT_ADD_REF, SLOT_QUERY_INTERFACE, SLOT_RELEASE};
use crate::vtable::{call_slot, NativeWord};
use crate::{NsIid, NsResult};

/// A counted reference to a native interface.
pub struct ComPtr {
    raw: NonNull<c_void>,
}

impl ComPtr {
    /// Adopt a reference the caller already owns (an out-parameter of a
    /// successful call, for instance). Null yields `None`.
    ///
    /// # Safety
    /// `raw` must be null or a live native interface pointer carrying one
    /// reference that is transferred to the returned value.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self { raw })
    }

    /// Take a new reference on a pointer borrowed from elsewhere.
    ///
    /// # Safety
    /// `raw` must be null or a live native interface pointer.
    pub unsafe fn from_borrowed(raw: *mut c_void) -> Option<Self> {
        let ptr = Self::from_raw(raw)?;
        call_slot(ptr.as_ptr(), SLOT_ADD_REF, &[]);
        Some(ptr)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.as_ptr()
    }

    pub fn as_word(&self) -> NativeWord {
        self.raw.as_ptr() as NativeWord
    }

    /// Give up ownership without releasing.
    pub fn into_raw(self) -> *mut c_void {
        let raw = self.raw.as_ptr();
        std::mem::forget(self);
        raw
    }

    /// `QueryInterface` for `iid`. Fails on an error status or a null result.
    pub fn query_interface(&self, iid: &NsIid) -> Result<ComPtr> {
        let mut out: *mut c_void = std::ptr::null_mut();
        // SAFETY: `self` is live; both arguments point to valid stack memory
        let rc = unsafe {
            call_slot(
                self.as_ptr(),
                SLOT_QUERY_INTERFACE,
                &[iid as *const NsIid as NativeWord, &mut out as *mut *mut c_void as NativeWord],
            )
        };
        rc.check("QueryInterface")?;
        // SAFETY: a successful QueryInterface hands over one reference
        unsafe { Self::from_raw(out) }.ok_or(XpcomError::NoInterface(*iid))
    }

    /// Call slot `ordinal` of this interface.
    ///
    /// # Safety
    /// The slot must exist and take exactly `args.len()` native words, and
    /// every pointer in `args` must be valid for the callee.
    pub unsafe fn call(&self, ordinal: usize, args: &[NativeWord]) -> NsResult {
        call_slot(self.as_ptr(), ordinal, args)
    }

    /// Call a slot whose final argument is an interface out-parameter.
    ///
    /// # Safety
    /// Same as [`ComPtr::call`], with `args.len() + 1` arguments.
    pub unsafe fn call_for_interface(
        &self,
        ordinal: usize,
        args: &[NativeWord],
        context: &'static str,
    ) -> Result<Option<ComPtr>> {
        let mut out: *mut c_void = std::ptr::null_mut();
        let mut full = args.to_vec();
        full.push(&mut out as *mut *mut c_void as NativeWord);
        self.call(ordinal, &full).check(context)?;
        Ok(Self::from_raw(out))
    }

    /// Call a slot whose final argument is a plain out-parameter.
    ///
    /// # Safety
    /// Same as [`ComPtr::call`], with `args.len() + 1` arguments; the callee
    /// must write a `T`.
    pub unsafe fn call_for<T: Copy + Default>(
        &self,
        ordinal: usize,
        args: &[NativeWord],
        context: &'static str,
    ) -> Result<T> {
        let mut out = T::default();
        let mut full = args.to_vec();
        full.push(&mut out as *mut T as NativeWord);
        self.call(ordinal, &full).check(context)?;
        Ok(out)
    }
}

impl Clone for ComPtr {
    fn clone(&self) -> Self {
        // SAFETY: `self` keeps the object alive
        unsafe { call_slot(self.as_ptr(), SLOT_ADD_REF, &[]) };
        Self { raw: self.raw }
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        // SAFETY: this value owns one reference
        unsafe { call_slot(self.as_ptr(), SLOT_RELEASE, &[]) };
    }
}

impl PartialEq for ComPtr {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ComPtr {}

impl fmt::Debug for ComPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComPtr").field(&self.raw).finish()
    }
}
