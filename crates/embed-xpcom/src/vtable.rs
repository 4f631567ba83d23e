//! Interface Table Emulator
//!
//! Builds native interface tables (vtables) whose slots forward into Rust
//! closures, and calls slots of native interface pointers by ordinal.
//!
//! # Native layout
//!
//! A native interface pointer points at an object whose first word is a
//! pointer to an array of function pointers. Every function takes the
//! interface pointer first, followed by the slot's native-word arguments,
//! and returns an [`NsResult`]. Slot order must match the native interface
//! definition exactly.

use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{Result, XpcomError};
use crate::NsResult;

/// One native argument: a pointer or an integer widened to pointer size
pub type NativeWord = usize;

/// Maximum slots per emulated interface
pub const MAX_SLOTS: usize = 32;

/// Maximum native-word arguments per slot (excluding `this`)
pub const MAX_ARGS: usize = 6;

type RawFn = *const c_void;
type Handler = Rc<dyn Fn(&[NativeWord]) -> NsResult>;

/// A vtable slot: declared arity plus the closure it dispatches to.
#[derive(Clone)]
pub struct Slot {
    arity: usize,
    handler: Handler,
}

impl Slot {
    pub fn new<F>(arity: usize, handler: F) -> Self
    where
        F: Fn(&[NativeWord]) -> NsResult + 'static,
    {
        Self {
            arity,
            handler: Rc::new(handler),
        }
    }

    /// Slot that answers `NS_ERROR_NOT_IMPLEMENTED`
    pub fn not_implemented(arity: usize) -> Self {
        Self::new(arity, |_| NsResult::NS_ERROR_NOT_IMPLEMENTED)
    }

    /// Slot that accepts the call and does nothing
    pub fn ok(arity: usize) -> Self {
        Self::new(arity, |_| NsResult::NS_OK)
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("arity", &self.arity).finish()
    }
}

/// Heap object handed to native code. `vtable` must stay the first field.
#[repr(C)]
struct NativeObject {
    vtable: *const RawFn,
    functions: Box<[RawFn]>,
    slots: Box<[Slot]>,
    name: &'static str,
}

/// An emulated native interface.
///
/// Owns the native allocation; [`InterfaceTable::dispose`] frees it and is
/// safe to call more than once.
pub struct InterfaceTable {
    name: &'static str,
    object: Option<Box<NativeObject>>,
}

impl InterfaceTable {
    /// Build a table with one native function pointer per slot, in order.
    pub fn new(name: &'static str, slots: Vec<Slot>) -> Result<Self> {
        if slots.len() > MAX_SLOTS {
            return Err(XpcomError::TableTooLarge {
                name,
                slots: slots.len(),
                max: MAX_SLOTS,
            });
        }

        let mut functions = Vec::with_capacity(slots.len());
        for (ordinal, slot) in slots.iter().enumerate() {
            let thunk = thunk_for(ordinal, slot.arity).ok_or(XpcomError::ArityUnsupported {
                name,
                slot: ordinal,
                arity: slot.arity,
                max: MAX_ARGS,
            })?;
            functions.push(thunk);
        }

        let functions = functions.into_boxed_slice();
        let object = Box::new(NativeObject {
            vtable: functions.as_ptr(),
            functions,
            slots: slots.into_boxed_slice(),
            name,
        });

        tracing::trace!(interface = name, slots = object.slots.len(), "interface table created");
        Ok(Self {
            name,
            object: Some(object),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of slots, zero once disposed
    pub fn len(&self) -> usize {
        self.object.as_ref().map_or(0, |o| o.functions.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native interface pointer; null once disposed.
    pub fn address(&self) -> *mut c_void {
        match &self.object {
            Some(object) => &**object as *const NativeObject as *mut c_void,
            None => std::ptr::null_mut(),
        }
    }

    /// Does `ptr` name this table?
    pub fn is_address(&self, ptr: *const c_void) -> bool {
        !ptr.is_null() && self.address() as *const c_void == ptr
    }

    pub fn is_disposed(&self) -> bool {
        self.object.is_none()
    }

    /// Invoke a slot from the managed side with the same checks native
    /// calls get, plus an argument-count check.
    pub fn invoke(&self, ordinal: usize, args: &[NativeWord]) -> NsResult {
        let Some(object) = &self.object else {
            return NsResult::NS_ERROR_UNEXPECTED;
        };
        let Some(slot) = object.slots.get(ordinal) else {
            return NsResult::NS_ERROR_NOT_IMPLEMENTED;
        };
        if slot.arity != args.len() {
            tracing::warn!(
                interface = self.name,
                slot = ordinal,
                expected = slot.arity,
                got = args.len(),
                "argument count mismatch"
            );
            return NsResult::NS_ERROR_INVALID_ARG;
        }
        let handler = slot.handler.clone();
        run_handler(self.name, ordinal, &handler, args)
    }

    /// Release the native allocation. Second call is a no-op.
    pub fn dispose(&mut self) {
        if self.object.take().is_some() {
            tracing::trace!(interface = self.name, "interface table disposed");
        }
    }
}

impl Drop for InterfaceTable {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for InterfaceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceTable")
            .field("name", &self.name)
            .field("address", &self.address())
            .field("slots", &self.len())
            .finish()
    }
}

/// Call slot `ordinal` of a native interface pointer.
///
/// # Safety
/// `this` must be null or a live native interface pointer whose vtable has
/// more than `ordinal` entries, and that slot must take exactly
/// `args.len()` native-word arguments. Pointer arguments must be valid for
/// whatever the callee does with them.
pub unsafe fn call_slot(this: *mut c_void, ordinal: usize, args: &[NativeWord]) -> NsResult {
    type F0 = unsafe extern "C" fn(*mut c_void) -> NsResult;
    type F1 = unsafe extern "C" fn(*mut c_void, NativeWord) -> NsResult;
    type F2 = unsafe extern "C" fn(*mut c_void, NativeWord, NativeWord) -> NsResult;
    type F3 = unsafe extern "C" fn(*mut c_void, NativeWord, NativeWord, NativeWord) -> NsResult;
    type F4 =
        unsafe extern "C" fn(*mut c_void, NativeWord, NativeWord, NativeWord, NativeWord) -> NsResult;
    type F5 = unsafe extern "C" fn(
        *mut c_void,
        NativeWord,
        NativeWord,
        NativeWord,
        NativeWord,
        NativeWord,
    ) -> NsResult;
    type F6 = unsafe extern "C" fn(
        *mut c_void,
        NativeWord,
        NativeWord,
        NativeWord,
        NativeWord,
        NativeWord,
        NativeWord,
    ) -> NsResult;

    if this.is_null() {
        return NsResult::NS_ERROR_NULL_POINTER;
    }
    let vtable = *(this as *const *const RawFn);
    if vtable.is_null() {
        return NsResult::NS_ERROR_NULL_POINTER;
    }
    let function = *vtable.add(ordinal);
    if function.is_null() {
        return NsResult::NS_ERROR_NULL_POINTER;
    }

    match *args {
        [] => std::mem::transmute::<RawFn, F0>(function)(this),
        [a] => std::mem::transmute::<RawFn, F1>(function)(this, a),
        [a, b] => std::mem::transmute::<RawFn, F2>(function)(this, a, b),
        [a, b, c] => std::mem::transmute::<RawFn, F3>(function)(this, a, b, c),
        [a, b, c, d] => std::mem::transmute::<RawFn, F4>(function)(this, a, b, c, d),
        [a, b, c, d, e] => std::mem::transmute::<RawFn, F5>(function)(this, a, b, c, d, e),
        [a, b, c, d, e, g] => std::mem::transmute::<RawFn, F6>(function)(this, a, b, c, d, e, g),
        _ => NsResult::NS_ERROR_INVALID_ARG,
    }
}

fn run_handler(name: &'static str, ordinal: usize, handler: &Handler, args: &[NativeWord]) -> NsResult {
    tracing::trace!(interface = name, slot = ordinal, ?args, "native call");
    // A panic must never unwind into native frames.
    match panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
        Ok(rc) => rc,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(interface = name, slot = ordinal, %message, "slot handler panicked");
            NsResult::NS_ERROR_FAILURE
        }
    }
}

/// Entry point shared by all thunks.
///
/// # Safety
/// `this` must be null or an address produced by [`InterfaceTable::address`]
/// whose table has not been disposed.
unsafe fn dispatch(this: *mut c_void, ordinal: usize, args: &[NativeWord]) -> NsResult {
    if this.is_null() {
        return NsResult::NS_ERROR_NULL_POINTER;
    }
    // Clone the handler out so the table may be disposed during the call
    // (a Release that drops the last reference) without freeing the closure.
    let (name, handler) = {
        let object = &*(this as *const NativeObject);
        match object.slots.get(ordinal) {
            Some(slot) => (object.name, slot.handler.clone()),
            None => return NsResult::NS_ERROR_UNEXPECTED,
        }
    };
    run_handler(name, ordinal, &handler, args)
}

unsafe extern "C" fn thunk0<const N: usize>(this: *mut c_void) -> NsResult {
    dispatch(this, N, &[])
}

unsafe extern "C" fn thunk1<const N: usize>(this: *mut c_void, a: NativeWord) -> NsResult {
    dispatch(this, N, &[a])
}

unsafe extern "C" fn thunk2<const N: usize>(this: *mut c_void, a: NativeWord, b: NativeWord) -> NsResult {
    dispatch(this, N, &[a, b])
}

unsafe extern "C" fn thunk3<const N: usize>(
    this: *mut c_void,
    a: NativeWord,
    b: NativeWord,
    c: NativeWord,
) -> NsResult {
    dispatch(this, N, &[a, b, c])
}

unsafe extern "C" fn thunk4<const N: usize>(
    this: *mut c_void,
    a: NativeWord,
    b: NativeWord,
    c: NativeWord,
    d: NativeWord,
) -> NsResult {
    dispatch(this, N, &[a, b, c, d])
}

unsafe extern "C" fn thunk5<const N: usize>(
    this: *mut c_void,
    a: NativeWord,
    b: NativeWord,
    c: NativeWord,
    d: NativeWord,
    e: NativeWord,
) -> NsResult {
    dispatch(this, N, &[a, b, c, d, e])
}

unsafe extern "C" fn thunk6<const N: usize>(
    this: *mut c_void,
    a: NativeWord,
    b: NativeWord,
    c: NativeWord,
    d: NativeWord,
    e: NativeWord,
    g: NativeWord,
) -> NsResult {
    dispatch(this, N, &[a, b, c, d, e, g])
}

/// Function pointer for slot `ordinal` taking `arity` arguments.
fn thunk_for(ordinal: usize, arity: usize) -> Option<RawFn> {
    macro_rules! thunks {
        ($($n:literal)*) => {
            match ordinal {
                $(
                    $n => match arity {
                        0 => Some(thunk0::<$n> as RawFn),
                        1 => Some(thunk1::<$n> as RawFn),
                        2 => Some(thunk2::<$n> as RawFn),
                        3 => Some(thunk3::<$n> as RawFn),
                        4 => Some(thunk4::<$n> as RawFn),
                        5 => Some(thunk5::<$n> as RawFn),
                        6 => Some(thunk6::<$n> as RawFn),
                        _ => None,
                    },
                )*
                _ => None,
            }
        };
    }
    thunks!(
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
        16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn recording_table(log: Rc<RefCell<Vec<(usize, Vec<NativeWord>)>>>) -> InterfaceTable {
        let slots = [2usize, 0, 0, 4, 6, 3]
            .iter()
            .enumerate()
            .map(|(ordinal, &arity)| {
                let log = log.clone();
                Slot::new(arity, move |args| {
                    log.borrow_mut().push((ordinal, args.to_vec()));
                    NsResult(ordinal as u32)
                })
            })
            .collect();
        InterfaceTable::new("nsITest", slots).unwrap()
    }

    #[test]
    fn test_native_call_reaches_slot_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let table = recording_table(log.clone());
        let this = table.address();

        unsafe {
            assert_eq!(call_slot(this, 3, &[1, 2, 3, 4]), NsResult(3));
            assert_eq!(call_slot(this, 4, &[6, 5, 4, 3, 2, 1]), NsResult(4));
            assert_eq!(call_slot(this, 1, &[]), NsResult(1));
        }

        let log = log.borrow();
        assert_eq!(log[0], (3, vec![1, 2, 3, 4]));
        assert_eq!(log[1], (4, vec![6, 5, 4, 3, 2, 1]));
        assert_eq!(log[2], (1, vec![]));
    }

    #[test]
    fn test_invoke_checks_arity() {
        let table = recording_table(Rc::new(RefCell::new(Vec::new())));
        assert_eq!(table.invoke(3, &[1, 2]), NsResult::NS_ERROR_INVALID_ARG);
        assert_eq!(table.invoke(5, &[0, 0, 0]), NsResult(5));
        assert_eq!(table.invoke(42, &[]), NsResult::NS_ERROR_NOT_IMPLEMENTED);
    }

    #[test]
    fn test_panic_becomes_failure() {
        let table = InterfaceTable::new(
            "nsIPanics",
            vec![Slot::new(1, |_| panic!("listener blew up"))],
        )
        .unwrap();
        let rc = unsafe { call_slot(table.address(), 0, &[7]) };
        assert_eq!(rc, NsResult::NS_ERROR_FAILURE);
    }

    #[test]
    fn test_null_this() {
        let rc = unsafe { call_slot(std::ptr::null_mut(), 0, &[]) };
        assert_eq!(rc, NsResult::NS_ERROR_NULL_POINTER);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut table = InterfaceTable::new("nsISupports", vec![Slot::ok(2), Slot::ok(0), Slot::ok(0)]).unwrap();
        assert!(!table.address().is_null());
        assert_eq!(table.len(), 3);

        table.dispose();
        table.dispose();

        assert!(table.is_disposed());
        assert!(table.address().is_null());
        assert_eq!(table.invoke(1, &[]), NsResult::NS_ERROR_UNEXPECTED);
    }

    #[test]
    fn test_limits() {
        let too_many = (0..MAX_SLOTS + 1).map(|_| Slot::ok(0)).collect();
        assert!(matches!(
            InterfaceTable::new("nsIHuge", too_many),
            Err(XpcomError::TableTooLarge { .. })
        ));
        assert!(matches!(
            InterfaceTable::new("nsIWide", vec![Slot::ok(MAX_ARGS + 1)]),
            Err(XpcomError::ArityUnsupported { slot: 0, .. })
        ));
    }

    #[test]
    fn test_handler_survives_disposal_during_call() {
        let table = Rc::new(RefCell::new(None::<InterfaceTable>));
        let hits = Rc::new(Cell::new(0));

        let inner = table.clone();
        let counter = hits.clone();
        let built = InterfaceTable::new(
            "nsISelfDestruct",
            vec![Slot::new(0, move |_| {
                if let Some(t) = inner.borrow_mut().as_mut() {
                    t.dispose();
                }
                counter.set(counter.get() + 1);
                NsResult::NS_OK
            })],
        )
        .unwrap();
        let address = built.address();
        *table.borrow_mut() = Some(built);

        let rc = unsafe { call_slot(address, 0, &[]) };
        assert_eq!(rc, NsResult::NS_OK);
        assert_eq!(hits.get(), 1);
        assert!(table.borrow().as_ref().unwrap().is_disposed());
    }
}
