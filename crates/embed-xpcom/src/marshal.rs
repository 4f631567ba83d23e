//! Argument Marshaling
//!
//! Conversions between native words and Rust values. Every conversion that
//! can fail returns [`XpcomError::Marshal`]; callback adapters turn that into
//! `NS_ERROR_INVALID_ARG` instead of letting it reach native code.

use std::ffi::{c_char, c_void, CStr, CString};

use crate::error::{Result, XpcomError};
use crate::{NativeWord, NsResult};

/// Longest native string accepted, in code units
pub const MAX_STRING_UNITS: usize = 1 << 20;

/// Native boolean out-parameter type (`PRBool`, a 32-bit integer)
pub type PrBool = u32;

pub const PR_TRUE: PrBool = 1;
pub const PR_FALSE: PrBool = 0;

/// Native `PRInt32` argument
#[inline]
pub fn word_to_i32(word: NativeWord) -> i32 {
    word as i32
}

/// Native `PRUint32` argument
#[inline]
pub fn word_to_u32(word: NativeWord) -> u32 {
    word as u32
}

/// Native `PRBool` argument
#[inline]
pub fn word_to_bool(word: NativeWord) -> bool {
    word as u32 != 0
}

#[inline]
pub fn i32_to_word(value: i32) -> NativeWord {
    value as u32 as NativeWord
}

#[inline]
pub fn bool_to_word(value: bool) -> NativeWord {
    value as NativeWord
}

#[inline]
pub fn ptr_to_word<T>(ptr: *const T) -> NativeWord {
    ptr as NativeWord
}

/// Write a value through a native out-parameter.
///
/// # Safety
/// `out` must be zero or point to writable memory for a `T`.
pub unsafe fn write_out<T: Copy>(out: NativeWord, value: T) -> NsResult {
    if out == 0 {
        return NsResult::NS_ERROR_NULL_POINTER;
    }
    std::ptr::write_unaligned(out as *mut T, value);
    NsResult::NS_OK
}

/// Read a value from native memory.
///
/// # Safety
/// `ptr` must be zero or point to a readable `T`.
pub unsafe fn read_in<T: Copy>(ptr: NativeWord) -> Option<T> {
    if ptr == 0 {
        None
    } else {
        Some(std::ptr::read_unaligned(ptr as *const T))
    }
}

/// Decode a NUL-terminated UTF-16 string (`PRUnichar*`).
///
/// # Safety
/// `ptr` must be zero or point to a NUL-terminated UTF-16 buffer.
pub unsafe fn wide_cstr(ptr: NativeWord) -> Result<String> {
    if ptr == 0 {
        return Err(XpcomError::Marshal("null string".into()));
    }
    let base = ptr as *const u16;
    let mut len = 0;
    while *base.add(len) != 0 {
        len += 1;
        if len > MAX_STRING_UNITS {
            return Err(XpcomError::Marshal("unterminated string".into()));
        }
    }
    let units = std::slice::from_raw_parts(base, len);
    String::from_utf16(units).map_err(|e| XpcomError::Marshal(e.to_string()))
}

/// Decode a NUL-terminated UTF-8 string (`char*`).
///
/// # Safety
/// `ptr` must be zero or point to a NUL-terminated byte buffer.
pub unsafe fn utf8_cstr(ptr: NativeWord) -> Result<String> {
    if ptr == 0 {
        return Err(XpcomError::Marshal("null string".into()));
    }
    CStr::from_ptr(ptr as *const c_char)
        .to_str()
        .map(str::to_owned)
        .map_err(|e| XpcomError::Marshal(e.to_string()))
}

/// Owned NUL-terminated UTF-16 buffer for outbound calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideString(Vec<u16>);

impl WideString {
    pub fn new(text: &str) -> Self {
        Self(text.encode_utf16().chain(std::iter::once(0)).collect())
    }

    /// Pointer valid while `self` lives
    pub fn as_word(&self) -> NativeWord {
        self.0.as_ptr() as NativeWord
    }

    /// Length in code units, excluding the terminator
    pub fn len(&self) -> usize {
        self.0.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned NUL-terminated UTF-8 buffer for outbound calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrowString(CString);

impl NarrowString {
    /// Interior NULs are a marshaling failure.
    pub fn new(text: &str) -> Result<Self> {
        CString::new(text)
            .map(Self)
            .map_err(|e| XpcomError::Marshal(e.to_string()))
    }

    pub fn as_word(&self) -> NativeWord {
        self.0.as_ptr() as NativeWord
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Storage behind an `nsACString&` argument (`nsCStringContainer`).
///
/// The fields belong to the engine's string glue and are only read by it.
#[repr(C)]
#[derive(Debug)]
pub struct CStringContainer {
    pub d1: *mut c_void,
    pub d2: u32,
    pub d3: *mut c_void,
}

impl CStringContainer {
    const fn zeroed() -> Self {
        Self {
            d1: std::ptr::null_mut(),
            d2: 0,
            d3: std::ptr::null_mut(),
        }
    }
}

/// The engine's exported string glue
#[derive(Debug, Clone, Copy)]
pub struct CStringApi {
    /// `NS_CStringContainerInit`
    pub container_init: unsafe extern "C" fn(*mut CStringContainer) -> NsResult,
    /// `NS_CStringGetData`; returns the length and writes the buffer.
    pub get_data: unsafe extern "C" fn(*const CStringContainer, *mut *const c_char, *mut PrBool) -> u32,
    /// `NS_CStringContainerFinish`
    pub container_finish: unsafe extern "C" fn(*mut CStringContainer),
}

/// An engine-owned narrow string, used as an `nsACString&` out-parameter.
/// Finished on drop.
pub struct EmbedCString {
    api: CStringApi,
    // Boxed so the address handed to native code stays put
    container: Box<CStringContainer>,
}

impl EmbedCString {
    pub fn new(api: CStringApi) -> Result<Self> {
        let mut container = Box::new(CStringContainer::zeroed());
        // SAFETY: the container is zeroed, writable and outlives the call
        unsafe { (api.container_init)(&mut *container) }.check("NS_CStringContainerInit")?;
        Ok(Self { api, container })
    }

    /// `nsACString&` argument for a call; valid while `self` lives.
    pub fn as_word(&mut self) -> NativeWord {
        &mut *self.container as *mut CStringContainer as NativeWord
    }

    /// Current contents, decoded as UTF-8
    pub fn value(&self) -> Result<String> {
        let mut data: *const c_char = std::ptr::null();
        // SAFETY: initialized container; the buffer stays valid until the next mutation
        let len = unsafe { (self.api.get_data)(&*self.container, &mut data, std::ptr::null_mut()) } as usize;
        if len == 0 {
            return Ok(String::new());
        }
        if data.is_null() || len > MAX_STRING_UNITS {
            return Err(XpcomError::Marshal(format!("bad string buffer ({len} bytes)")));
        }
        // SAFETY: the glue reported `len` readable bytes at `data`
        let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) };
        String::from_utf8(bytes.to_vec()).map_err(|e| XpcomError::Marshal(e.to_string()))
    }
}

impl Drop for EmbedCString {
    fn drop(&mut self) {
        // SAFETY: initialized in `new` and finished exactly once
        unsafe { (self.api.container_finish)(&mut *self.container) };
    }
}

impl std::fmt::Debug for EmbedCString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedCString").field("container", &self.container).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_round_trip_through_pointer() {
        let wide = WideString::new("Loading héllo");
        let text = unsafe { wide_cstr(wide.as_word()) }.unwrap();
        assert_eq!(text, "Loading héllo");
        assert_eq!(wide.len(), 13);
    }

    #[test]
    fn test_null_strings_are_marshal_errors() {
        assert!(matches!(unsafe { wide_cstr(0) }, Err(XpcomError::Marshal(_))));
        assert!(matches!(unsafe { utf8_cstr(0) }, Err(XpcomError::Marshal(_))));
    }

    #[test]
    fn test_invalid_utf16() {
        let units: [u16; 2] = [0xD800, 0];
        let result = unsafe { wide_cstr(units.as_ptr() as NativeWord) };
        assert!(matches!(result, Err(XpcomError::Marshal(_))));
    }

    #[test]
    fn test_narrow_rejects_interior_nul() {
        assert!(NarrowString::new("a\0b").is_err());
        let ok = NarrowString::new("about:blank").unwrap();
        assert_eq!(unsafe { utf8_cstr(ok.as_word()) }.unwrap(), "about:blank");
    }

    #[test]
    fn test_int_words() {
        assert_eq!(word_to_i32(i32_to_word(-1)), -1);
        assert_eq!(word_to_i32(i32_to_word(i32::MIN)), i32::MIN);
        assert!(word_to_bool(bool_to_word(true)));
        assert!(!word_to_bool(0));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_upper_bits_ignored() {
        // PRBool arrives in the low half of the register
        assert!(!word_to_bool(0xFFFF_FFFF_0000_0000));
        assert_eq!(word_to_i32(0xDEAD_BEEF_FFFF_FFFE), -2);
    }

    #[test]
    fn test_write_out() {
        let mut slot: u32 = 0;
        let rc = unsafe { write_out(&mut slot as *mut u32 as NativeWord, 7u32) };
        assert_eq!(rc, NsResult::NS_OK);
        assert_eq!(slot, 7);
        assert_eq!(unsafe { write_out(0, 7u32) }, NsResult::NS_ERROR_NULL_POINTER);
    }

    // Minimal glue: `d1` owns a boxed byte buffer
    unsafe extern "C" fn init(container: *mut CStringContainer) -> NsResult {
        (*container).d1 = Box::into_raw(Box::new(Vec::<u8>::new())).cast();
        NsResult::NS_OK
    }

    unsafe extern "C" fn get_data(container: *const CStringContainer, data: *mut *const c_char, _: *mut PrBool) -> u32 {
        let buffer = &*(*container).d1.cast::<Vec<u8>>();
        *data = buffer.as_ptr().cast();
        buffer.len() as u32
    }

    unsafe extern "C" fn finish(container: *mut CStringContainer) {
        drop(Box::from_raw((*container).d1.cast::<Vec<u8>>()));
        (*container).d1 = std::ptr::null_mut();
    }

    unsafe extern "C" fn refuse(_: *mut CStringContainer) -> NsResult {
        NsResult::NS_ERROR_OUT_OF_MEMORY
    }

    const GLUE: CStringApi = CStringApi {
        container_init: init,
        get_data,
        container_finish: finish,
    };

    #[test]
    fn test_embed_cstring_reads_assigned_value() {
        let mut spec = EmbedCString::new(GLUE).unwrap();
        assert_eq!(spec.value().unwrap(), "");

        let container = spec.as_word() as *mut CStringContainer;
        unsafe { (*(*container).d1.cast::<Vec<u8>>()).extend_from_slice("https://例え.jp/".as_bytes()) };
        assert_eq!(spec.value().unwrap(), "https://例え.jp/");
    }

    #[test]
    fn test_embed_cstring_init_failure() {
        let glue = CStringApi {
            container_init: refuse,
            ..GLUE
        };
        let err = EmbedCString::new(glue).unwrap_err();
        assert!(matches!(
            err,
            XpcomError::Native {
                code: NsResult::NS_ERROR_OUT_OF_MEMORY,
                ..
            }
        ));
    }

    #[test]
    fn test_embed_cstring_rejects_invalid_utf8() {
        let mut spec = EmbedCString::new(GLUE).unwrap();
        let container = spec.as_word() as *mut CStringContainer;
        unsafe { (*(*container).d1.cast::<Vec<u8>>()).extend_from_slice(&[0xff, 0xfe]) };
        assert!(matches!(spec.value(), Err(XpcomError::Marshal(_))));
    }
}
