//! Native Status Codes
//!
//! Status codes returned across the native boundary. Only codes the native
//! library itself defines are listed; the bridge never invents new ones.

use std::fmt;

use crate::error::{Result, XpcomError};

/// Native status code (`nsresult`)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NsResult(pub u32);

impl NsResult {
    pub const NS_OK: Self = Self(0);
    pub const NS_ERROR_NOT_IMPLEMENTED: Self = Self(0x8000_4001);
    pub const NS_ERROR_NO_INTERFACE: Self = Self(0x8000_4002);
    pub const NS_ERROR_NULL_POINTER: Self = Self(0x8000_4003);
    pub const NS_ERROR_ABORT: Self = Self(0x8000_4004);
    pub const NS_ERROR_FAILURE: Self = Self(0x8000_4005);
    pub const NS_ERROR_UNEXPECTED: Self = Self(0x8000_ffff);
    pub const NS_ERROR_OUT_OF_MEMORY: Self = Self(0x8007_000e);
    pub const NS_ERROR_INVALID_ARG: Self = Self(0x8007_0057);
    pub const NS_ERROR_NOT_INITIALIZED: Self = Self(0xc1f3_0001);
    pub const NS_ERROR_ALREADY_INITIALIZED: Self = Self(0xc1f3_0002);
    /// Returned by the HTML parser for content it cannot render; callers that
    /// stream documents treat it as success.
    pub const NS_ERROR_HTMLPARSER_UNRESOLVEDDTD: Self = Self(0x804e_03f3);

    /// Alias used by pointer-validating callers
    pub const NS_ERROR_INVALID_POINTER: Self = Self::NS_ERROR_NULL_POINTER;

    #[inline]
    pub const fn succeeded(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }

    #[inline]
    pub const fn failed(self) -> bool {
        !self.succeeded()
    }

    /// Convert a status into a `Result`, naming the call for diagnostics.
    pub fn check(self, context: &'static str) -> Result<()> {
        if self.succeeded() {
            Ok(())
        } else {
            Err(XpcomError::Native { code: self, context })
        }
    }

    /// Symbolic name, if the code is one the bridge knows
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::NS_OK => "NS_OK",
            Self::NS_ERROR_NOT_IMPLEMENTED => "NS_ERROR_NOT_IMPLEMENTED",
            Self::NS_ERROR_NO_INTERFACE => "NS_ERROR_NO_INTERFACE",
            Self::NS_ERROR_NULL_POINTER => "NS_ERROR_NULL_POINTER",
            Self::NS_ERROR_ABORT => "NS_ERROR_ABORT",
            Self::NS_ERROR_FAILURE => "NS_ERROR_FAILURE",
            Self::NS_ERROR_UNEXPECTED => "NS_ERROR_UNEXPECTED",
            Self::NS_ERROR_OUT_OF_MEMORY => "NS_ERROR_OUT_OF_MEMORY",
            Self::NS_ERROR_INVALID_ARG => "NS_ERROR_INVALID_ARG",
            Self::NS_ERROR_NOT_INITIALIZED => "NS_ERROR_NOT_INITIALIZED",
            Self::NS_ERROR_ALREADY_INITIALIZED => "NS_ERROR_ALREADY_INITIALIZED",
            Self::NS_ERROR_HTMLPARSER_UNRESOLVEDDTD => "NS_ERROR_HTMLPARSER_UNRESOLVEDDTD",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for NsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({:#010x})", name, self.0),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl From<u32> for NsResult {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure() {
        assert!(NsResult::NS_OK.succeeded());
        assert!(NsResult(1).succeeded());
        assert!(NsResult::NS_ERROR_FAILURE.failed());
        assert!(NsResult::NS_ERROR_NO_INTERFACE.failed());
    }

    #[test]
    fn test_check_keeps_code() {
        assert!(NsResult::NS_OK.check("GoBack").is_ok());
        match NsResult::NS_ERROR_NO_INTERFACE.check("QueryInterface") {
            Err(XpcomError::Native { code, context }) => {
                assert_eq!(code, NsResult::NS_ERROR_NO_INTERFACE);
                assert_eq!(context, "QueryInterface");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(NsResult::NS_OK.to_string(), "NS_OK (0x00000000)");
        assert_eq!(NsResult(0x8123_4567).to_string(), "0x81234567");
    }
}
