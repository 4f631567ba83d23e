//! XPCOM bridge errors

use crate::{NsIid, NsResult};

/// Errors raised on the managed side of the native boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XpcomError {
    /// A native call returned a failure status
    #[error("{context} failed: {code}")]
    Native {
        code: NsResult,
        context: &'static str,
    },

    /// A native call succeeded but handed back a null interface
    #[error("No interface {0}")]
    NoInterface(NsIid),

    /// Native arguments could not be converted
    #[error("Marshaling failed: {0}")]
    Marshal(String),

    /// The object already reached a reference count of zero
    #[error("Object used after disposal")]
    Disposed,

    /// Interface declares more slots than the emulator provides
    #[error("Interface {name} has {slots} slots, at most {max} supported")]
    TableTooLarge {
        name: &'static str,
        slots: usize,
        max: usize,
    },

    /// A slot takes more native arguments than the emulator provides
    #[error("Slot {slot} of {name} takes {arity} arguments, at most {max} supported")]
    ArityUnsupported {
        name: &'static str,
        slot: usize,
        arity: usize,
        max: usize,
    },
}

impl XpcomError {
    /// Native status to hand back when this error ends a native callback.
    pub fn to_nsresult(&self) -> NsResult {
        match self {
            Self::Native { code, .. } => *code,
            Self::NoInterface(_) => NsResult::NS_ERROR_NO_INTERFACE,
            Self::Marshal(_) => NsResult::NS_ERROR_INVALID_ARG,
            Self::Disposed => NsResult::NS_ERROR_UNEXPECTED,
            Self::TableTooLarge { .. } | Self::ArityUnsupported { .. } => {
                NsResult::NS_ERROR_FAILURE
            }
        }
    }
}

/// Result alias for the XPCOM layer
pub type Result<T> = std::result::Result<T, XpcomError>;
