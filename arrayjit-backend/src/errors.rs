//! Backend error kind (§7 `BackendError`) and slot misuse errors
//! (§7 `ReferenceError`).

/// Compile or dispatch failure; carries whatever diagnostic the backend
/// produced verbatim (§7).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend error: {message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Use-after-dispose, double dispose, or an unknown slot handle (§5, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("slot {0:?} has already been freed")]
    UseAfterFree(crate::slot::Slot),
    #[error("slot {0:?} was decremented below zero")]
    DoubleFree(crate::slot::Slot),
    #[error("slot {0:?} is not known to this backend")]
    UnknownSlot(crate::slot::Slot),
}
