//! The interpreter stack (§4.1, §5): a process-wide (here, per-thread) stack
//! of "main traces", each labeled with its level and the transform active at
//! that level. Pushed for the dynamic extent of a transform's call via a
//! scoped guard so a panic or an early `?` return still pops the frame,
//! using the same scoped-guard pattern the rest of this codebase relies on
//! for exception-safe push/pop pairs.

use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Jvp,
    Vmap,
    Jit,
}

#[derive(Debug, Clone, Copy)]
pub struct TraceFrame {
    pub level: usize,
    pub kind: TraceKind,
}

thread_local! {
    static STACK: RefCell<Vec<TraceFrame>> = const { RefCell::new(Vec::new()) };
}

/// Pops its frame on drop, including during unwinding, so a transform that
/// errors out mid-trace never leaves a stale frame behind (§5 "scoped
/// acquisition").
pub struct MainTraceGuard {
    level: usize,
}

impl MainTraceGuard {
    pub fn push(kind: TraceKind) -> MainTraceGuard {
        let level = STACK.with(|s| {
            let mut s = s.borrow_mut();
            let level = s.len();
            s.push(TraceFrame { level, kind });
            level
        });
        tracing::debug!(level, ?kind, "interpreter: push");
        MainTraceGuard { level }
    }
}

impl Drop for MainTraceGuard {
    fn drop(&mut self) {
        STACK.with(|s| {
            let mut s = s.borrow_mut();
            debug_assert_eq!(s.last().map(|f| f.level), Some(self.level));
            s.pop();
        });
        tracing::debug!(level = self.level, "interpreter: pop");
    }
}

/// The current stack depth (0 when no transform is active).
pub fn depth() -> usize {
    STACK.with(|s| s.borrow().len())
}

/// The kind of transform active at the topmost level, if any.
pub fn current_kind() -> Option<TraceKind> {
    STACK.with(|s| s.borrow().last().map(|f| f.kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_pops_on_drop() {
        assert_eq!(depth(), 0);
        {
            let _g = MainTraceGuard::push(TraceKind::Jvp);
            assert_eq!(depth(), 1);
            assert_eq!(current_kind(), Some(TraceKind::Jvp));
        }
        assert_eq!(depth(), 0);
    }

    #[test]
    fn guard_pops_even_when_body_panics() {
        let result = std::panic::catch_unwind(|| {
            let _g = MainTraceGuard::push(TraceKind::Vmap);
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(depth(), 0);
    }
}
