//! Reference Count Lifecycle
//!
//! Native-style manual reference count. The count starts at one (the
//! reference implied by construction) and the transition to `Disposed`
//! happens exactly once, when the last reference is released.

use std::cell::Cell;

/// Lifecycle state of a reference-counted object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Alive with `n >= 1` outstanding references
    Live(u32),
    /// Count reached zero; the object must not be used again
    Disposed,
}

/// Outcome of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// References remain
    Remaining(u32),
    /// This release dropped the last reference; teardown must run now
    Disposed,
    /// The object was already disposed; nothing changed
    AlreadyDisposed,
}

impl Released {
    /// Count to report back to native code
    pub fn count(self) -> u32 {
        match self {
            Self::Remaining(n) => n,
            Self::Disposed | Self::AlreadyDisposed => 0,
        }
    }
}

/// Reference count owned by exactly one object.
///
/// Single-threaded: every AddRef/Release arrives on the UI thread.
#[derive(Debug)]
pub struct RefCount {
    state: Cell<Lifecycle>,
}

impl RefCount {
    pub fn new() -> Self {
        Self {
            state: Cell::new(Lifecycle::Live(1)),
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state.get()
    }

    /// Outstanding references, zero once disposed
    pub fn count(&self) -> u32 {
        match self.state.get() {
            Lifecycle::Live(n) => n,
            Lifecycle::Disposed => 0,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.get() == Lifecycle::Disposed
    }

    /// Take a reference. After disposal this is a logged no-op returning 0.
    pub fn add_ref(&self) -> u32 {
        match self.state.get() {
            Lifecycle::Live(n) => {
                let next = n.saturating_add(1);
                self.state.set(Lifecycle::Live(next));
                next
            }
            Lifecycle::Disposed => {
                tracing::warn!("AddRef on disposed object ignored");
                0
            }
        }
    }

    /// Drop a reference.
    pub fn release(&self) -> Released {
        match self.state.get() {
            Lifecycle::Live(1) => {
                self.state.set(Lifecycle::Disposed);
                Released::Disposed
            }
            Lifecycle::Live(n) => {
                self.state.set(Lifecycle::Live(n - 1));
                Released::Remaining(n - 1)
            }
            Lifecycle::Disposed => {
                tracing::warn!("Release on disposed object ignored");
                Released::AlreadyDisposed
            }
        }
    }

    /// Force the disposed state regardless of outstanding references.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn force_dispose(&self) -> bool {
        if self.is_disposed() {
            false
        } else {
            self.state.set(Lifecycle::Disposed);
            true
        }
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// xorshift64, deterministic per seed
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn test_starts_live_with_one() {
        let rc = RefCount::new();
        assert_eq!(rc.state(), Lifecycle::Live(1));
        assert_eq!(rc.count(), 1);
    }

    #[test]
    fn test_add_then_release() {
        let rc = RefCount::new();
        assert_eq!(rc.add_ref(), 2);
        assert_eq!(rc.release(), Released::Remaining(1));
        assert_eq!(rc.release(), Released::Disposed);
        assert!(rc.is_disposed());
    }

    #[test]
    fn test_after_disposal_is_noop() {
        let rc = RefCount::new();
        assert_eq!(rc.release(), Released::Disposed);
        assert_eq!(rc.add_ref(), 0);
        assert_eq!(rc.release(), Released::AlreadyDisposed);
        assert_eq!(rc.count(), 0);
    }

    #[test]
    fn test_random_interleavings_dispose_exactly_once() {
        for seed in 1..200u64 {
            let mut rng = Rng(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let rc = RefCount::new();
            let mut outstanding = 1u32;
            let mut adds = 1u32; // construction reference
            let mut releases = 0u32;
            let mut disposals = 0;

            for _ in 0..500 {
                if rng.next() % 2 == 0 {
                    if rc.is_disposed() {
                        break;
                    }
                    rc.add_ref();
                    outstanding += 1;
                    adds += 1;
                } else {
                    match rc.release() {
                        Released::Remaining(n) => {
                            outstanding -= 1;
                            releases += 1;
                            assert_eq!(n, outstanding);
                        }
                        Released::Disposed => {
                            releases += 1;
                            disposals += 1;
                            assert_eq!(releases, adds);
                        }
                        Released::AlreadyDisposed => {}
                    }
                }
            }

            while !rc.is_disposed() {
                if rc.release() == Released::Disposed {
                    disposals += 1;
                }
            }
            assert_eq!(rc.release(), Released::AlreadyDisposed);
            assert_eq!(disposals, 1, "seed {}", seed);
        }
    }

    #[test]
    fn test_force_dispose_once() {
        let rc = RefCount::new();
        rc.add_ref();
        assert!(rc.force_dispose());
        assert!(!rc.force_dispose());
        assert_eq!(rc.release(), Released::AlreadyDisposed);
    }
}
