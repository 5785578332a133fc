use thiserror::Error;


/// Upper bound on layer identities while the detector is enabled.
///
/// The transition table is quadratic in this bound, so it is kept modest.
pub const MAX_LAYERS: usize = 100;

/// Upper bound on the number of guards one thread can hold at a time while
/// the detector is enabled.
pub const MAX_DEPTH: usize = 16;

/// A fatal misuse of the lock hierarchy.
///
/// Violations are reported together with a dump of the detecting thread's
/// lock trace. The process aborts, or panics with the `Violation` value as
/// payload when the `throw-on-deadlock` feature is enabled, so a caller
/// catching the panic can downcast and match on the violation kind.
#[derive(Debug, Error)]
pub enum Violation {
    /// A thread tried to hold more than [`MAX_DEPTH`] guards at once.
    #[error("lock trace depth exceeded {MAX_DEPTH} acquiring layer {layer}")]
    DepthOverflow { layer: &'static str },
    /// A release was recorded on a thread holding no guards. This indicates
    /// broken guard bookkeeping, not caller misuse.
    #[error("unbalanced release on layer {layer} with an empty lock trace")]
    UnbalancedRelease { layer: &'static str },
    /// One thread acquired the same layer twice. Sequential single
    /// acquisitions on one layer have no ordering guarantee across
    /// addresses, so this is refused even when the two targets differ.
    #[error("recursive acquisition on layer {layer}")]
    Recursion { layer: &'static str },
    /// Two layers have been acquired in both orders over the process's
    /// history. The inversion need not be concurrent to be reported; a
    /// latent cycle is a bug before it ever hangs.
    #[error("lock-order inversion between layers {earlier} and {later}")]
    Inversion {
        earlier: &'static str,
        later: &'static str,
    },
}

#[cfg(feature = "deadlock-detection")]
mod enabled {
    use {
        super::{MAX_DEPTH, MAX_LAYERS, Violation},
        crate::layer::LayerCore,
        std::{
            cell::RefCell,
            fmt::Write as _,
            sync::{
                OnceLock,
                atomic::{AtomicU8, Ordering::Relaxed},
            },
        },
    };

    const UNSEEN: u8 = 0;
    const HIGH_THEN_LOW: u8 = 1;
    const LOW_THEN_HIGH: u8 = 2;

    #[derive(Copy, Clone)]
    struct Frame {
        layer_id: usize,
        layer_name: &'static str,
        site: Option<&'static str>,
    }

    const EMPTY_FRAME: Frame = Frame {
        layer_id: 0,
        layer_name: "",
        site: None,
    };

    struct Trace {
        frames: [Frame; MAX_DEPTH],
        top: usize,
    }

    thread_local! {
        static TRACE: RefCell<Trace> = const {
            RefCell::new(Trace {
                frames: [EMPTY_FRAME; MAX_DEPTH],
                top: 0,
            })
        };
    }

    /// One cell per unordered layer pair. Aligned to a cache line so that
    /// unrelated pairs never contend on the same line.
    #[repr(C, align(64))]
    struct TransitionCell(AtomicU8);

    static TRANSITIONS: OnceLock<Box<[TransitionCell]>> = OnceLock::new();

    fn transitions() -> &'static [TransitionCell] {
        TRANSITIONS.get_or_init(|| {
            (0..MAX_LAYERS * MAX_LAYERS)
                .map(|_| TransitionCell(AtomicU8::new(UNSEEN)))
                .collect()
        })
    }

    pub(crate) fn check_layer_id(id: usize) {
        assert!(
            id < MAX_LAYERS,
            "layer limit exceeded: id {id} does not fit the transition table bound {MAX_LAYERS}",
        );
    }

    pub(crate) fn on_acquire(core: &LayerCore, site: Option<&'static str>) {
        TRACE.with(|trace| {
            let mut trace = trace.borrow_mut();
            let top = trace.top;
            if top == MAX_DEPTH {
                fail(Violation::DepthOverflow { layer: core.name }, &trace);
            }
            trace.frames[top] = Frame {
                layer_id: core.id,
                layer_name: core.name,
                site,
            };
            trace.top = top + 1;
            if top == 0 {
                return;
            }
            let prev = trace.frames[top - 1];
            if prev.layer_id == core.id {
                // The offending frame is removed before reporting so that a
                // caller catching the panic is left with a balanced trace.
                trace.top = top;
                fail(Violation::Recursion { layer: core.name }, &trace);
            }
            let (lo, hi) = if prev.layer_id < core.id {
                (prev.layer_id, core.id)
            } else {
                (core.id, prev.layer_id)
            };
            let dir = if prev.layer_id > core.id {
                HIGH_THEN_LOW
            } else {
                LOW_THEN_HIGH
            };
            let seen = transitions()[lo * MAX_LAYERS + hi].0.swap(dir, Relaxed);
            if seen != UNSEEN && seen != dir {
                trace.top = top;
                fail(
                    Violation::Inversion {
                        earlier: prev.layer_name,
                        later: core.name,
                    },
                    &trace,
                );
            }
        });
    }

    pub(crate) fn on_release(core: &LayerCore) {
        TRACE.with(|trace| {
            let mut trace = trace.borrow_mut();
            let top = trace.top;
            if top == 0 {
                fail(Violation::UnbalancedRelease { layer: core.name }, &trace);
            }
            trace.top = top - 1;
        });
    }

    /// Renders the current thread's trace the way violation reports do.
    #[cfg(test)]
    pub(crate) fn trace_dump() -> String {
        TRACE.with(|trace| render(&trace.borrow()))
    }

    fn render(trace: &Trace) -> String {
        let mut dump = String::from("lock trace, bottom to top:");
        if trace.top == 0 {
            dump.push_str("\n  (empty)");
        }
        for (depth, frame) in trace.frames[..trace.top].iter().enumerate() {
            let _ = write!(
                dump,
                "\n  [{depth}] layer {:?} (id {})",
                frame.layer_name, frame.layer_id,
            );
            if let Some(site) = frame.site {
                let _ = write!(dump, " acquired at {site}");
            }
        }
        dump
    }

    /// Reports the violation with a rendered trace. The trace dump goes to
    /// diagnostics; the panic payload is the `Violation` itself so that
    /// callers can downcast and match on it.
    fn fail(violation: Violation, trace: &Trace) -> ! {
        let dump = render(trace);
        tracing::error!(%violation, "{dump}");
        #[cfg(feature = "throw-on-deadlock")]
        std::panic::panic_any(violation);
        #[cfg(not(feature = "throw-on-deadlock"))]
        {
            eprintln!("{violation}\n{dump}");
            std::process::abort();
        }
    }
}

#[cfg(feature = "deadlock-detection")]
pub(crate) use enabled::{check_layer_id, on_acquire, on_release};

#[cfg(not(feature = "deadlock-detection"))]
mod disabled {
    use crate::layer::LayerCore;

    #[inline(always)]
    pub(crate) fn check_layer_id(_id: usize) {}

    #[inline(always)]
    pub(crate) fn on_acquire(_core: &LayerCore, _site: Option<&'static str>) {}

    #[inline(always)]
    pub(crate) fn on_release(_core: &LayerCore) {}
}

#[cfg(not(feature = "deadlock-detection"))]
pub(crate) use disabled::{check_layer_id, on_acquire, on_release};
