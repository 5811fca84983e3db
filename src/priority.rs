//! Best-effort worker-thread priority adjustment.
//!
//! The reference implementation reads the calling thread's POSIX
//! scheduling parameters and spawns workers with `sched_priority`
//! lowered by a caller-supplied offset, so that workers for
//! smaller/tighter-deadline sections preempt workers for larger ones
//! (spec §4.F `CreateThread`, §9 "Priority-manipulating thread
//! creation"). Rust has no portable equivalent, so this is implemented
//! as a platform-gated helper: it succeeds on Unix via `libc`, and
//! degrades to a no-op (logged once) everywhere else, per §9's
//! "failure to set the priority downgrades to best-effort cooperative
//! scheduling" guidance.

/// Lowers the calling thread's scheduling priority by `relative_offset`
/// levels (1-based; larger offsets mean lower priority, matching the
/// reference implementation's `schedParam.sched_priority -=
/// relativeThreadPriority`). Returns `true` if the adjustment was
/// applied, `false` if the platform does not support it or the
/// underlying syscall failed.
pub fn lower_current_thread_priority(relative_offset: i32) -> bool {
    imp::lower_current_thread_priority(relative_offset)
}

#[cfg(unix)]
mod imp {
    use log::warn;

    pub fn lower_current_thread_priority(relative_offset: i32) -> bool {
        unsafe {
            let current = libc::pthread_self();
            let mut policy: libc::c_int = 0;
            let mut param: libc::sched_param = std::mem::zeroed();

            if libc::pthread_getschedparam(current, &raw mut policy, &raw mut param) != 0 {
                warn!("pthread_getschedparam failed; worker priority left at default");
                return false;
            }

            // POSIX: lower sched_priority means lower priority under
            // SCHED_FIFO/SCHED_RR, which is what the reference
            // implementation relies on. Under the default SCHED_OTHER
            // the adjustment is accepted but has no practical effect;
            // that is the "best-effort cooperative scheduling" fallback.
            param.sched_priority = (param.sched_priority - relative_offset).max(0);

            if libc::pthread_setschedparam(current, policy, &raw const param) != 0 {
                warn!("pthread_setschedparam failed; worker priority left at default");
                return false;
            }
            true
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use log::warn;
    use std::sync::Once;

    static WARN_ONCE: Once = Once::new();

    pub fn lower_current_thread_priority(_relative_offset: i32) -> bool {
        WARN_ONCE.call_once(|| {
            warn!(
                "worker thread priority is not supported on this platform; falling back to \
                 cooperative scheduling"
            );
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_does_not_panic() {
        // Either true (applied) or false (unsupported/failed) is a
        // valid outcome; the call must never panic.
        let _ = lower_current_thread_priority(1);
    }
}
