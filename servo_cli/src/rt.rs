//! Real-time scheduling helpers (Linux SCHED_FIFO / mlockall).

use crate::cli::RtArgs;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(args: RtArgs) {
    use crate::cli::RtLock;
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param, sched_setscheduler};
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !args.rt {
        return;
    }

    #[inline]
    fn is_retryable_memlock_error(err: &std::io::Error) -> bool {
        matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
    }

    #[inline]
    fn memlock_limit_hint() -> Option<String> {
        let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
        // SAFETY: getrlimit only writes into the provided struct.
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        // SAFETY: rc == 0 means the struct was initialised.
        let cur = unsafe { rlim.assume_init() }.rlim_cur;
        if cur == libc::RLIM_INFINITY {
            Some("memlock limit: unlimited".to_string())
        } else {
            Some(format!("memlock limit: {} KiB", cur / 1024))
        }
    }

    fn try_apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
        let flags = match lock {
            RtLock::None => return Ok(()),
            RtLock::Current => libc::MCL_CURRENT,
            RtLock::All => libc::MCL_CURRENT | libc::MCL_FUTURE,
        };
        // SAFETY: mlockall has no memory-safety preconditions.
        if unsafe { libc::mlockall(flags) } == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        let mut msg = format!("mlockall failed: {err}");
        if is_retryable_memlock_error(&err) {
            if let Some(h) = memlock_limit_hint() {
                msg.push_str(&format!("; {h}"));
            }
            msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        }
        Err(eyre::eyre!(msg))
    }

    // Apply SCHED_FIFO priority, clamped to the system range.
    fn try_apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
        // SAFETY: plain queries without pointers.
        let (min, max) = unsafe { (sched_get_priority_min(SCHED_FIFO), sched_get_priority_max(SCHED_FIFO)) };
        let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
        let prio_val = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: prio_val,
        };
        // SAFETY: `param` outlives the call; pid 0 is the calling process.
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            return Err(eyre::eyre!(
                "{}; hint: needs CAP_SYS_NICE or root",
                std::io::Error::last_os_error()
            ));
        }
        Ok(prio_val)
    }

    RT_ONCE.get_or_init(|| {
        match try_apply_mem_lock(args.rt_lock) {
            Ok(()) => tracing::info!(lock = ?args.rt_lock, "rt: memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "rt: memory lock not applied"),
        }
        match try_apply_fifo_priority(args.rt_prio) {
            Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO enabled"),
            Err(err) => tracing::warn!(error = %err, "rt: SCHED_FIFO not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(args: RtArgs) {
    if args.rt {
        tracing::warn!("rt: real-time mode is only supported on Linux; ignoring --rt");
    }
}
