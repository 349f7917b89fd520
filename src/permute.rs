//! The descriptor permutation engine.
//!
//! Given a mapping `target slot -> current fd`, rearranges a process's
//! descriptor table so each target slot holds the object its current fd
//! referred to, without disturbing anything outside the mapping's domain
//! and range. Runs entirely inside the child, between `fork` and `exec`.

use std::collections::HashMap;
use std::os::fd::RawFd;

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::{dup, dup2_raw};

use crate::error::SpawnError;

fn set_cloexec(fd: RawFd, value: bool) -> Result<(), SpawnError> {
    let flags = if value { FdFlag::FD_CLOEXEC } else { FdFlag::empty() };
    fcntl(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }, FcntlArg::F_SETFD(flags))
        .map(drop)
        .map_err(|e| SpawnError::DescriptorRewrite {
            slot: fd as u32,
            source: e.into(),
        })
}

/// A single `target -> current` fd rearrangement, pending application.
pub struct FdPermutation {
    /// (target, current) pairs; current is rewritten in place as sources get
    /// settled into their targets.
    entries: Vec<(RawFd, RawFd)>,
}

impl FdPermutation {
    pub fn new(mapping: HashMap<u32, RawFd>) -> Self {
        let entries = mapping
            .into_iter()
            .map(|(target, current)| (target as RawFd, current))
            .collect();
        FdPermutation { entries }
    }

    /// Apply the mapping, consuming it. On success every target slot named
    /// in the original mapping holds the object its current fd named on
    /// entry, marked inheritable; everything else is untouched.
    pub fn apply(mut self) -> Result<(), SpawnError> {
        for i in 0..self.entries.len() {
            let (target, current) = self.entries[i];
            if current == target {
                continue;
            }

            // If some other entry still needs `target` as a source, save it
            // first so overwriting `target` below doesn't lose it.
            if self.entries.iter().any(|&(t, c)| t != target && c == target) {
                let saved =
                    dup(unsafe { std::os::fd::BorrowedFd::borrow_raw(target) }).map_err(|e| {
                        SpawnError::DescriptorRewrite {
                            slot: target as u32,
                            source: e.into(),
                        }
                    })?;
                let saved_raw = std::os::fd::IntoRawFd::into_raw_fd(saved);
                // `dup` leaves the duplicate inheritable by default; the
                // engine's contract requires every fd it creates to start
                // non-inheritable.
                set_cloexec(saved_raw, true)?;
                for entry in &mut self.entries {
                    if entry.1 == target {
                        entry.1 = saved_raw;
                    }
                }
            }

            // SAFETY: `target` is about to become the sole owner of a fresh
            // duplicate of `current`; any previous occupant of `target` was
            // already relocated above if another entry still needed it.
            let duplicated =
                unsafe { dup2_raw(std::os::fd::BorrowedFd::borrow_raw(current), target) }
                    .map_err(|e| SpawnError::DescriptorRewrite {
                        slot: target as u32,
                        source: e.into(),
                    })?;
            // `target` now owns its own slot; nothing else may close it.
            std::mem::forget(duplicated);
            // `dup2` clears close-on-exec on the destination by default;
            // restore it here so a later failed iteration can't leak this
            // slot into an exec that never should have seen it. The final
            // `mark_inheritable` pass clears it again for the slots that
            // really are meant to survive exec.
            set_cloexec(target, true)?;

            for entry in &mut self.entries {
                if entry.1 == current {
                    entry.1 = target;
                }
            }
            self.entries[i] = (target, target);
        }
        Ok(())
    }
}

/// Clear close-on-exec on exactly the given slots, so `exec` inherits them.
pub fn mark_inheritable(slots: &[u32]) -> Result<(), SpawnError> {
    for &slot in slots {
        set_cloexec(slot as RawFd, false)?;
    }
    Ok(())
}
