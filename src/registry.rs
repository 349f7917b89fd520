//! Owns every parent-held pipe and socket endpoint, creating them lazily.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use nix::unistd::pipe2;
use nix::fcntl::OFlag;

use crate::diagnostic::Diagnostic;
use crate::error::SpawnError;

/// Parent-side store of pipe reading/writing ends and unclaimed socket-pair
/// ends, lazily populated as node-level fd maps reference names.
pub struct EndpointRegistry {
    reading_ends: HashMap<String, OwnedFd>,
    writing_ends: HashMap<String, OwnedFd>,
    socket_other_ends: HashMap<String, OwnedFd>,
    socket_use_count: HashMap<String, u32>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        EndpointRegistry {
            reading_ends: HashMap::new(),
            writing_ends: HashMap::new(),
            socket_other_ends: HashMap::new(),
            socket_use_count: HashMap::new(),
        }
    }

    /// Register a parent-supplied fd that feeds pipe `name` to its readers.
    pub fn register_input(&mut self, name: String, fd: RawFd) -> Result<(), SpawnError> {
        set_cloexec(fd)?;
        // SAFETY: the caller hands us ownership of a pre-existing fd.
        // `Graph.inputs[name]` is the fd children reading `name` will see,
        // so it populates `reading_ends` despite the parameter being named
        // for the graph-level direction it feeds.
        self.reading_ends.insert(name, unsafe { OwnedFd::from_raw_fd(fd) });
        Ok(())
    }

    /// Register a parent-supplied fd that drains pipe `name` from its
    /// writers.
    pub fn register_output(&mut self, name: String, fd: RawFd) -> Result<(), SpawnError> {
        set_cloexec(fd)?;
        self.writing_ends.insert(name, unsafe { OwnedFd::from_raw_fd(fd) });
        Ok(())
    }

    /// Register a parent-supplied pre-existing socket endpoint under
    /// `name`. The first `take_socket_end` call for this name returns it
    /// directly, as though it were the kept half of a pair created here.
    pub fn register_socket(&mut self, name: String, fd: RawFd) -> Result<(), SpawnError> {
        set_cloexec(fd)?;
        self.socket_other_ends
            .insert(name, unsafe { OwnedFd::from_raw_fd(fd) });
        Ok(())
    }

    /// Return the cached reading end for `name`, creating the pipe on first
    /// reference.
    pub fn reading_end_fd(&mut self, name: &str) -> Result<RawFd, SpawnError> {
        if !self.reading_ends.contains_key(name) {
            self.make_pipe(name)?;
        }
        Ok(self.reading_ends[name].as_raw_fd())
    }

    /// Return the cached writing end for `name`, creating the pipe on first
    /// reference.
    pub fn writing_end_fd(&mut self, name: &str) -> Result<RawFd, SpawnError> {
        if !self.writing_ends.contains_key(name) {
            self.make_pipe(name)?;
        }
        Ok(self.writing_ends[name].as_raw_fd())
    }

    fn make_pipe(&mut self, name: &str) -> Result<(), SpawnError> {
        let (read, write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| SpawnError::Pipe {
                pipe: name.to_string(),
                source: e.into(),
            })?;
        self.reading_ends.insert(name.to_string(), read);
        self.writing_ends.insert(name.to_string(), write);
        Ok(())
    }

    /// Claim one end of socket `name`. The first call for a name creates the
    /// socket pair and returns one end, keeping the other; the second call
    /// pops and returns the kept end. The returned fd is owned by the caller
    /// (typically transferred to a child across fork then closed in the
    /// parent).
    pub fn take_socket_end(&mut self, name: &str, diag: &dyn Diagnostic) -> Result<OwnedFd, SpawnError> {
        let uses = self.socket_use_count.entry(name.to_string()).or_insert(0);
        *uses += 1;
        if *uses > 2 {
            diag.warn(&format!("socket '{name}' claimed more than twice"));
        }

        if let Some(kept) = self.socket_other_ends.remove(name) {
            return Ok(kept);
        }

        let (first, second) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_CLOEXEC,
        )
        .map_err(|e| SpawnError::SocketPair {
            socket: name.to_string(),
            source: e.into(),
        })?;
        self.socket_other_ends.insert(name.to_string(), second);
        Ok(first)
    }

    /// Close every currently held reading/writing end; warn about and close
    /// any lingering (orphaned) socket end.
    pub fn close_all(&mut self, diag: &dyn Diagnostic) {
        self.writing_ends.clear();
        self.reading_ends.clear();
        for (name, fd) in self.socket_other_ends.drain() {
            diag.warn(&format!(
                "socket '{name}' never claimed by a peer; closing orphaned end"
            ));
            drop(fd);
        }
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn set_cloexec(fd: RawFd) -> Result<(), SpawnError> {
    fcntl(
        unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) },
        FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC),
    )
    .map(drop)
    .map_err(|e| SpawnError::DescriptorRewrite {
        slot: fd as u32,
        source: e.into(),
    })
}
