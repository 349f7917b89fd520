// SPDX-License-Identifier: MIT

//! Fixture for the socket-pair integration test: writes one byte to fd 5,
//! then reads one byte back, exiting 0 only if both succeed. Two instances
//! of this binary wired to opposite ends of the same socket pair exercise a
//! request/response round trip without needing an external peer.

use std::io::{Read, Write};
use std::os::fd::FromRawFd;

fn main() {
    let mut sock = unsafe { std::fs::File::from_raw_fd(5) };
    if sock.write_all(&[0x42]).is_err() {
        std::process::exit(1);
    }
    let mut buf = [0u8; 1];
    match sock.read_exact(&mut buf) {
        Ok(()) => std::process::exit(0),
        Err(_) => std::process::exit(1),
    }
}
