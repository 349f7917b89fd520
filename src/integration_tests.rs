//! End-to-end scenarios that fork real system utilities, exercising the
//! whole validate/spawn/close/join path rather than any single component
//! in isolation. Two scenarios need a standalone fixture binary instead,
//! since observing a child that inherits the *real* stdout of the test
//! process, or talks over a socket pair, only works safely out-of-process;
//! those live in `tests/socket_scenarios.rs` and `tests/pipeline_scenarios.rs`,
//! where `CARGO_BIN_EXE_*` is populated.

use std::os::fd::IntoRawFd;

use nix::sys::signal::Signal;

use crate::graph::{GraphBuilder, NodeBuilder};
use crate::reaper::Reaper;
use crate::spawner::Spawner;
use crate::FORK_TEST_LOCK;

#[test]
fn fan_in_merge_three_writers_into_one_reader() {
    use std::io::{Read, Seek, SeekFrom};

    let _guard = FORK_TEST_LOCK.lock().unwrap();

    // A scratch file rather than a pipe: the reader's output is collected
    // for inspection after the fact instead of streamed live. The graph
    // takes ownership of a dup of the fd; this test keeps the original to
    // read back from once every node has exited.
    let mut result_file = tempfile::tempfile().unwrap();
    let result_dup = nix::unistd::dup(&result_file).unwrap();

    let mut builder = GraphBuilder::new().output("result", result_dup.into_raw_fd());
    for _ in 0..3 {
        builder = builder.node(
            NodeBuilder::new(["sh", "-c", "for i in 1 2 3 4 5 6 7 8 9 10; do echo line; done"])
                .output(1, "m"),
        );
    }
    builder = builder.node(NodeBuilder::new(["wc", "-l"]).input(0, "m").output(1, "result"));
    let graph = builder.build().unwrap();

    let mut spawner = Spawner::new(&graph).unwrap();
    spawner.spawn_all(&graph).unwrap();
    spawner.close_fds();
    let statuses = Reaper::new(spawner.children()).join().unwrap();
    assert!(statuses.values().all(|s| s.success()));

    result_file.seek(SeekFrom::Start(0)).unwrap();
    let mut out = String::new();
    result_file.read_to_string(&mut out).unwrap();
    assert_eq!(out.trim().parse::<u32>().unwrap(), 30);
}

#[test]
fn slot_conflict_reports_the_colliding_slot() {
    let err = GraphBuilder::new()
        .node(NodeBuilder::new(["true"]).input(3, "a").output(3, "b"))
        .build()
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains('3'), "expected slot 3 mentioned: {message}");
}

#[test]
fn direction_conflict_reports_the_pipe_name() {
    let err = GraphBuilder::new()
        .input("x", 7)
        .node(NodeBuilder::new(["true"]).output(1, "x"))
        .build()
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains('x'), "expected pipe 'x' mentioned: {message}");
}

#[test]
fn kill_all_terminates_still_running_children() {
    let _guard = FORK_TEST_LOCK.lock().unwrap();
    let graph = GraphBuilder::new()
        .node(NodeBuilder::new(["sleep", "30"]))
        .build()
        .unwrap();

    let mut spawner = Spawner::new(&graph).unwrap();
    spawner.spawn_all(&graph).unwrap();
    spawner.close_fds();
    let reaper = Reaper::new(spawner.children());
    reaper.kill_all(Signal::SIGKILL).unwrap();
    let statuses = reaper.join().unwrap();
    assert_eq!(statuses.len(), 1);
    assert!(!statuses.values().next().unwrap().success());
}

#[test]
fn empty_graph_joins_immediately() {
    let _guard = FORK_TEST_LOCK.lock().unwrap();
    let graph = GraphBuilder::new().build().unwrap();
    let mut spawner = Spawner::new(&graph).unwrap();
    spawner.spawn_all(&graph).unwrap();
    spawner.close_fds();
    let statuses = Reaper::new(spawner.children()).join().unwrap();
    assert!(statuses.is_empty());
}
