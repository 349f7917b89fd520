// SPDX-License-Identifier: MIT

//! Fixture for the two-node pipeline integration test: spawns `echo hello`
//! piping into `cat` and waits for both. Run as a real, separate process
//! rather than inline in the test binary, since the scenario is about an
//! unrelated descriptor (this process's own stdout) reaching `cat`
//! untouched, and every other test in the library shares the real stdout
//! of its own process.

use pipegraph::{GraphBuilder, NodeBuilder, Reaper, Spawner};

fn main() {
    let graph = GraphBuilder::new()
        .node(NodeBuilder::new(["echo", "hello"]).output(1, "p"))
        .node(NodeBuilder::new(["cat"]).input(0, "p"))
        .build()
        .expect("graph should validate");

    let mut spawner = Spawner::new(&graph).expect("spawner construction should succeed");
    spawner.spawn_all(&graph).expect("both nodes should spawn");
    spawner.close_fds();
    let statuses = Reaper::new(spawner.children()).join().expect("join should succeed");

    let ok = statuses.values().all(|s| s.success());
    std::process::exit(if ok { 0 } else { 1 });
}
