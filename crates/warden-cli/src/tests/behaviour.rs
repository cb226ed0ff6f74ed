//! BDD step definitions for CLI dispatch.
//!
//! These steps map scenarios in `tests/features/cli_dispatch.feature` to
//! invocations of the runtime against a daemon hosted in the test process.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::TestWorld;

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new().expect("test world"))
}

#[given("no daemon is running")]
fn given_no_daemon(world: &RefCell<TestWorld>) {
    let _ = world;
}

#[given("a running daemon")]
fn given_running_daemon(world: &RefCell<TestWorld>) {
    world
        .borrow_mut()
        .start_daemon()
        .expect("failed to start daemon");
}

#[given("a plugin \"{name}\" that exits with status {status}")]
fn given_plugin(world: &RefCell<TestWorld>, name: String, status: u8) {
    world
        .borrow()
        .install_plugin(&name, &format!("#!/bin/sh\nexit {status}\n"))
        .expect("failed to install plugin");
}

#[when("the operator runs \"{command}\"")]
fn when_operator_runs(world: &RefCell<TestWorld>, command: String) {
    world.borrow_mut().run(&command);
}

#[then("the CLI exits with code {status}")]
fn then_exit_code(world: &RefCell<TestWorld>, status: u8) {
    world
        .borrow()
        .assert_exit_code(status)
        .expect("exit code mismatch");
}

#[then("stdout is \"{expected}\"")]
fn then_stdout_is(world: &RefCell<TestWorld>, expected: String) {
    let stdout = world.borrow().stdout_text().expect("stdout text");
    assert_eq!(stdout.trim_end(), expected);
}

#[then("stdout contains \"{snippet}\"")]
fn then_stdout_contains(world: &RefCell<TestWorld>, snippet: String) {
    let stdout = world.borrow().stdout_text().expect("stdout text");
    assert!(
        stdout.contains(&snippet),
        "stdout {stdout:?} did not contain {snippet:?}"
    );
}

#[then("stderr contains \"{snippet}\"")]
fn then_stderr_contains(world: &RefCell<TestWorld>, snippet: String) {
    let stderr = world.borrow().stderr_text().expect("stderr text");
    assert!(
        stderr.contains(&snippet),
        "stderr {stderr:?} did not contain {snippet:?}"
    );
}

#[then("the daemon was launched {count} times")]
fn then_launch_count(world: &RefCell<TestWorld>, count: usize) {
    assert_eq!(world.borrow().launcher.launches(), count);
}

#[scenario(path = "tests/features/cli_dispatch.feature")]
fn cli_dispatch_behaviour(world: RefCell<TestWorld>) {
    let _ = world;
}
