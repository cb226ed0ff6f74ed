//! Crate-level integration and BDD tests.

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::environment::PluginEnvironment;
use crate::error::PluginError;
use crate::process::ProcessExecutor;
use crate::registry::PluginRegistry;
use crate::runner::PluginRunner;


const RECORDING_SCRIPT: &str = r#"#!/bin/sh
{
  pwd -P
  printf '%s\n' "$WARDEN_SERVER_ADDR" "$WARDEN_PLUGIN_NAME" "$WARDEN_PROGRAM"
  printf '%s\n' "$@"
} > invocation.txt
"#;

/// Creates `<root>/<name>/run` with the given script body.
pub(crate) fn install_plugin(root: &Path, name: &str, script: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("create plugin dir");
    let entry = dir.join("run");
    fs::write(&entry, script).expect("write entry point");
    fs::set_permissions(&entry, fs::Permissions::from_mode(0o755)).expect("chmod entry point");
    dir
}

fn process_runner(root: &TempDir) -> PluginRunner<ProcessExecutor> {
    PluginRunner::new(
        PluginRegistry::discover(root.path()),
        PluginEnvironment::new("tcp://127.0.0.1:11313", PathBuf::from("/opt/bin/warden")),
        ProcessExecutor,
    )
}

#[test]
fn plugin_receives_arguments_environment_and_directory() {
    let root = tempfile::tempdir().expect("temp dir");
    let dir = install_plugin(root.path(), "record", RECORDING_SCRIPT);

    process_runner(&root)
        .run(
            "record",
            &[OsString::from("--verbose"), OsString::from("two words")],
        )
        .expect("run plugin");

    let recorded = fs::read_to_string(dir.join("invocation.txt")).expect("read invocation");
    let canonical = fs::canonicalize(&dir).expect("canonical plugin dir");
    let expected = format!(
        "{}\ntcp://127.0.0.1:11313\nrecord\n/opt/bin/warden\n--verbose\ntwo words\n",
        canonical.display()
    );
    assert_eq!(recorded, expected);
}

#[test]
fn non_zero_exit_is_reported_with_status() {
    let root = tempfile::tempdir().expect("temp dir");
    install_plugin(root.path(), "fail", "#!/bin/sh\nexit 7\n");

    let error = process_runner(&root)
        .run("fail", &[])
        .expect_err("plugin fails");
    assert!(matches!(error, PluginError::NonZeroExit { status: 7, .. }));
}

#[test]
fn signal_termination_is_reported() {
    let root = tempfile::tempdir().expect("temp dir");
    install_plugin(root.path(), "killed", "#!/bin/sh\nkill -9 $$\n");

    let error = process_runner(&root)
        .run("killed", &[])
        .expect_err("plugin is killed");
    assert!(matches!(
        error,
        PluginError::Terminated {
            signal: Some(9),
            ..
        }
    ));
}

#[test]
fn unexecutable_script_interpreter_fails_to_spawn() {
    let root = tempfile::tempdir().expect("temp dir");
    install_plugin(root.path(), "broken", "#!/nonexistent/interpreter\n");

    let error = process_runner(&root)
        .run("broken", &[])
        .expect_err("spawn fails");
    assert!(matches!(error, PluginError::SpawnFailed { .. }));
}
