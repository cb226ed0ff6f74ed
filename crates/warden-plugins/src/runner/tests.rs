//! Unit tests for the plugin runner.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use mockall::mock;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

mock! {
    Executor {}
    impl PluginExecutor for Executor {
        fn execute(
            &self,
            plugin: &PluginDescriptor,
            args: &[OsString],
            environment: &PluginEnvironment,
        ) -> Result<(), PluginError>;
    }
}

struct PluginRoot {
    dir: TempDir,
}

impl PluginRoot {
    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn add(&self, name: &str, mode: Option<u32>) {
        let plugin_dir = self.path().join(name);
        fs::create_dir(&plugin_dir).expect("create plugin dir");
        if let Some(bits) = mode {
            let entry = plugin_dir.join("run");
            fs::write(&entry, "#!/bin/sh\nexit 0\n").expect("write entry point");
            fs::set_permissions(&entry, fs::Permissions::from_mode(bits)).expect("chmod");
        }
    }
}

#[fixture]
fn root() -> PluginRoot {
    let root = PluginRoot {
        dir: tempfile::tempdir().expect("temp dir"),
    };
    root.add("good", Some(0o755));
    root.add("empty", None);
    root.add("plain", Some(0o644));
    root
}

fn environment() -> PluginEnvironment {
    PluginEnvironment::new("unix:///tmp/warden.sock", PathBuf::from("/usr/bin/warden"))
}

fn runner(root: &PluginRoot, executor: MockExecutor) -> PluginRunner<MockExecutor> {
    PluginRunner::new(PluginRegistry::discover(root.path()), environment(), executor)
}

#[rstest]
fn run_delegates_with_arguments(root: PluginRoot) {
    let mut executor = MockExecutor::new();
    let args = vec![OsString::from("--flag"), OsString::from("value")];
    let expected = args.clone();
    executor
        .expect_execute()
        .withf(move |plugin, passed, env| {
            plugin.name() == "good"
                && passed.iter().eq(expected.iter())
                && env.server_addr() == "unix:///tmp/warden.sock"
        })
        .once()
        .returning(|_, _, _| Ok(()));

    runner(&root, executor).run("good", &args).expect("run plugin");
}

#[rstest]
fn unknown_plugin_is_not_found(root: PluginRoot) {
    let mut executor = MockExecutor::new();
    executor.expect_execute().never();
    let error = runner(&root, executor)
        .run("missing", &[])
        .expect_err("must fail");
    assert!(matches!(error, PluginError::NotFound { .. }));
}

#[rstest]
#[case::absent("empty")]
#[case::not_executable("plain")]
fn broken_entry_point_fails_only_that_plugin(root: PluginRoot, #[case] broken: &str) {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|plugin, _, _| plugin.name() == "good")
        .once()
        .returning(|_, _, _| Ok(()));
    let runner = runner(&root, executor);

    let error = runner.run(broken, &[]).expect_err("broken plugin fails");
    assert!(matches!(
        error,
        PluginError::MissingEntryPoint { .. } | PluginError::NotExecutable { .. }
    ));
    runner.run("good", &[]).expect("healthy plugin still runs");
}

#[rstest]
fn executor_errors_propagate(root: PluginRoot) {
    let mut executor = MockExecutor::new();
    executor.expect_execute().once().returning(|plugin, _, _| {
        Err(PluginError::NonZeroExit {
            name: plugin.name().to_owned(),
            status: 3,
        })
    });
    let error = runner(&root, executor)
        .run("good", &[])
        .expect_err("must fail");
    assert!(matches!(error, PluginError::NonZeroExit { status: 3, .. }));
}
