//! Handlers for program table commands.

use std::env;
use std::ffi::OsStr;
use std::io::Write;
use std::iter;
use std::path::{Path, PathBuf};

use warden_rpc::{ProgramInfo, TailRequest};

use super::{AddArgs, TailArgs};
use crate::dispatch::{Deps, InvocationContext};
use crate::errors::AppError;
use crate::output::render_status_table;

pub(super) fn status<W: Write>(deps: &Deps<'_>, stdout: &mut W) -> Result<(), AppError> {
    let programs = deps.programs.status()?;
    render_status_table(&programs, stdout).map_err(AppError::Output)
}

pub(super) fn add<W: Write>(deps: &Deps<'_>, args: AddArgs, stdout: &mut W) -> Result<(), AppError> {
    let program = program_info(deps.context, args)?;
    let message = deps.programs.create(program)?;
    writeln!(stdout, "{message}").map_err(AppError::Output)
}

pub(super) fn start<W: Write>(deps: &Deps<'_>, name: &str, stdout: &mut W) -> Result<(), AppError> {
    let message = deps.programs.start(name)?;
    writeln!(stdout, "{message}").map_err(AppError::Output)
}

pub(super) fn stop<W: Write>(deps: &Deps<'_>, name: &str, stdout: &mut W) -> Result<(), AppError> {
    let message = deps.programs.stop(name)?;
    writeln!(stdout, "{message}").map_err(AppError::Output)
}

pub(super) fn tail<W: Write>(deps: &Deps<'_>, args: TailArgs, stdout: &mut W) -> Result<(), AppError> {
    let request = TailRequest {
        name: args.name,
        number: args.number,
        follow: args.follow,
    };
    deps.programs.tail(request, |line| {
        writeln!(stdout, "{line}")?;
        stdout.flush()
    })?;
    Ok(())
}

/// Builds the program definition submitted by `add`: the executable is
/// resolved to an absolute path and the caller's working directory becomes
/// the program's.
fn program_info(context: &InvocationContext<'_>, args: AddArgs) -> Result<ProgramInfo, AppError> {
    let mut command = args.command.into_iter();
    let executable = command.next().ok_or(AppError::MissingCommand)?;
    let name = match args.name {
        Some(name) => name,
        None => default_name(&executable)?,
    };
    let resolved = resolve_executable(
        &executable,
        &context.working_dir,
        context.search_path.as_deref(),
    )?;
    let directory = path_to_string(context.working_dir.clone())?;
    Ok(ProgramInfo {
        name,
        directory,
        command: iter::once(resolved).chain(command).collect(),
        environ: args.env,
    })
}

fn default_name(executable: &str) -> Result<String, AppError> {
    Path::new(executable)
        .file_name()
        .and_then(OsStr::to_str)
        .map(str::to_owned)
        .ok_or_else(|| AppError::UnnamedProgram {
            command: executable.to_owned(),
        })
}

/// Resolves `program` the way a shell would: names containing `/` are taken
/// relative to `working_dir`, bare names are looked up on `search_path`.
/// The result is absolute.
fn resolve_executable(
    program: &str,
    working_dir: &Path,
    search_path: Option<&OsStr>,
) -> Result<String, AppError> {
    let found = if program.contains('/') {
        Some(working_dir.join(program)).filter(|path| is_executable(path))
    } else {
        search_path
            .into_iter()
            .flat_map(env::split_paths)
            .map(|dir| working_dir.join(dir).join(program))
            .find(|path| is_executable(path))
    };
    let path = found.ok_or_else(|| AppError::ExecutableNotFound {
        program: program.to_owned(),
    })?;
    path_to_string(path.components().collect())
}

fn path_to_string(path: PathBuf) -> Result<String, AppError> {
    path.into_os_string()
        .into_string()
        .map_err(|raw| AppError::NonUtf8Path {
            path: PathBuf::from(raw),
        })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
