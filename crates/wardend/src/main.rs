use std::process::ExitCode;

use ortho_config::OrthoConfig;
use warden_config::{Config, Settings};

fn main() -> ExitCode {
    let settings = match Config::load()
        .map_err(|error| error.to_string())
        .and_then(|config| Settings::from_config(&config).map_err(|error| error.to_string()))
    {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("wardend: {message}");
            return ExitCode::FAILURE;
        }
    };
    match wardend::run_daemon(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("wardend: {error}");
            ExitCode::FAILURE
        }
    }
}
