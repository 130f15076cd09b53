use std::process::ExitCode;

fn main() -> ExitCode {
    switchyard_cli::run()
}
