use std::process::ExitCode;

fn main() -> ExitCode {
    slacklake_cli::run()
}
