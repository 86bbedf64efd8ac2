use std::process::ExitCode;

fn main() -> ExitCode {
    tablebell_cli::run()
}
