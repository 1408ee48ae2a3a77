use std::process::ExitCode;

fn main() -> ExitCode {
    outpass_cli::run()
}
