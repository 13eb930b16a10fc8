use std::process::ExitCode;

fn main() -> ExitCode {
    loadquote_cli::run()
}
