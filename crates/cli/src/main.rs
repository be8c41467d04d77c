use std::process::ExitCode;

fn main() -> ExitCode {
    bogbot_cli::run()
}
