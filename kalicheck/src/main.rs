use clap::Parser;

use kalicheck::cli::Cli;
use kalicheck::exit_codes::ExitCode;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::InvalidInput,
            };
            std::process::exit(code.as_i32());
        }
    };

    let code = match kalicheck::app::run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::RuntimeError
        }
    };

    std::process::exit(code.as_i32());
}
