use std::path::PathBuf;

const HELP: &str = "Telex - A Reddit client for the terminal.

Usage: telex [OPTIONS]

  --config <PATH>      Read settings from PATH instead of the default config file
  --offline            Browse sample data without signing in
  --logout             Forget the stored Reddit session and exit
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

enum Action {
    Run(telex::RunOptions),
    Exit,
}

fn main() {
    let action = match parse_args(std::env::args().skip(1)) {
        Ok(action) => action,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Action::Run(opts) = action {
        if let Err(err) = telex::run_with(opts) {
            eprintln!("error: {err:?}");
            std::process::exit(1);
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Action, String> {
    let mut opts = telex::RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Telex {}", telex::VERSION);
                return Ok(Action::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Action::Exit);
            }
            "--logout" => {
                match telex::app::logout() {
                    Ok(true) => println!("Signed out of Reddit."),
                    Ok(false) => println!("No stored session."),
                    Err(err) => {
                        eprintln!("Logout failed: {err:?}");
                        std::process::exit(1);
                    }
                }
                return Ok(Action::Exit);
            }
            "--offline" => opts.offline = true,
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config needs a path".to_string())?;
                opts.config_file = Some(PathBuf::from(path));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    opts.config_file = Some(PathBuf::from(path));
                } else {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }
    }
    Ok(Action::Run(opts))
}
