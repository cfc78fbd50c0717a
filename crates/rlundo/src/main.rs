#![forbid(unsafe_code)]

//! rlundo binary entry point.

use rlundo::cli::{self, Mode};
use rlundo::{repl, wrap};
use rlundo_core::config::UndoConfig;
use rlundo_core::logging;

fn main() {
    let mode = match cli::parse(std::env::args().skip(1)) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("rlundo: {e}\n\n{}", cli::HELP_TEXT);
            std::process::exit(2);
        }
    };

    match mode {
        Mode::Help => {
            println!("{}", cli::HELP_TEXT);
            return;
        }
        Mode::Version => {
            println!("rlundo {}", cli::VERSION);
            return;
        }
        _ => {}
    }

    let config = match UndoConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rlundo: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init(&config) {
        eprintln!("rlundo: cannot start logging: {e}");
        std::process::exit(2);
    }

    let code = match mode {
        Mode::Repl => repl::run(&config),
        Mode::Wrap(argv) => wrap::run(&config, &argv),
        Mode::WrapSelf => match std::env::current_exe() {
            Ok(exe) => wrap::run(
                &config,
                &[exe.to_string_lossy().into_owned(), "repl".to_string()],
            ),
            Err(e) => {
                eprintln!("rlundo: cannot locate own executable: {e}");
                1
            }
        },
        Mode::Help | Mode::Version => 0,
    };
    std::process::exit(code);
}
