//! termcore CLI entry point
//!
//! Parses arguments and dispatches to the CLI module, which reports errors
//! as JSON on stderr. A failed command exits non-zero.

use termcore::cli;

fn main() {
    if cli::run().is_err() {
        std::process::exit(1);
    }
}
