//! DittoBase CLI entry point
//!
//! Parses arguments and dispatches via `cli::run`. Failures are printed as a
//! JSON error line and the process exits non-zero.

use dittobase::cli;

fn main() {
    if let Err(e) = cli::run() {
        if cli::write_error(e.code_str(), e.message()).is_err() {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}
