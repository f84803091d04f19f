//! life - personal items in a Notion database

use std::process::ExitCode;

fn main() -> ExitCode {
    match life::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = life::error_kind(&e);
            eprintln!("Error [{}]: {:#}", kind.as_str(), e);
            ExitCode::from(kind.exit_code())
        }
    }
}
