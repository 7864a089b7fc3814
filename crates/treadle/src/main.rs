use std::process::ExitCode;

fn main() -> ExitCode {
    match treadle::run_worker() {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("treadle: {error}");
            ExitCode::FAILURE
        }
    }
}
