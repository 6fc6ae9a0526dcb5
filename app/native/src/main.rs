//! Winstate - replay window and application scenarios from the command line.

fn main() {
    if let Err(err) = winstate::cli::run() {
        eprintln!("winstate: {err}");
        std::process::exit(1);
    }
}
