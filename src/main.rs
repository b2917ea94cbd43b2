fn main() {
    if let Err(err) = formsync::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
