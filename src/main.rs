fn main() {
    if let Err(err) = backblast_import::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
