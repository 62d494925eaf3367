fn main() {
    if let Err(err) = chatwire::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
