fn main() {
    if let Err(err) = echodo_lib::run() {
        eprintln!("echodo: {err:#}");
        std::process::exit(1);
    }
}
