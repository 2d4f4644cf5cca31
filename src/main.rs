fn main() {
    if let Err(err) = vitalguard_lib::run() {
        log::error!("{err:?}");
        eprintln!("vitalguard: {err:#}");
        std::process::exit(1);
    }
}
