use shelfwalk::cli::CliOverrides;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = shelfwalk::run(cli) {
        log::error!("Application error: {err:?}");
        std::process::exit(1);
    }
}
