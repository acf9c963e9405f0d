fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let start = std::time::Instant::now();
    if let Err(e) = epitope_aggregator::cli::run() {
        log::error!("{e:#}");
        std::process::exit(1);
    }
    log::info!("Elapsed time: {:.3?}", start.elapsed());
}
