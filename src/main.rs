use macrotrack::config::Settings;
use macrotrack::nutrition::create_tables;
use macrotrack::persist::{open, Persistor};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SETTINGS_FILE: &str = "macrotrack";

fn run(settings: &Settings) -> macrotrack::Result<()> {
    let connection = open(&settings.persistence_mode())?;
    let persistor = Persistor::new(&connection).with_iterate_threshold(settings.iterate_threshold);
    create_tables(&persistor)?;
    info!(database = %settings.database, "database ready");
    Ok(())
}

pub fn main() {
    let settings = match Settings::load(SETTINGS_FILE) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    if let Err(e) = run(&settings) {
        error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}
