use ccmo_common::{
    error,
    settings::{Settings, CONFIG_INSTANCE},
    util::tracing::{level_from_log, setup_tracing},
};
use ccmo_operator::{build_info, run_operator};

#[tokio::main]
async fn main() {
    let settings = match Settings::from_root(None) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {e}");
            std::process::exit(1);
        }
    };
    setup_tracing(Some(level_from_log(settings.log_level)));
    ccmo_common::info!(build = %build_info(), "ccmo-operator starting");

    let settings = CONFIG_INSTANCE.get_or_init(|| settings);
    if let Err(e) = run_operator(settings).await {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}
