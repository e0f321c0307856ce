use remit::{logging, AppConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = AppConfig::load();

    let log_config = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    let _guard = match logging::init(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_stderr();
            tracing::warn!("File logging disabled: {e:#}");
            None
        }
    };

    tracing::info!("Start");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return;
        }
    };

    let today = chrono::Local::now().date_naive();
    if let Err(e) = remit::run(config, today).await {
        tracing::error!("{e:#}");
    }
}
