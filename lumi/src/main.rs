use lumi::{api, console, Lumi};
use lumi_config::{LumiConfig, Mode};
use lumi::utils::init_logging;
use std::sync::Arc;

#[allow(unused_imports)]
use tracing::{info, debug, error, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LumiConfig::new()?;

    init_logging(config.debug);

    info!("Starting Lumi in {} mode", config.mode);

    let lumi = match Lumi::new(&config) {
        Ok(lumi) => Arc::new(lumi),
        Err(e) => {
            error!("Failed to load model: {:#}", e);
            return Err(e.into());
        }
    };
    info!("Model ready on {} ({} parameters)", lumi.device(), lumi.parameter_count());

    match config.mode {
        Mode::Interactive => console::run_interactive(lumi, &config).await?,
        Mode::Api => api::serve(lumi, &config).await?,
    }

    Ok(())
}
