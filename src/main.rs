use crate::host::Host;
use kvmlink::app_config::AppConfig;
use kvmlink::pikvm::PikvmProber;
use kvmlink::registry::IdentityRegistry;
use kvmlink::setup::{NoTranslations, SetupFlow, SetupOutcome};
use std::sync::Arc;
use tracing::{info, warn};

mod host;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    tracing_subscriber::fmt().with_max_level(config.logging().level()).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("✅  Loaded configuration");

    let registry = Arc::new(IdentityRegistry::new());
    let prober = Arc::new(PikvmProber::new(config.certificate().fetch_timeout(), config.polling().request_timeout()));
    let setup = SetupFlow::new(registry.clone(), prober, Arc::new(NoTranslations));

    for device in config.devices() {
        match setup.import(device.form_values()).await {
            SetupOutcome::Registered(entry_id) | SetupOutcome::UpdatedExisting(entry_id) => {
                info!(entry_id = %entry_id, "✅  Registered {}", device.host());
            }
            SetupOutcome::ShowForm(form) => {
                warn!("⚠️ Could not register {}, {:?}", device.host(), form.errors);
            }
            outcome => warn!("⚠️ Could not register {}, {:?}", device.host(), outcome),
        }
    }

    let mut host = Host::new(registry, config.polling().clone());
    host.start_all();
    info!("🔥 {} is up and running", env!("CARGO_PKG_NAME"));

    tokio::select! {
        _ = host.follow() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("⚠️ Could not listen for Ctrl-C, {}", e);
            }
        }
    }

    info!("🛑 Shutting down");
    host.shutdown().await;
    Ok(())
}
