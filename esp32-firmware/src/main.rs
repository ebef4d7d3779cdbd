#[macro_use]
extern crate fossor;

mod env;
mod mqtt;
mod wifi;

use anyhow::{anyhow, Result};
use esp_idf_sys::{esp_random, esp_restart};
use fossor::config::Config;
use fossor::connectivity::ConnectivityManager;
use fossor::platform::{NodeContext, RandomSource, RestartHandle};
use fossor::session::{SessionParams, TlsMaterial};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// The one connectivity manager, reached from the driver's event callbacks.
pub static MANAGER: OnceCell<Arc<ConnectivityManager>> = OnceCell::new();

struct HardwareRandom;

impl RandomSource for HardwareRandom {
    fn next_u32(&self) -> u32 {
        unsafe { esp_random() }
    }
}

struct DeviceRestart;

impl RestartHandle for DeviceRestart {
    fn restart_process(&self, reason: &str) {
        error!("main: EJECT! {}", reason);
        error!("main: ENTROPY WINS");
        unsafe { esp_restart() };
    }
}

fn tls_material() -> TlsMaterial {
    TlsMaterial {
        ca_cert: include_str!("../certs/root_ca.pem").to_string(),
        client_cert: include_str!("../certs/client.pem").to_string(),
        private_key: include_str!("../certs/private_key.pem").to_string(),
    }
}

fn main() -> Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("main: fossor node, built {}", env!("BUILD_TIMESTAMP"));

    // tokio's reactor needs eventfd on ESP-IDF
    esp_idf_svc::io::vfs::initialize_eventfd(5)?;
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;

    let mut config = Config::default();
    config.broker.uri = env::get_embedded_env_value("MQTT_BROKER_URI")?;
    config.validate()?;

    let session = SessionParams::new(&config.broker, tls_material());
    let radio = Arc::new(wifi::EspRadio);
    let ctx = NodeContext {
        config: Arc::new(config),
        session: Arc::new(session),
        network: radio.clone(),
        listener: radio,
        transport: Arc::new(mqtt::EspTransport),
        random: Arc::new(HardwareRandom),
        restart: Arc::new(DeviceRestart),
    };

    let manager = ConnectivityManager::new(ctx, runtime.handle().clone())?;
    MANAGER
        .set(Arc::new(manager))
        .map_err(|_| anyhow!("connectivity manager already installed"))?;

    wifi::init()?;
    wifi::start()?;

    // Tasks spawned from the event callbacks run here.
    runtime.block_on(std::future::pending::<()>());
    Ok(())
}
