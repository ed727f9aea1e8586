//! Run command - wires the server together and runs until exit.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::clipboard::{ClipboardSync, SystemClipboard};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::discovery::{Advertisement, Advertiser};
use crate::error::{AppError, AppResult};
use crate::executor::SystemExecutor;
use crate::keyboard;
use crate::notifications::Notifier;
use crate::server::{self, AppState};
use crate::tray::{self, TrayContext};
use crate::types::APP_NAME;

/// Run the server. With `headless` (or on platforms without a tray) it runs
/// until Ctrl+C; otherwise until Exit is chosen in the tray.
pub async fn run(config_path: &Path, headless: bool) -> Result<()> {
    let (config, listener) = prepare(config_path)
        .await
        .with_context(|| format!("Failed to start with {}", config_path.display()))?;
    info!(config_path = %config.path.display(), "Configuration loaded");

    let headless = headless || !cfg!(windows);

    let notifier = Notifier::start(&config.notifications);
    let sink = notifier.sink();

    let coordinator = Coordinator::new(
        config.actions.grace_period(),
        Arc::new(SystemExecutor::new(config.actions.dry_run)),
        sink.clone(),
        keyboard::cancel_sources(&config.actions),
    );
    let clipboard = ClipboardSync::new(Arc::new(SystemClipboard::default()), sink.clone());

    let address = config.bind_address();

    let mut advertiser = None;
    if config.discovery.enabled {
        match advertise(&config) {
            Ok(adv) => advertiser = Some(adv),
            Err(e) => {
                warn!(error = %e, "mDNS advertisement unavailable");
                sink.show_transient(
                    "Network discovery unavailable",
                    &format!("Clients must enter this PC's address manually. {e}"),
                );
            }
        }
    } else {
        info!("mDNS advertisement disabled");
    }

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let state = AppState {
        coordinator: coordinator.clone(),
        clipboard,
    };
    let mut server_task = tokio::spawn(server::serve(listener, state, async move {
        let _ = shutdown_rx.changed().await;
    }));

    info!(
        address = %address,
        grace_secs = config.actions.grace_period_seconds,
        headless,
        "{APP_NAME} server started"
    );
    sink.show_transient(
        &format!("{APP_NAME} running"),
        &format!("Listening on port {}", config.server.port),
    );

    let mut tray_result = Ok(());
    let early_exit = if headless {
        tokio::select! {
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Received shutdown signal");
                None
            }
            res = &mut server_task => Some(res),
        }
    } else {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_on_signal = Arc::clone(&stop);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                stop_on_signal.store(true, Ordering::SeqCst);
            }
        });

        tray_result = tray::run_tray(TrayContext {
            coordinator: coordinator.clone(),
            config: config.clone(),
            stop,
        });
        None
    };

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    let server_result = match early_exit {
        Some(res) => res,
        None => server_task.await,
    };
    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    let shutdown_coordinator = coordinator.clone();
    tokio::task::spawn_blocking(move || shutdown_coordinator.shutdown()).await?;

    if let Some(mut adv) = advertiser.take() {
        adv.stop();
    }

    tokio::task::spawn_blocking(move || notifier.stop()).await?;

    info!("{APP_NAME} server stopped");
    tray_result
}

/// Load the config and claim the listening port; nothing runs without both.
async fn prepare(config_path: &Path) -> AppResult<(Config, TcpListener)> {
    let config = Config::load_from(config_path)?;
    let address = config.bind_address();
    let listener = server::bind(&address)
        .await
        .map_err(|source| AppError::Bind { address, source })?;
    Ok((config, listener))
}

fn advertise(config: &Config) -> AppResult<Advertiser> {
    let mut advertiser = Advertiser::new(Advertisement::from_config(config));
    advertiser.start()?;
    Ok(advertiser)
}
