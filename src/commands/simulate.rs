//! Scripted multi-device simulation on the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use presencekit_auth::{AuthManager, AuthUser, MemoryIdentityProvider};
use presencekit_core::config::AppConfig;
use presencekit_core::error::AppError;
use presencekit_core::types::{DeviceFingerprint, IdentityId, SessionList};
use presencekit_realtime::{MemoryClient, MemoryDatabase, VisibilityState};

use crate::binding::PresenceBinding;

/// Browser signatures used to fingerprint the first few simulated devices.
const AGENTS: &[(&str, &str)] = &[
    (
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Linux x86_64",
    ),
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Win32",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
        "MacIntel",
    ),
];

/// Arguments for the simulate command
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of devices signing in as the same user
    #[arg(short, long, default_value_t = 3)]
    pub devices: usize,

    /// Identity every device signs in as
    #[arg(short, long, default_value = "demo-user")]
    pub user: String,

    /// Pause between script steps, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub step_ms: u64,

    /// Keep the surviving devices running until Ctrl+C
    #[arg(long)]
    pub hold: bool,
}

struct SimDevice {
    device: DeviceFingerprint,
    client: MemoryClient,
    auth: Arc<AuthManager>,
    binding: Arc<PresenceBinding>,
    task: JoinHandle<()>,
}

/// Execute the simulation
pub async fn execute(args: &SimulateArgs, config: AppConfig) -> Result<(), AppError> {
    if args.devices == 0 {
        return Err(AppError::validation("at least one device is required"));
    }

    let db = MemoryDatabase::new();
    let provider = Arc::new(MemoryIdentityProvider::new());
    let identity = IdentityId::new(args.user.as_str());
    let user = AuthUser::new(identity.clone()).with_display_name(args.user.as_str());
    let step = Duration::from_millis(args.step_ms);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut devices = Vec::with_capacity(args.devices);
    for index in 0..args.devices {
        let device = fingerprint(index);
        let client = db.client();
        let auth = Arc::new(AuthManager::new(config.auth.clone(), provider.clone()));
        let binding = Arc::new(PresenceBinding::new(
            Arc::new(client.clone()),
            device.clone(),
            config.presence.clone(),
        ));
        let task = Arc::clone(&binding).spawn(auth.subscribe(), shutdown_rx.clone());
        devices.push(SimDevice {
            device,
            client,
            auth,
            binding,
            task,
        });
    }

    info!(devices = args.devices, user = %identity, "Signing in every device");
    for sim in &devices {
        sim.client.connect();
        sim.auth.handle_auth_state(Some(user.clone())).await?;
        tokio::time::sleep(step).await;
    }
    report("all devices online", &db, &identity)?;

    if let Some(service) = devices[0].binding.service().await {
        info!(device = %devices[0].device, "Hiding the first device");
        service.handle_visibility(VisibilityState::Hidden).await;
        report("first device hidden", &db, &identity)?;
    }

    if devices.len() > 1 {
        let last = &devices[devices.len() - 1];
        info!(device = %last.device, "Crashing the last device");
        last.client.crash();
        tokio::time::sleep(step).await;
        report("last device crashed", &db, &identity)?;
    }

    if devices.len() > 2 {
        let flaky = &devices[1];
        info!(device = %flaky.device, "Dropping and restoring a connection");
        flaky.client.drop_connection();
        tokio::time::sleep(step).await;
        flaky.client.connect();
        tokio::time::sleep(step).await;
        report("connection restored", &db, &identity)?;
    }

    if args.hold {
        info!("Holding; press Ctrl+C to sign out and exit");
        shutdown_signal().await;
    }

    info!(device = %devices[0].device, "Signing out the first device");
    devices[0].auth.handle_auth_state(None).await?;
    tokio::time::sleep(step).await;

    let _ = shutdown_tx.send(true);
    for sim in devices {
        let _ = sim.task.await;
    }
    report("final", &db, &identity)?;
    Ok(())
}

fn fingerprint(index: usize) -> DeviceFingerprint {
    match AGENTS.get(index) {
        Some((agent, platform)) => DeviceFingerprint::from_user_agent(agent, platform),
        None => DeviceFingerprint::new(&format!("device-{index}")),
    }
}

fn report(stage: &str, db: &MemoryDatabase, identity: &IdentityId) -> Result<(), AppError> {
    let list = SessionList::from_value(db.get(&SessionList::path(identity)))?;
    info!(stage, sessions = list.len(), "Persisted sessions");
    println!("== {stage} ==");
    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
