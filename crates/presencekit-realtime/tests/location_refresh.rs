//! Integration tests for location capture and periodic refresh.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use futures::FutureExt;
use serde_json::json;

use common::{persisted, u1};
use presencekit_core::AppError;
use presencekit_core::config::presence::{GeolocationConfig, GeolocationStrategy, PresenceConfig};
use presencekit_core::events::{PresenceEventKind, PresenceEventPayload};
use presencekit_core::traits::clock::{Clock, ManualClock};
use presencekit_core::traits::location::{Coordinates, CustomLocationFn};
use presencekit_core::types::{DeviceFingerprint, PresenceStatus};
use presencekit_realtime::{MemoryDatabase, PresenceService};

fn geo(strategy: GeolocationStrategy, url: Option<String>) -> PresenceConfig {
    PresenceConfig {
        update_interval_ms: 60_000,
        geolocation: GeolocationConfig {
            enabled: true,
            strategy,
            require_consent: true,
            ip_service_url: url,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A resolver that drifts east by one degree per call.
fn drifting_resolver(calls: Arc<AtomicU32>) -> CustomLocationFn {
    Arc::new(move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            Ok::<_, AppError>(Coordinates {
                latitude: 10.0,
                longitude: 20.0 + n as f64,
            })
        }
        .boxed()
    })
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/json")
}

#[tokio::test(start_paused = true)]
async fn test_custom_location_is_refreshed_periodically() {
    let db = MemoryDatabase::new();
    let clock = Arc::new(ManualClock::at_millis(0));
    let client = db.client();
    let calls = Arc::new(AtomicU32::new(0));

    let service = PresenceService::builder(Arc::new(client.clone()), DeviceFingerprint::new("D1"))
        .config(geo(GeolocationStrategy::Custom, None))
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .custom_location(drifting_resolver(Arc::clone(&calls)))
        .build()
        .unwrap();
    let mut events = service.events();

    client.connect();
    service.initialize(u1()).await.unwrap();
    assert!(service.has_location_consent());
    assert!(service.is_location_refresh_running());

    let online = loop {
        let event = events.recv().await.unwrap();
        if event.kind() == PresenceEventKind::StatusChange {
            break event;
        }
    };
    match online.payload {
        PresenceEventPayload::StatusChange { location, .. } => {
            assert_eq!(location.unwrap().longitude, 20.0);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    clock.set_millis(60_000);
    tokio::time::advance(Duration::from_secs(61)).await;

    let update = loop {
        let event = events.recv().await.unwrap();
        if event.kind() == PresenceEventKind::LocationUpdate {
            break event;
        }
    };
    match update.payload {
        PresenceEventPayload::LocationUpdate { location } => {
            assert_eq!(location.longitude, 21.0);
            assert_eq!(location.last_updated.timestamp_millis(), 60_000);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let stored = persisted(&db, &u1());
    let session = &stored.sessions[0];
    assert_eq!(session.status, PresenceStatus::Online);
    assert_eq!(session.location.unwrap().longitude, 21.0);
    assert_eq!(session.last_seen.timestamp_millis(), 60_000);

    service.stop_location_refresh();
    assert!(!service.is_location_refresh_running());
    service.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_stops_on_dispose() {
    let db = MemoryDatabase::new();
    let clock = Arc::new(ManualClock::at_millis(0));
    let client = db.client();
    let calls = Arc::new(AtomicU32::new(0));

    let service = PresenceService::builder(Arc::new(client.clone()), DeviceFingerprint::new("D1"))
        .config(geo(GeolocationStrategy::Custom, None))
        .clock(clock as Arc<dyn Clock>)
        .custom_location(drifting_resolver(Arc::clone(&calls)))
        .build()
        .unwrap();

    service.initialize(u1()).await.unwrap();
    service.dispose().await;
    assert!(!service.start_location_refresh());

    tokio::time::advance(Duration::from_secs(600)).await;
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(db.get("sessions/U1").is_none());
}

#[tokio::test]
async fn test_location_disabled_writes_no_location() {
    let db = MemoryDatabase::new();
    let clock = Arc::new(ManualClock::at_millis(0));
    let client = db.client();

    let service = PresenceService::builder(Arc::new(client), DeviceFingerprint::new("D1"))
        .clock(clock as Arc<dyn Clock>)
        .build()
        .unwrap();

    service.initialize(u1()).await.unwrap();
    assert!(!service.is_location_refresh_running());

    let session = service.set_presence(PresenceStatus::Online).await.unwrap();
    assert!(session.location.is_none());
    assert!(persisted(&db, &u1()).sessions[0].location.is_none());
}

#[tokio::test]
async fn test_network_location_is_written() {
    let url = serve(Router::new().route(
        "/json",
        get(|| async { Json(json!({"latitude": 52.52, "longitude": 13.4, "city": "Berlin"})) }),
    ))
    .await;

    let db = MemoryDatabase::new();
    let service = PresenceService::builder(Arc::new(db.client()), DeviceFingerprint::new("D1"))
        .config(geo(GeolocationStrategy::Network, Some(url)))
        .clock(Arc::new(ManualClock::at_millis(0)) as Arc<dyn Clock>)
        .build()
        .unwrap();

    assert!(service.request_location_consent().await);
    service.initialize(u1()).await.unwrap();

    let session = service.set_presence(PresenceStatus::Online).await.unwrap();
    let location = session.location.unwrap();
    assert_eq!(location.latitude, 52.52);
    assert_eq!(location.longitude, 13.4);
    service.dispose().await;
}

#[tokio::test]
async fn test_network_failure_still_writes_presence() {
    let url = serve(Router::new().route(
        "/json",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    ))
    .await;

    let db = MemoryDatabase::new();
    let service = PresenceService::builder(Arc::new(db.client()), DeviceFingerprint::new("D1"))
        .config(geo(GeolocationStrategy::Network, Some(url)))
        .clock(Arc::new(ManualClock::at_millis(0)) as Arc<dyn Clock>)
        .build()
        .unwrap();
    service.initialize(u1()).await.unwrap();

    let session = service.set_presence(PresenceStatus::Away).await.unwrap();
    assert_eq!(session.status, PresenceStatus::Away);
    assert!(session.location.is_none());
    assert!(service.error().await.is_none());
    service.dispose().await;
}

#[test]
fn test_network_strategy_requires_url() {
    let db = MemoryDatabase::new();
    let err = PresenceService::builder(Arc::new(db.client()), DeviceFingerprint::new("D1"))
        .config(geo(GeolocationStrategy::Network, None))
        .build()
        .unwrap_err();
    assert_eq!(err.kind, presencekit_core::error::ErrorKind::Configuration);
}
