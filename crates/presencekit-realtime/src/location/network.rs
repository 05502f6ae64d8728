//! Location lookup by network address over HTTP.

use serde::Deserialize;
use tracing::debug;

use presencekit_core::result::AppResult;
use presencekit_core::traits::location::Coordinates;

/// Minimal response body accepted from a network geolocation service.
#[derive(Debug, Deserialize)]
struct LookupResponse {
    latitude: f64,
    longitude: f64,
}

/// Fetch coordinates for the caller's network address from `url`.
///
/// The service must answer with a JSON object carrying numeric `latitude`
/// and `longitude` fields; other fields are ignored.
pub async fn lookup(client: &reqwest::Client, url: &str) -> AppResult<Coordinates> {
    let body: LookupResponse = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    debug!(url, latitude = body.latitude, longitude = body.longitude, "Network location resolved");

    Ok(Coordinates {
        latitude: body.latitude,
        longitude: body.longitude,
    })
}
