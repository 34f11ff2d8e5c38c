//! HTTP surface.

use std::convert::Infallible;
use std::sync::Arc;

use nimbus_services::{CurrentWeather, KvStore, PrometheusMetrics, ServiceError, WeatherService};
use nimbus_weather::WeatherCondition;
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Shared handles every handler needs.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
    pub store: Arc<dyn KvStore>,
    pub metrics: Arc<PrometheusMetrics>,
}

/// A coordinate as sent by clients: a JSON string (`"48.85"`) or a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CoordinateValue {
    Text(String),
    Number(f64),
}

impl CoordinateValue {
    fn parse(&self, field: &str) -> Result<f64, String> {
        match self {
            Self::Number(v) => Ok(*v),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("Invalid {}: {:?}", field, s)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoordinatesRequest {
    lat: CoordinateValue,
    lon: CoordinateValue,
}

#[derive(Debug, Deserialize)]
struct CityRequest {
    city: String,
}

#[derive(Debug, Serialize)]
struct WeatherResponse {
    temperature: f64,
    weather_code: i32,
    weather_description: &'static str,
    condition: WeatherCondition,
}

impl From<CurrentWeather> for WeatherResponse {
    fn from(current: CurrentWeather) -> Self {
        Self {
            temperature: current.temperature,
            weather_code: current.weather_code,
            weather_description: current.description,
            condition: current.condition,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    json_reply(
        status,
        &ErrorBody {
            error: message.into(),
        },
    )
}

fn service_error_reply(err: &ServiceError) -> Response {
    let status = match err {
        ServiceError::InvalidCoordinates(_) | ServiceError::EmptyCityName => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::CityNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Catalog(_) | ServiceError::Weather(_) => {
            tracing::error!("Lookup failed: {}", err);
            StatusCode::BAD_GATEWAY
        }
    };
    error_reply(status, err.user_message())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Largest accepted JSON request body.
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Every route, with request metrics and rejection handling.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let weather = warp::path!("api" / "v1" / "weather")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(weather_by_coordinates);

    let weather_city = warp::path!("api" / "v1" / "weather" / "city")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(weather_by_city);

    let cities = warp::path!("api" / "v1" / "cities")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_cities);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(render_metrics);

    let health = warp::path!("healthz")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health);

    let recorder = state.metrics;
    let log = warp::log::custom(move |info: warp::log::Info<'_>| {
        tracing::debug!(
            method = %info.method(),
            path = info.path(),
            status = info.status().as_u16(),
            "Handled request"
        );
        recorder.record_http_request(
            info.method().as_str(),
            route_label(info.path()),
            info.status().as_u16(),
            info.elapsed(),
        );
    });

    weather
        .or(weather_city)
        .or(cities)
        .or(metrics)
        .or(health)
        .recover(handle_rejection)
        .with(log)
}

/// Fixed label for known routes so unknown paths don't grow label sets.
fn route_label(path: &str) -> &'static str {
    match path {
        "/api/v1/weather" => "/api/v1/weather",
        "/api/v1/weather/city" => "/api/v1/weather/city",
        "/api/v1/cities" => "/api/v1/cities",
        "/metrics" => "/metrics",
        "/healthz" => "/healthz",
        _ => "other",
    }
}

async fn weather_by_coordinates(
    body: CoordinatesRequest,
    state: AppState,
) -> Result<Response, Infallible> {
    let coords = body
        .lat
        .parse("latitude")
        .and_then(|lat| body.lon.parse("longitude").map(|lon| (lat, lon)));
    let (lat, lon) = match coords {
        Ok(pair) => pair,
        Err(msg) => return Ok(error_reply(StatusCode::BAD_REQUEST, msg)),
    };

    Ok(match state.service.weather_at(lat, lon).await {
        Ok(current) => json_reply(StatusCode::OK, &WeatherResponse::from(current)),
        Err(e) => service_error_reply(&e),
    })
}

async fn weather_by_city(body: CityRequest, state: AppState) -> Result<Response, Infallible> {
    Ok(match state.service.weather_in_city(&body.city).await {
        Ok(current) => json_reply(StatusCode::OK, &WeatherResponse::from(current)),
        Err(e) => service_error_reply(&e),
    })
}

async fn list_cities(state: AppState) -> Result<Response, Infallible> {
    Ok(match state.service.cities().await {
        Ok(cities) => json_reply(StatusCode::OK, &cities),
        Err(e) => service_error_reply(&e),
    })
}

async fn render_metrics(state: AppState) -> Result<Response, Infallible> {
    Ok(match state.metrics.render() {
        Ok(text) => warp::reply::with_header(
            text,
            "content-type",
            "text/plain; version=0.0.4; charset=utf-8",
        )
        .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    })
}

async fn health(state: AppState) -> Result<Response, Infallible> {
    Ok(match state.store.ping().await {
        Ok(_) => json_reply(StatusCode::OK, &serde_json::json!({"status": "ok"})),
        Err(e) => {
            tracing::warn!("Health check: cache unreachable: {}", e);
            json_reply(
                StatusCode::SERVICE_UNAVAILABLE,
                &serde_json::json!({"status": "degraded", "error": e.to_string()}),
            )
        }
    })
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    if rejection.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "Not found"));
    }
    if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            format!("Invalid request body: {}", e),
        ));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        ));
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
        ));
    }
    if rejection.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(error_reply(
            StatusCode::LENGTH_REQUIRED,
            "Content-Length required",
        ));
    }
    if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        return Ok(error_reply(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a JSON body",
        ));
    }

    tracing::error!("Unhandled rejection: {:?}", rejection);
    Ok(error_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
    ))
}
