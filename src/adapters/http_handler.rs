//! HTTP surface: movie handlers, routing and the gatekeeping chain.
//!
//! [`build_router`] wires the API routes behind the full chain in the order
//! PanicGuard, metrics, CORS, rate limiting, authentication and then the
//! per-route authorization gate.
use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, FromRequest, Path, Query, Request, State, rejection::QueryRejection,
    },
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
    adapters::{
        account_handler::{activate_user, create_authentication_token, register_user},
        middleware::{
            authenticate_middleware, cors_middleware, gate_middleware, metrics_middleware,
            rate_limit_middleware,
        },
        panic_guard::panic_guard_layer,
    },
    config::models::AuthConfig,
    core::{
        authorization::Gate,
        context::CurrentPrincipal,
        error::ApiError,
        filters::{MovieFilters, validate_filters},
        gatekeeper::Gatekeeper,
        movie::{Movie, MovieId, validate_movie},
        validator::Validator,
    },
    ports::{
        movie_store::MovieStore,
        notifier::{Notifier, ResourceEvent},
        principal_store::PrincipalStore,
        store::bounded,
    },
    utils::background::BackgroundTasks,
};

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub movies: Arc<dyn MovieStore>,
    pub principals: Arc<dyn PrincipalStore>,
    pub auth: AuthConfig,
    pub notifier: Arc<dyn Notifier>,
    pub background: BackgroundTasks,
    pub env: String,
    pub query_timeout: Duration,
}

impl AppState {
    /// Fire-and-forget notification tracked by the background task set.
    pub(crate) fn dispatch(&self, event: ResourceEvent) {
        let notifier = self.notifier.clone();
        self.background
            .spawn("notify", async move { notifier.notify(event).await });
    }
}

/// JSON body extractor whose rejections use the API error format.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// Raw listing parameters. Numbers stay strings so a bad value becomes a
/// field error instead of a plain rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListMoviesQuery {
    pub title: Option<String>,
    /// Comma separated
    pub genres: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

fn read_int(v: &mut Validator, key: &str, raw: Option<&str>, default: i64) -> i64 {
    match raw.filter(|raw| !raw.is_empty()) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

impl ListMoviesQuery {
    fn into_filters(self) -> Result<MovieFilters, ApiError> {
        let defaults = MovieFilters::default();
        let mut v = Validator::new();
        let filters = MovieFilters {
            page: read_int(&mut v, "page", self.page.as_deref(), defaults.page),
            page_size: read_int(
                &mut v,
                "page_size",
                self.page_size.as_deref(),
                defaults.page_size,
            ),
            title: self.title.unwrap_or_default(),
            genres: self
                .genres
                .filter(|csv| !csv.is_empty())
                .map(|csv| csv.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            sort: self
                .sort
                .filter(|sort| !sort.is_empty())
                .unwrap_or(defaults.sort),
        };
        validate_filters(&mut v, &filters);
        v.into_result()?;
        Ok(filters)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovieRequest {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

fn parse_id(raw: &str) -> Result<MovieId, ApiError> {
    match raw.parse::<MovieId>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

fn validated(movie: &Movie) -> Result<(), ApiError> {
    let mut v = Validator::new();
    validate_movie(&mut v, movie);
    v.into_result()
}

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.env,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

pub async fn list_movies(
    State(state): State<AppState>,
    query: Result<Query<ListMoviesQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let filters = query.into_filters()?;

    let (movies, metadata) = bounded(state.query_timeout, state.movies.list(&filters)).await?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

pub async fn show_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    let movie = bounded(state.query_timeout, state.movies.get(id)).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn create_movie(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    JsonBody(input): JsonBody<CreateMovieRequest>,
) -> Result<Response, ApiError> {
    let movie = Movie::new(input.title, input.year, input.runtime, input.genres);
    validated(&movie)?;

    let movie = bounded(state.query_timeout, state.movies.insert(movie)).await?;
    tracing::info!(
        movie_id = movie.id,
        principal_id = ?principal.id(),
        "Created movie"
    );
    state.dispatch(ResourceEvent::MovieCreated {
        id: movie.id,
        title: movie.title.clone(),
    });

    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .map_err(|e| ApiError::Fault(eyre::Report::new(e)))?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    )
        .into_response())
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<UpdateMovieRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    let mut movie = bounded(state.query_timeout, state.movies.get(id)).await?;

    // Clients may pin the version they last read.
    if let Some(expected) = headers.get("X-Expected-Version") {
        if expected.to_str().ok() != Some(movie.version.to_string().as_str()) {
            return Err(ApiError::EditConflict);
        }
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }
    validated(&movie)?;

    let movie = bounded(state.query_timeout, state.movies.update(movie)).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    bounded(state.query_timeout, state.movies.delete(id)).await?;
    state.dispatch(ResourceEvent::MovieDeleted { id });
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

pub async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}

/// API routes with their authorization gates, before the global chain.
pub fn api_routes(gatekeeper: &Arc<Gatekeeper>) -> Router<AppState> {
    let read = || {
        middleware::from_fn_with_state(
            (gatekeeper.clone(), Gate::permission(MOVIES_READ)),
            gate_middleware,
        )
    };
    let write = || {
        middleware::from_fn_with_state(
            (gatekeeper.clone(), Gate::permission(MOVIES_WRITE)),
            gate_middleware,
        )
    };

    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .route("/v1/users", post(register_user))
        .route("/v1/users/activated", put(activate_user))
        .route(
            "/v1/tokens/authentication",
            post(create_authentication_token),
        )
        .route("/v1/movies", get(list_movies).route_layer(read()))
        .route("/v1/movies", post(create_movie).route_layer(write()))
        .route("/v1/movies/{id}", get(show_movie).route_layer(read()))
        .route(
            "/v1/movies/{id}",
            patch(update_movie).delete(delete_movie).route_layer(write()),
        )
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
}

/// Wrap `router` in the request gatekeeping chain. Layers added last run
/// first, so PanicGuard is outermost and authentication innermost.
pub fn apply_chain(router: Router, gatekeeper: Arc<Gatekeeper>) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            gatekeeper.clone(),
            authenticate_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            gatekeeper.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(gatekeeper, cors_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(panic_guard_layer())
}

pub fn build_router(state: AppState, gatekeeper: Arc<Gatekeeper>) -> Router {
    apply_chain(api_routes(&gatekeeper).with_state(state), gatekeeper)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{body::Body, extract::connect_info::MockConnectInfo};
    use chrono::Duration as ChronoDuration;
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::{
        adapters::{
            movie_store::InMemoryMovieStore, notifier::LogNotifier,
            principal_store::InMemoryPrincipalStore,
        },
        config::{LimiterConfig, ServerConfig},
        core::{
            principal::Principal,
            token::{Token, TokenScope, generate_token},
        },
        ports::PrincipalStore,
    };

    const WRITER_TOKEN: &str = "WRITERWRITERWRITERWRITERAA";
    const READER_TOKEN: &str = "READERREADERREADERREADERAA";

    struct TestApp {
        router: Router,
        principals: Arc<InMemoryPrincipalStore>,
        background: BackgroundTasks,
    }

    async fn create_test_app() -> TestApp {
        let principals = InMemoryPrincipalStore::new();
        principals.insert_principal(
            Principal::new(1, "Writer", "writer@example.com", true),
            [MOVIES_READ, MOVIES_WRITE].into_iter().collect(),
        );
        principals.insert_principal(
            Principal::new(2, "Reader", "reader@example.com", true),
            [MOVIES_READ].into_iter().collect(),
        );
        for (plaintext, id) in [(WRITER_TOKEN, 1), (READER_TOKEN, 2)] {
            principals
                .insert_token(Token::from_plaintext(
                    plaintext,
                    id,
                    ChronoDuration::hours(1),
                    TokenScope::Authentication,
                ))
                .await
                .unwrap();
        }

        let config = ServerConfig {
            limiter: LimiterConfig {
                enabled: false,
                ..LimiterConfig::default()
            },
            ..ServerConfig::default()
        };
        let principals = Arc::new(principals);
        let gatekeeper = Arc::new(Gatekeeper::new(&config, principals.clone()).unwrap());
        let background = BackgroundTasks::new();
        let state = AppState {
            movies: Arc::new(InMemoryMovieStore::new()),
            principals: principals.clone(),
            auth: AuthConfig {
                password_cost: 4,
                ..AuthConfig::default()
            },
            notifier: Arc::new(LogNotifier::new()),
            background: background.clone(),
            env: "test".to_string(),
            query_timeout: Duration::from_secs(3),
        };

        let client: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        TestApp {
            router: build_router(state, gatekeeper).layer(MockConnectInfo(client)),
            principals,
            background,
        }
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn casablanca() -> Value {
        json!({"title": "Casablanca", "year": 1942, "runtime": 102, "genres": ["drama"]})
    }

    #[tokio::test]
    async fn test_healthcheck_is_public() {
        let app = create_test_app().await;
        let response = app
            .router
            .oneshot(request(Method::GET, "/v1/healthcheck", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "available");
        assert_eq!(body["system_info"]["environment"], "test");
    }

    #[tokio::test]
    async fn test_movies_require_authentication() {
        let app = create_test_app().await;
        let response = app
            .router
            .oneshot(request(Method::GET, "/v1/movies", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "authentication required");
    }

    #[tokio::test]
    async fn test_reader_cannot_write() {
        let app = create_test_app().await;
        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, "/v1/movies", Some(READER_TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .oneshot(request(
                Method::POST,
                "/v1/movies",
                Some(READER_TOKEN),
                Some(casablanca()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "not permitted");
    }

    #[tokio::test]
    async fn test_create_update_delete_flow() {
        let app = create_test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/v1/movies",
                Some(WRITER_TOKEN),
                Some(casablanca()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/v1/movies/1"
        );
        let created = body_json(response).await;
        assert_eq!(created["movie"]["version"], 1);

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::PATCH,
                "/v1/movies/1",
                Some(WRITER_TOKEN),
                Some(json!({"runtime": 103})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["movie"]["runtime"], 103);
        assert_eq!(updated["movie"]["version"], 2);

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::DELETE,
                "/v1/movies/1",
                Some(WRITER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .oneshot(request(Method::GET, "/v1/movies/1", Some(WRITER_TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app.background.wait_idle().await;
        assert_eq!(app.background.active_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let app = create_test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/v1/movies",
                Some(WRITER_TOKEN),
                Some(json!({"title": "", "year": 1942, "runtime": 102, "genres": ["drama"]})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"]["title"], "must be provided");

        let response = app
            .router
            .oneshot(request(
                Method::POST,
                "/v1/movies",
                Some(WRITER_TOKEN),
                Some(json!({"title": "x", "rating": 5})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let app = create_test_app().await;
        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, "/v1/nothing", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .router
            .oneshot(request(Method::PUT, "/v1/healthcheck", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            body_json(response).await["error"],
            "the PUT method is not supported for this resource"
        );
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_paginates() {
        let app = create_test_app().await;
        for (title, year) in [("Heat", 1995), ("Alien", 1979), ("Aliens", 1986)] {
            let response = app
                .router
                .clone()
                .oneshot(request(
                    Method::POST,
                    "/v1/movies",
                    Some(WRITER_TOKEN),
                    Some(json!({"title": title, "year": year, "runtime": 120, "genres": ["action"]})),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::GET,
                "/v1/movies?sort=-year&page=1&page_size=2",
                Some(READER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let titles: Vec<_> = body["movies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, ["Heat", "Aliens"]);
        assert_eq!(body["metadata"]["total_records"], 3);
        assert_eq!(body["metadata"]["last_page"], 2);

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::GET,
                "/v1/movies?title=alien&genres=action",
                Some(READER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["movies"].as_array().unwrap().len(), 1);
        assert_eq!(body["movies"][0]["title"], "Alien");

        let response = app
            .router
            .oneshot(request(
                Method::GET,
                "/v1/movies?page=abc&page_size=500&sort=rating",
                Some(READER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["page"], "must be an integer value");
        assert_eq!(body["error"]["page_size"], "must be a maximum of 100");
        assert_eq!(body["error"]["sort"], "invalid sort value");
    }

    #[tokio::test]
    async fn test_register_activate_and_issue_token() {
        let app = create_test_app().await;
        let registration = json!({"name": "Carol", "email": "carol@example.com", "password": "pa55word"});

        let response = app
            .router
            .clone()
            .oneshot(request(Method::POST, "/v1/users", None, Some(registration.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["user"]["activated"], false);
        let id = body["user"]["id"].as_i64().unwrap();

        let response = app
            .router
            .clone()
            .oneshot(request(Method::POST, "/v1/users", None, Some(registration)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["error"]["email"],
            "a user with this email address already exists"
        );

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({"email": "carol@example.com", "password": "wrong-pass"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["error"],
            "invalid authentication credentials"
        );

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({"email": "carol@example.com", "password": "pa55word"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let bearer = body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string();

        // Not activated yet.
        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, "/v1/movies", Some(&bearer), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let activation = generate_token(id, ChronoDuration::hours(1), TokenScope::Activation);
        let plaintext = activation.plaintext.clone().unwrap();
        app.principals.insert_token(activation).await.unwrap();

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::PUT,
                "/v1/users/activated",
                None,
                Some(json!({"token": plaintext})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["user"]["activated"], true);

        // Activation tokens are single use.
        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::PUT,
                "/v1/users/activated",
                None,
                Some(json!({"token": plaintext})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["error"]["token"],
            "invalid or expired activation token"
        );

        let response = app
            .router
            .oneshot(request(Method::GET, "/v1/movies", Some(&bearer), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        app.background.wait_idle().await;
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("7").unwrap(), 7);
        assert!(matches!(parse_id("0"), Err(ApiError::NotFound)));
        assert!(matches!(parse_id("abc"), Err(ApiError::NotFound)));
    }
}
