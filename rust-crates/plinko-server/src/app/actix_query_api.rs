use crate::{
    Result,
    app::query_api::{
        AdminQuery,
        Query,
        QueryAPI,
    },
};
use actix_cors::Cors;
use actix_web::{
    App,
    HttpRequest,
    HttpResponse,
    HttpServer,
    ResponseError,
    dev::ServerHandle,
    http::StatusCode,
    web,
};
use anyhow::{
    Context,
    anyhow,
};
use plinko::{
    Points,
    Rejection,
    UserId,
    board::CENTER_SLOT,
    ledger::PlayOutcome,
    records::Account,
    settings::GameSettings,
    stats::{
        StatsOptions,
        StatsScope,
        StatsSummary,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    thread::JoinHandle,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

/// Header the host platform uses to pass the authenticated user id.
pub const USER_HEADER: &str = "x-plinko-user";

/// Header carrying the operator token on `/plinko/admin` routes.
pub const ADMIN_TOKEN_HEADER: &str = "x-plinko-admin-token";

const ADMIN_SCOPE: &str = "/plinko/admin";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayRequestDto {
    #[serde(default)]
    pub bet_amount: Points,
    #[serde(default = "default_drop_position")]
    pub drop_position: i64,
}

fn default_drop_position() -> i64 {
    CENTER_SLOT as i64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDto {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingUpdateDto {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointsRequestDto {
    pub username: String,
    pub amount: Points,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequestDto {
    pub username: String,
    #[serde(default)]
    pub balance: Points,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsParamsDto {
    pub top: Option<usize>,
    pub recent: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or malformed x-plinko-user header")]
    Unauthenticated,
    #[error("missing or wrong x-plinko-admin-token header")]
    Forbidden,
    #[error("malformed request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Ledger(#[from] plinko::Error),
    #[error("{0}")]
    Unavailable(&'static str),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden => "forbidden",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Ledger(plinko::Error::Rejected(rejection)) => rejection.code(),
            ApiError::Ledger(plinko::Error::UserNotFound(_)) => "user_not_found",
            ApiError::Ledger(plinko::Error::UsernameTaken(_)) => "username_taken",
            ApiError::Ledger(
                plinko::Error::InvalidConfigKey(_) | plinko::Error::InvalidConfigValue { .. },
            ) => "invalid_setting",
            ApiError::Ledger(plinko::Error::NegativeBalance { .. }) => "negative_balance",
            ApiError::Ledger(plinko::Error::Storage(_)) | ApiError::Unavailable(_) => {
                "internal_error"
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(plinko::Error::Rejected(rejection)) => match rejection {
                Rejection::GameDisabled => StatusCode::FORBIDDEN,
                Rejection::InvalidBetAmount { .. }
                | Rejection::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
                Rejection::DailyLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            },
            ApiError::Ledger(plinko::Error::UserNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ledger(plinko::Error::UsernameTaken(_)) => StatusCode::CONFLICT,
            ApiError::Ledger(
                plinko::Error::InvalidConfigKey(_)
                | plinko::Error::InvalidConfigValue { .. }
                | plinko::Error::NegativeBalance { .. },
            ) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(plinko::Error::Storage(_)) | ApiError::Unavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorDto {
            error: self.code().to_string(),
            message,
        })
    }
}

/// Operator token for the admin scope. Without one the admin routes are open
/// to anything that can reach the loopback listener.
#[derive(Debug, Clone, Default)]
struct AdminToken(Option<String>);

impl AdminToken {
    fn authorize(&self, request: &HttpRequest) -> std::result::Result<(), ApiError> {
        let Some(expected) = &self.0 else {
            return Ok(());
        };
        let presented = request
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

pub struct ActixQueryApi {
    receiver: mpsc::Receiver<Query>,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ActixQueryApi {
    pub async fn new(port: Option<u16>) -> Result<Self> {
        Self::with_admin_token(port, None).await
    }

    pub async fn with_admin_token(port: Option<u16>, admin_token: Option<String>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(16);
        let admin_token = AdminToken(admin_token);

        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for plinko API")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("plinko API listening on {}", base_url);

        let server = HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(sender.clone()))
                .app_data(web::Data::new(admin_token.clone()))
                .app_data(web::JsonConfig::default().error_handler(|error, request| {
                    reject_malformed(error.to_string(), request)
                }))
                .app_data(web::QueryConfig::default().error_handler(|error, request| {
                    reject_malformed(error.to_string(), request)
                }))
                .route("/plinko/play", web::post().to(handle_play))
                .route("/plinko/stats", web::get().to(handle_stats))
                .route("/plinko/stats/me", web::get().to(handle_my_stats))
                .service(
                    web::scope(ADMIN_SCOPE)
                        .route("/settings", web::get().to(handle_admin_settings))
                        .route("/settings/{key}", web::put().to(handle_admin_update_setting))
                        .route("/points", web::post().to(handle_admin_points))
                        .route("/accounts", web::post().to(handle_admin_register))
                        .route("/stats", web::get().to(handle_admin_stats)),
                )
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            receiver,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl QueryAPI for ActixQueryApi {
    async fn query(&mut self) -> Result<Query> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| anyhow!("query server closed"))
    }
}

impl Drop for ActixQueryApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

fn caller(request: &HttpRequest) -> std::result::Result<UserId, ApiError> {
    request
        .headers()
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .ok_or(ApiError::Unauthenticated)
}

fn authorize_admin(request: &HttpRequest) -> std::result::Result<(), ApiError> {
    match request.app_data::<web::Data<AdminToken>>() {
        Some(token) => token.authorize(request),
        None => Err(ApiError::Forbidden),
    }
}

/// Extractors run before the handler body, so a bad payload is checked
/// against the route's credentials first and answered with an [`ErrorDto`].
fn reject_malformed(detail: String, request: &HttpRequest) -> actix_web::Error {
    let authorized = if request.path().starts_with(ADMIN_SCOPE) {
        authorize_admin(request)
    } else {
        caller(request).map(|_| ())
    };
    match authorized {
        Ok(()) => ApiError::InvalidRequest(detail).into(),
        Err(e) => e.into(),
    }
}

async fn forward<T>(
    sender: &mpsc::Sender<Query>,
    query: Query,
    response_receiver: oneshot::Receiver<plinko::Result<T>>,
) -> std::result::Result<T, ApiError> {
    sender
        .send(query)
        .await
        .map_err(|_| ApiError::Unavailable("unable to forward query"))?;
    let result = response_receiver
        .await
        .map_err(|_| ApiError::Unavailable("query responder dropped"))?;
    Ok(result?)
}

async fn handle_play(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
    body: web::Json<PlayRequestDto>,
) -> std::result::Result<web::Json<PlayOutcome>, ApiError> {
    let user = caller(&request)?;
    let PlayRequestDto {
        bet_amount,
        drop_position,
    } = body.into_inner();
    tracing::debug!(user, bet_amount, drop_position, "received play request");
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::play(user, bet_amount, drop_position, response_sender);
    let outcome = forward(sender.get_ref(), query, response_receiver).await?;
    Ok(web::Json(outcome))
}

async fn handle_stats(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
) -> std::result::Result<web::Json<StatsSummary>, ApiError> {
    caller(&request)?;
    summary(sender.get_ref(), StatsScope::All).await
}

async fn handle_my_stats(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
) -> std::result::Result<web::Json<StatsSummary>, ApiError> {
    let user = caller(&request)?;
    summary(sender.get_ref(), StatsScope::ForUser(user)).await
}

async fn summary(
    sender: &mpsc::Sender<Query>,
    scope: StatsScope,
) -> std::result::Result<web::Json<StatsSummary>, ApiError> {
    tracing::debug!("received stats request for {scope:?}");
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::stats(scope, response_sender);
    let summary = forward(sender, query, response_receiver).await?;
    Ok(web::Json(summary))
}

async fn handle_admin_settings(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
) -> std::result::Result<web::Json<GameSettings>, ApiError> {
    authorize_admin(&request)?;
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::Admin(AdminQuery::Settings {
        sender: response_sender,
    });
    let settings = forward(sender.get_ref(), query, response_receiver).await?;
    Ok(web::Json(settings))
}

async fn handle_admin_update_setting(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
    key: web::Path<String>,
    body: web::Json<SettingUpdateDto>,
) -> std::result::Result<web::Json<GameSettings>, ApiError> {
    authorize_admin(&request)?;
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::Admin(AdminQuery::UpdateSetting {
        key: key.into_inner(),
        value: body.into_inner().value,
        sender: response_sender,
    });
    let settings = forward(sender.get_ref(), query, response_receiver).await?;
    Ok(web::Json(settings))
}

async fn handle_admin_points(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
    body: web::Json<PointsRequestDto>,
) -> std::result::Result<web::Json<Account>, ApiError> {
    authorize_admin(&request)?;
    let PointsRequestDto { username, amount } = body.into_inner();
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::Admin(AdminQuery::AdjustPoints {
        username,
        amount,
        sender: response_sender,
    });
    let account = forward(sender.get_ref(), query, response_receiver).await?;
    Ok(web::Json(account))
}

async fn handle_admin_register(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
    body: web::Json<RegisterRequestDto>,
) -> std::result::Result<web::Json<Account>, ApiError> {
    authorize_admin(&request)?;
    let RegisterRequestDto { username, balance } = body.into_inner();
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::Admin(AdminQuery::Register {
        username,
        balance,
        sender: response_sender,
    });
    let account = forward(sender.get_ref(), query, response_receiver).await?;
    Ok(web::Json(account))
}

async fn handle_admin_stats(
    request: HttpRequest,
    sender: web::Data<mpsc::Sender<Query>>,
    params: web::Query<StatsParamsDto>,
) -> std::result::Result<web::Json<StatsSummary>, ApiError> {
    authorize_admin(&request)?;
    let defaults = StatsOptions::default();
    let options = StatsOptions {
        top_players: params.top.unwrap_or(defaults.top_players),
        recent_games: params.recent.unwrap_or(defaults.recent_games),
    };
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::stats_with(StatsScope::All, options, response_sender);
    let summary = forward(sender.get_ref(), query, response_receiver).await?;
    Ok(web::Json(summary))
}
