use anyhow::{Context, Result};
use axum::extract::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_macros::debug_handler;
use clap::Parser;
use coupon::api::*;
use coupon::db::SQLite;
use coupon::settings::Settings;
use coupon::settlement::Settlement;
use env_logger::{Builder, WriteStyle};
use log::{debug, error};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[debug_handler]
async fn register(
    State(state): State<Arc<RwLock<Settlement>>>,
    Json(access): Json<AccessRequest>,
) -> Result<Json<Credits>, (StatusCode, String)> {
    let backend = state.write().await;
    let balance = backend
        .register(access)
        .await
        .map_err(map_settlement_err)?;
    Ok(Json(balance))
}
#[debug_handler]
async fn submit_coupon(
    State(state): State<Arc<RwLock<Settlement>>>,
    Json(request): Json<PostRequest<SubmitCouponRequest>>,
) -> Result<(StatusCode, Json<CouponReceipt>), (StatusCode, String)> {
    let backend = state.write().await;
    let (request, access) = (request.data, request.access);
    debug!(
        "Submitting coupon with {} selections and stake {} for user {}",
        request.selections.len(),
        request.stake_amount,
        access.user
    );
    let receipt = backend
        .submit_coupon(access, request)
        .await
        .map_err(map_settlement_err)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
async fn get_balance(
    State(state): State<Arc<RwLock<Settlement>>>,
    Json(access): Json<AccessRequest>,
) -> Result<Json<Credits>, (StatusCode, String)> {
    let backend = state.read().await;
    let balance = backend
        .get_balance(access)
        .await
        .map_err(map_settlement_err)?;
    Ok(Json(balance))
}
async fn get_coupons(
    State(state): State<Arc<RwLock<Settlement>>>,
    Json(access): Json<AccessRequest>,
) -> Result<Json<Vec<CouponSummary>>, (StatusCode, String)> {
    let backend = state.read().await;
    let coupons = backend
        .get_coupons(access)
        .await
        .map_err(map_settlement_err)?;
    Ok(Json(coupons))
}
async fn get_questions(
    State(state): State<Arc<RwLock<Settlement>>>,
) -> Result<Json<Vec<QuestionResponse>>, (StatusCode, String)> {
    let backend = state.read().await;
    let questions = backend
        .get_questions()
        .await
        .map_err(map_settlement_err)?;
    Ok(Json(questions))
}
async fn new_question(
    State(state): State<Arc<RwLock<Settlement>>>,
    Json(request): Json<PostRequest<NewQuestionRequest>>,
) -> Result<(StatusCode, Json<QuestionId>), (StatusCode, String)> {
    let backend = state.write().await;
    let (request, access) = (request.data, request.access);
    let id = backend
        .new_question(
            request.question.clone(),
            request.yes_odds,
            request.no_odds,
            access,
        )
        .await
        .map_err(map_settlement_err)?;
    debug!("Created question {}: {}", id, request.question);
    Ok((StatusCode::CREATED, Json(id)))
}
async fn close_question(
    State(state): State<Arc<RwLock<Settlement>>>,
    Json(request): Json<PostRequest<QuestionRequest>>,
) -> Result<(), (StatusCode, String)> {
    let backend = state.write().await;
    let (request, access) = (request.data, request.access);
    backend
        .close_question(request.question, access)
        .await
        .map_err(map_settlement_err)?;
    debug!("Closed question {}", request.question);
    Ok(())
}
async fn adjust_balance(
    State(state): State<Arc<RwLock<Settlement>>>,
    Json(request): Json<PostRequest<AdjustBalanceRequest>>,
) -> Result<Json<Credits>, (StatusCode, String)> {
    let backend = state.write().await;
    let (request, access) = (request.data, request.access);
    let balance = backend
        .adjust_balance(request.user.clone(), request.amount, access)
        .await
        .map_err(map_settlement_err)?;
    debug!(
        "Adjusted balance of {} by {} to {}",
        request.user, request.amount, balance
    );
    Ok(Json(balance))
}

#[derive(Parser)]
struct Args {
    /// Settings file, defaults to ./coupon.toml if present
    #[arg(short, long)]
    config: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long)]
    admin: Vec<String>,
    #[arg(short, long)]
    test: bool,
    #[arg(short, long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    Builder::default()
        .filter_level(settings.log_level())
        .write_style(WriteStyle::Always)
        .init();
    let mut admins = settings.server.admins.clone();
    admins.extend(cli.admin);
    let settlement = Settlement::new(
        Box::new(SQLite::new(cli.db.or(settings.server.db.clone())).await?),
        admins,
        settings.server.starting_balance,
        cli.test,
    );
    let (_port, handle) = run_server(Some(cli.port.unwrap_or(settings.server.port)), settlement)?;
    handle.await.context("server task failed")?;
    Ok(())
}

fn run_server(port: Option<u16>, settlement: Settlement) -> Result<(u16, JoinHandle<()>)> {
    let state = Arc::new(RwLock::new(settlement));
    let app = Router::new()
        .route("/register", post(register))
        .route("/submit_coupon", post(submit_coupon))
        .route("/get_balance", post(get_balance))
        .route("/get_coupons", post(get_coupons))
        .route("/get_questions", get(get_questions))
        .route("/new_question", post(new_question))
        .route("/close_question", post(close_question))
        .route("/adjust_balance", post(adjust_balance))
        .with_state(state);

    let addr = "127.0.0.1:".to_string() + port.unwrap_or(0).to_string().as_str();
    let server = axum::Server::try_bind(&addr.parse()?)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    debug!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server stopped: {}", e);
        }
    });
    Ok((port, handle))
}
