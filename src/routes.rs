use actix_identity::Identity;
use actix_web::{
    delete, get, post, put,
    web::{self, Data},
    HttpMessage, HttpRequest, HttpResponse, Responder,
};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::Session,
    db,
    errors::AppError,
    format, partners,
    stats::{self, CategoryTotal, OwnerComparison, Statistics},
    structs::{EventInput, ExpenseInput, Granularity, IncomeInput, NewUser, UserId, ViewMode},
    utils, AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        AppError::ValidationError(format!("Invalid request body: {err}")).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        AppError::ValidationError(format!("Invalid query: {err}")).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _| {
        AppError::ValidationError(format!("Invalid path: {err}")).into()
    }))
    .service(register_handler)
    .service(login_handler)
    .service(logout_handler)
    .service(profile_handler)
    .service(search_handler)
    .service(request_link_handler)
    .service(pending_requests_handler)
    .service(respond_link_handler)
    .service(list_expenses_handler)
    .service(create_expense_handler)
    .service(update_expense_handler)
    .service(delete_expense_handler)
    .service(list_incomes_handler)
    .service(create_income_handler)
    .service(update_income_handler)
    .service(delete_income_handler)
    .service(list_events_handler)
    .service(create_event_handler)
    .service(delete_event_handler)
    .service(stats_handler);
}

// ---- auth ----

/// Register handler
#[post("/api/auth/register")]
pub async fn register_handler(
    state: Data<AppState>,
    web::Json(form): web::Json<NewUser>,
) -> Result<impl Responder, AppError> {
    if form.name.trim().is_empty()
        || form.username.trim().is_empty()
        || form.email.trim().is_empty()
        || form.password.is_empty()
    {
        return Err(AppError::ValidationError("All fields are required".to_owned()));
    }
    if !form.email.contains('@') {
        return Err(AppError::ValidationError("Invalid email address".to_owned()));
    }
    if form.password.len() < 12 {
        return Err(AppError::ValidationError(
            "Password must be at least 12 characters long".to_owned(),
        ));
    }
    if form.password.len() > 128 {
        return Err(AppError::ValidationError(
            "Password must be at most 128 characters long".to_owned(),
        ));
    }

    db::create_user(&state, form).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "User created successfully" })))
}

#[derive(Deserialize)]
pub struct Login {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginUser {
    id: UserId,
    email: String,
    name: String,
    username: String,
    partner_id: Option<UserId>,
    partner_name: Option<String>,
}

#[post("/api/auth/login")]
pub async fn login_handler(
    state: Data<AppState>,
    web::Json(form): web::Json<Login>,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    let invalid = || AppError::Unauthorized("Invalid credentials".to_owned());

    let user = db::find_user_by_email(&state, &form.email)
        .await?
        .ok_or_else(invalid)?;
    if !utils::verify_password(&form.password, &user.pwd_hash)? {
        log::warn!("Failed login for user ID: {}", user.id);
        return Err(invalid());
    }

    Identity::login(&request.extensions(), user.id.to_string())
        .map_err(|e| AppError::IdentityError(e.to_string()))?;

    let partner_name = match user.partner_id {
        Some(partner_id) => Some(db::get_user_by_id(&state, partner_id).await?.name),
        None => None,
    };
    log::info!("User {} logged in", user.id);

    let user = LoginUser {
        id: user.id,
        email: user.email,
        name: user.name,
        username: user.username,
        partner_id: user.partner_id,
        partner_name,
    };
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

#[post("/api/auth/logout")]
pub async fn logout_handler(identity: Option<Identity>) -> impl Responder {
    if let Some(identity) = identity {
        identity.logout();
    }
    HttpResponse::Ok().json(json!({ "message": "Logged out" }))
}

// ---- user & partner link ----

#[get("/api/user/profile")]
pub async fn profile_handler(
    state: Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let profile = db::profile(&state, session.user_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    username: String,
}

#[get("/api/user/search")]
pub async fn search_handler(
    state: Data<AppState>,
    session: Session,
    query: web::Query<SearchQuery>,
) -> Result<impl Responder, AppError> {
    let user = partners::search(&state, session.user_id, &query.username).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequestBody {
    target_user_id: UserId,
}

#[post("/api/user/request-link")]
pub async fn request_link_handler(
    state: Data<AppState>,
    session: Session,
    web::Json(body): web::Json<LinkRequestBody>,
) -> Result<impl Responder, AppError> {
    let request = partners::send_request(&state, session.user_id, body.target_user_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Request sent",
        "request": request,
    })))
}

#[get("/api/user/requests")]
pub async fn pending_requests_handler(
    state: Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let requests = partners::pending_requests(&state, session.user_id).await?;
    Ok(HttpResponse::Ok().json(requests))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    request_id: i64,
    action: String,
}

#[post("/api/user/respond-link")]
pub async fn respond_link_handler(
    state: Data<AppState>,
    session: Session,
    web::Json(body): web::Json<RespondBody>,
) -> Result<impl Responder, AppError> {
    let action = body.action.parse()?;
    let outcome = partners::respond(&state, body.request_id, session.user_id, action).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

// ---- records ----

/// A listed record plus its display date, e.g. "05 ene 2024".
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Listed<T> {
    #[serde(flatten)]
    record: T,
    date_label: String,
}

fn with_date_labels<T>(records: Vec<T>, date: impl Fn(&T) -> NaiveDate) -> Vec<Listed<T>> {
    records
        .into_iter()
        .map(|record| Listed {
            date_label: format::format_date(date(&record)),
            record,
        })
        .collect()
}

#[derive(Deserialize)]
pub struct ModeQuery {
    #[serde(default)]
    mode: ViewMode,
}

#[get("/api/expenses")]
pub async fn list_expenses_handler(
    state: Data<AppState>,
    session: Session,
    query: web::Query<ModeQuery>,
) -> Result<impl Responder, AppError> {
    let expenses = db::list_expenses(&state, session.user_id, query.mode).await?;
    Ok(HttpResponse::Ok().json(with_date_labels(expenses, |e| e.date)))
}

#[post("/api/expenses")]
pub async fn create_expense_handler(
    state: Data<AppState>,
    session: Session,
    web::Json(input): web::Json<ExpenseInput>,
) -> Result<impl Responder, AppError> {
    let expense = db::create_expense(&state, session.user_id, input).await?;
    Ok(HttpResponse::Created().json(expense))
}

#[put("/api/expenses/{id}")]
pub async fn update_expense_handler(
    state: Data<AppState>,
    session: Session,
    path: web::Path<i64>,
    web::Json(input): web::Json<ExpenseInput>,
) -> Result<impl Responder, AppError> {
    let expense = db::update_expense(&state, session.user_id, path.into_inner(), input).await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[delete("/api/expenses/{id}")]
pub async fn delete_expense_handler(
    state: Data<AppState>,
    session: Session,
    path: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    db::delete_expense(&state, session.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Expense deleted" })))
}

#[get("/api/incomes")]
pub async fn list_incomes_handler(
    state: Data<AppState>,
    session: Session,
    query: web::Query<ModeQuery>,
) -> Result<impl Responder, AppError> {
    let incomes = db::list_incomes(&state, session.user_id, query.mode).await?;
    Ok(HttpResponse::Ok().json(with_date_labels(incomes, |i| i.date)))
}

#[post("/api/incomes")]
pub async fn create_income_handler(
    state: Data<AppState>,
    session: Session,
    web::Json(input): web::Json<IncomeInput>,
) -> Result<impl Responder, AppError> {
    let income = db::create_income(&state, session.user_id, input).await?;
    Ok(HttpResponse::Created().json(income))
}

#[put("/api/incomes/{id}")]
pub async fn update_income_handler(
    state: Data<AppState>,
    session: Session,
    path: web::Path<i64>,
    web::Json(input): web::Json<IncomeInput>,
) -> Result<impl Responder, AppError> {
    let income = db::update_income(&state, session.user_id, path.into_inner(), input).await?;
    Ok(HttpResponse::Ok().json(income))
}

#[delete("/api/incomes/{id}")]
pub async fn delete_income_handler(
    state: Data<AppState>,
    session: Session,
    path: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    db::delete_income(&state, session.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Income deleted" })))
}

#[get("/api/events")]
pub async fn list_events_handler(
    state: Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let events = db::list_events(&state, session.user_id).await?;
    Ok(HttpResponse::Ok().json(with_date_labels(events, |e| e.date)))
}

#[post("/api/events")]
pub async fn create_event_handler(
    state: Data<AppState>,
    session: Session,
    web::Json(input): web::Json<EventInput>,
) -> Result<impl Responder, AppError> {
    let event = db::create_event(&state, session.user_id, input).await?;
    Ok(HttpResponse::Created().json(event))
}

#[delete("/api/events/{id}")]
pub async fn delete_event_handler(
    state: Data<AppState>,
    session: Session,
    path: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    if !db::delete_event(&state, session.user_id, path.into_inner()).await? {
        return Err(AppError::NotFound("Event not found".to_owned()));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Event deleted" })))
}

// ---- statistics ----

#[derive(Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    mode: ViewMode,
    #[serde(default)]
    period: Granularity,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Serialize)]
struct LabelledPeriod {
    period: String,
    label: String,
    #[serde(with = "rust_decimal::serde::float")]
    total: rust_decimal::Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    statistics: Statistics,
    total_formatted: String,
    by_category: Vec<CategoryTotal>,
    by_period: Vec<LabelledPeriod>,
    comparison: Option<OwnerComparison>,
}

#[get("/api/stats")]
pub async fn stats_handler(
    state: Data<AppState>,
    session: Session,
    query: web::Query<StatsQuery>,
) -> Result<impl Responder, AppError> {
    let expenses = db::list_expenses(&state, session.user_id, query.mode).await?;
    let expenses = stats::filter_by_date_range(&expenses, query.from, query.to);

    let statistics = stats::statistics(&expenses);
    let by_period = stats::by_period(&expenses, query.period)
        .into_iter()
        .map(|p| LabelledPeriod {
            label: format::period_label(&p.period, query.period),
            period: p.period,
            total: p.total,
        })
        .collect();
    let comparison = match query.mode {
        ViewMode::Joint => {
            let user = db::get_user_by_id(&state, session.user_id).await?;
            user.partner_id
                .map(|_| stats::owner_comparison(&expenses, session.user_id))
        }
        ViewMode::Personal => None,
    };

    Ok(HttpResponse::Ok().json(StatsResponse {
        total_formatted: format::format_currency(statistics.total.to_f64()),
        by_category: stats::by_category(&expenses),
        by_period,
        comparison,
        statistics,
    }))
}

pub async fn default_handler() -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound("Not found".to_owned()))
}
