use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;

use crate::activity::{self, Activity};
use crate::analytics::DashboardAnalyzer;
use crate::error::LedgerError;
use crate::ledger::RewardsLedger;
use crate::store::RewardsStore;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    pub points: i64,
    pub idempotency_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodRequest {
    pub mood: String,
    pub level: u8,
    pub request_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRequest {
    pub entry: String,
    pub mood: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub message: String,
    pub rating: Option<u8>,
    pub request_id: Option<String>,
}

/// `focusedSeconds` is the timer's running time with pauses excluded. When a
/// client leaves it out the whole `startedAt..endedAt` span is credited,
/// paused stretches included.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusCompleteRequest {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub focused_seconds: Option<u64>,
    pub request_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub material_id: String,
}

pub fn error_response(err: LedgerError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        LedgerError::InvalidInput(_) => HttpResponse::BadRequest().json(body),
        LedgerError::NotFound(_) => HttpResponse::NotFound().json(body),
        LedgerError::Conflict { .. } => HttpResponse::Conflict().json(body),
        LedgerError::StoreUnavailable(_) => {
            error!("store unavailable: {err}");
            HttpResponse::ServiceUnavailable().json(body)
        }
        LedgerError::Corrupt(_) => HttpResponse::InternalServerError().json(body),
    }
}

fn request_id(id: Option<String>) -> String {
    id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("NeuroSync rewards API is running!")
}

async fn get_rewards<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
) -> HttpResponse {
    let user_id = path.into_inner();
    match ledger.get_record(&user_id).await {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => error_response(LedgerError::NotFound(user_id)),
        Err(err) => error_response(err),
    }
}

async fn get_dashboard<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
) -> HttpResponse {
    let user_id = path.into_inner();
    let record = match ledger.get_record(&user_id).await {
        Ok(record) => record,
        Err(err) => return error_response(err),
    };
    let counts = match ledger.activity_counts(&user_id).await {
        Ok(counts) => counts,
        Err(err) => return error_response(err),
    };

    let dashboard = DashboardAnalyzer::new().generate_dashboard(&user_id, record.as_ref(), &counts);
    HttpResponse::Ok().json(dashboard)
}

async fn award_points<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
    req: web::Json<AwardRequest>,
) -> HttpResponse {
    let user_id = path.into_inner();
    let points = match u64::try_from(req.points) {
        Ok(points) => points,
        Err(_) => return error_response(LedgerError::invalid("points must be positive")),
    };

    let result = match &req.idempotency_key {
        Some(key) => ledger.award_once(&user_id, points, key).await,
        None => ledger.award(&user_id, points).await,
    };
    match result {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(err) => error_response(err),
    }
}

async fn evaluate_badges<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
) -> HttpResponse {
    match ledger.evaluate_badges(&path.into_inner()).await {
        Ok(badges) => HttpResponse::Ok().json(badges),
        Err(err) => error_response(err),
    }
}

async fn perform<S: RewardsStore + 'static>(
    ledger: &RewardsLedger<S>,
    user_id: &str,
    id: &str,
    activity: Activity,
) -> HttpResponse {
    match activity::perform(ledger, user_id, id, activity).await {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(err) => error_response(err),
    }
}

async fn log_mood<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
    req: web::Json<MoodRequest>,
) -> HttpResponse {
    let req = req.into_inner();
    let id = request_id(req.request_id);
    let activity = Activity::Mood {
        mood: req.mood,
        level: req.level,
    };
    perform(&ledger, &path.into_inner(), &id, activity).await
}

async fn save_journal<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
    req: web::Json<JournalRequest>,
) -> HttpResponse {
    let req = req.into_inner();
    let id = request_id(req.request_id);
    let activity = Activity::Journal {
        entry: req.entry,
        mood: req.mood,
    };
    perform(&ledger, &path.into_inner(), &id, activity).await
}

async fn submit_feedback<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
    req: web::Json<FeedbackRequest>,
) -> HttpResponse {
    let req = req.into_inner();
    let id = request_id(req.request_id);
    let activity = Activity::Feedback {
        message: req.message,
        rating: req.rating,
    };
    perform(&ledger, &path.into_inner(), &id, activity).await
}

async fn complete_focus_session<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
    req: web::Json<FocusCompleteRequest>,
) -> HttpResponse {
    let req = req.into_inner();
    let id = request_id(req.request_id);
    let span = (req.ended_at - req.started_at).num_seconds().max(0) as u64;
    let activity = Activity::FocusSession {
        started_at: req.started_at,
        ended_at: req.ended_at,
        focused_seconds: req.focused_seconds.unwrap_or(span),
    };
    perform(&ledger, &path.into_inner(), &id, activity).await
}

// Moderator approval of an uploaded study material; points go to the uploader.
async fn approve_material<S: RewardsStore + 'static>(
    ledger: web::Data<RewardsLedger<S>>,
    path: web::Path<String>,
    req: web::Json<ApproveRequest>,
) -> HttpResponse {
    let material_id = req.into_inner().material_id;
    let id = format!("approval:{material_id}");
    let activity = Activity::MaterialApproved { material_id };
    perform(&ledger, &path.into_inner(), &id, activity).await
}

/// Registers every route. The app must carry a `web::Data<RewardsLedger<S>>`.
pub fn configure<S: RewardsStore + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/rewards/{user_id}", web::get().to(get_rewards::<S>))
        .route("/rewards/{user_id}/dashboard", web::get().to(get_dashboard::<S>))
        .route("/rewards/{user_id}/award", web::post().to(award_points::<S>))
        .route(
            "/rewards/{user_id}/badges/evaluate",
            web::post().to(evaluate_badges::<S>),
        )
        .route("/users/{user_id}/moods", web::post().to(log_mood::<S>))
        .route("/users/{user_id}/journal", web::post().to(save_journal::<S>))
        .route("/users/{user_id}/feedback", web::post().to(submit_feedback::<S>))
        .route(
            "/users/{user_id}/focus-sessions/complete",
            web::post().to(complete_focus_session::<S>),
        )
        .route("/materials/{user_id}/approve", web::post().to(approve_material::<S>));
}
