//! Verification documents and their review

use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Document, DocumentReviewRequest, DocumentUpload, MyDocuments, NotificationKind,
    VerificationStatus, verification_summary,
};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::services::{notify, verification};
use crate::state::AppState;

use super::ApiResult;

/// POST /api/documents
///
/// Files are stored elsewhere; only the metadata lands here.
pub async fn upload(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<DocumentUpload>,
) -> ApiResult<Document> {
    if req.file_url.trim().is_empty() || req.file_name.trim().is_empty() {
        return Err(AppError::validation("file_url and file_name are required"));
    }
    let now = now_millis();
    if req.expires_at.is_some_and(|e| e <= now) {
        return Err(AppError::with_message(
            ErrorCode::InvalidDateRange,
            "The document has already expired",
        ));
    }

    let document = Document {
        id: snowflake_id(),
        user_id: user.id,
        doc_type: req.doc_type.as_db().to_string(),
        file_url: req.file_url.trim().to_string(),
        file_name: req.file_name.trim().to_string(),
        status: VerificationStatus::Pending.as_db().to_string(),
        expires_at: req.expires_at,
        rejection_reason: None,
        reviewed_by: None,
        reviewed_at: None,
        created_at: now,
    };
    db::documents::insert(&state.pool, &document)
        .await
        .map_err(internal)?;
    tracing::info!(document_id = document.id, user_id = user.id, doc_type = %req.doc_type, "Document uploaded");
    Ok(Json(document))
}

/// GET /api/documents
pub async fn mine(State(state): State<AppState>, user: CurrentUser) -> ApiResult<MyDocuments> {
    let documents = db::documents::list_by_user(&state.pool, user.id)
        .await
        .map_err(internal)?;
    let verification = verification_summary(user.role, &documents, now_millis());
    Ok(Json(MyDocuments {
        documents,
        verification,
    }))
}

/// GET /api/admin/documents/pending
pub async fn pending(State(state): State<AppState>) -> ApiResult<Vec<Document>> {
    let rows = db::documents::list_pending(&state.pool)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// POST /api/admin/documents/{id}/review
pub async fn review(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<DocumentReviewRequest>,
) -> ApiResult<Document> {
    let reason = req.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    match req.status {
        VerificationStatus::Approved => {}
        VerificationStatus::Rejected if reason.is_none() => {
            return Err(AppError::new(ErrorCode::RejectionReasonRequired));
        }
        VerificationStatus::Rejected => {}
        other => {
            return Err(AppError::validation(format!(
                "A review decides APPROVED or REJECTED, not {other}"
            )));
        }
    }

    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let document = db::documents::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::DocumentNotFound))?;
    if document.status() != Some(VerificationStatus::Pending) {
        return Err(AppError::new(ErrorCode::DocumentAlreadyReviewed));
    }

    let reviewed = db::documents::review(&mut *tx, id, req.status, reason, admin.id, now)
        .await
        .map_err(internal)?;
    let verified = verification::reevaluate(&mut tx, document.user_id, now).await?;

    let body = match reason {
        Some(reason) => format!("Your {} was {}: {reason}", document.doc_type, req.status),
        None => format!("Your {} was {}", document.doc_type, req.status),
    };
    notify::send(
        &mut *tx,
        document.user_id,
        NotificationKind::DocumentReviewed,
        "Document reviewed",
        body,
        Some(id),
        now,
    )
    .await
    .map_err(internal)?;
    db::audit::log(
        &mut *tx,
        Some(admin.id),
        "document_reviewed",
        Some(id),
        Some(&json!({ "status": req.status.as_db(), "user_id": document.user_id, "verified": verified })),
        None,
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(document_id = id, status = %req.status, user_verified = verified, "Document reviewed");
    Ok(Json(reviewed))
}
