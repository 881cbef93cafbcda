//! Partner linking: search, request, and accept/reject.
//!
//! A request moves `Pending -> Accepted | Rejected` and never leaves a
//! terminal state. Accepting writes both users and the request in one
//! transaction, so either the whole link exists or none of it does.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Sqlite, Transaction};

use crate::{
    db,
    errors::{conflict_on_unique, AppError},
    structs::{LinkAction, PartnerRequest, PendingRequest, RequestStatus, UserId, UserSummary},
    AppState,
};

impl RequestStatus {
    /// Next status for `action`, or `Conflict` if the request was already answered.
    pub fn apply(self, action: LinkAction) -> Result<RequestStatus, AppError> {
        match (self, action) {
            (RequestStatus::Pending, LinkAction::Accept) => Ok(RequestStatus::Accepted),
            (RequestStatus::Pending, LinkAction::Reject) => Ok(RequestStatus::Rejected),
            (RequestStatus::Accepted | RequestStatus::Rejected, _) => Err(AppError::Conflict(
                "Request has already been answered".to_owned(),
            )),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RespondOutcome {
    Accepted { partner: UserSummary },
    Rejected,
}

pub async fn search(
    state: &AppState,
    caller: UserId,
    username: &str,
) -> Result<UserSummary, AppError> {
    if username.trim().is_empty() {
        return Err(AppError::ValidationError("Username required".to_owned()));
    }
    let user = db::find_user_by_username(state, username)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;
    if user.id == caller {
        return Err(AppError::InvalidOperation(
            "You cannot search for yourself".to_owned(),
        ));
    }
    Ok(UserSummary::from(&user))
}

pub async fn send_request(
    state: &AppState,
    sender_id: UserId,
    receiver_id: UserId,
) -> Result<PartnerRequest, AppError> {
    if sender_id == receiver_id {
        return Err(AppError::InvalidOperation(
            "You cannot link with yourself".to_owned(),
        ));
    }
    let sender = db::get_user_by_id(state, sender_id).await?;
    if sender.partner_id.is_some() {
        log::warn!("User {} already has a partner, request refused", sender_id);
        return Err(AppError::Conflict("You already have a linked partner".to_owned()));
    }
    let receiver = db::get_user_by_id(state, receiver_id).await?;
    if receiver.partner_id.is_some() {
        return Err(AppError::Conflict(
            "That user already has a linked partner".to_owned(),
        ));
    }

    let pool = state.db_pool.clone();
    let existing = sqlx::query_as::<_, PartnerRequest>(
        "SELECT * FROM partner_requests WHERE status = 'PENDING' \
         AND ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .fetch_optional(&pool)
    .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("A pending request already exists".to_owned()));
    }

    // the partial unique index still guards against a concurrent duplicate
    let request = sqlx::query_as::<_, PartnerRequest>(
        "INSERT INTO partner_requests (sender_id, receiver_id, status, created_at) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .bind(RequestStatus::Pending)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| conflict_on_unique(e, "A pending request already exists"))?;
    log::info!(
        "Partner request {} sent from {} to {}",
        request.id,
        sender_id,
        receiver_id
    );
    Ok(request)
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: i64,
    created_at: chrono::DateTime<Utc>,
    sender_id: UserId,
    sender_name: String,
    sender_username: String,
}

/// Pending requests addressed to `receiver_id`, oldest first.
pub async fn pending_requests(
    state: &AppState,
    receiver_id: UserId,
) -> Result<Vec<PendingRequest>, AppError> {
    let pool = state.db_pool.clone();
    let rows = sqlx::query_as::<_, PendingRow>(
        "SELECT r.id, r.created_at, u.id AS sender_id, u.name AS sender_name, \
         u.username AS sender_username \
         FROM partner_requests r JOIN users u ON u.id = r.sender_id \
         WHERE r.receiver_id = $1 AND r.status = 'PENDING' ORDER BY r.created_at, r.id",
    )
    .bind(receiver_id)
    .fetch_all(&pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| PendingRequest {
            id: row.id,
            created_at: row.created_at,
            sender: UserSummary {
                id: row.sender_id,
                name: row.sender_name,
                username: row.sender_username,
            },
        })
        .collect())
}

pub async fn respond(
    state: &AppState,
    request_id: i64,
    responder_id: UserId,
    action: LinkAction,
) -> Result<RespondOutcome, AppError> {
    let pool = state.db_pool.clone();
    let request = sqlx::query_as::<_, PartnerRequest>(
        "SELECT * FROM partner_requests WHERE id = $1",
    )
    .bind(request_id)
    .fetch_optional(&pool)
    .await?
    .filter(|r| r.receiver_id == responder_id)
    .ok_or_else(|| AppError::NotFound("Request not found".to_owned()))?;

    let next = request.status.apply(action)?;

    let mut tx = pool.begin().await?;
    mark_request(&mut tx, request.id, next).await?;
    if next == RequestStatus::Accepted {
        link_user(&mut tx, request.receiver_id, request.sender_id).await?;
        link_user(&mut tx, request.sender_id, request.receiver_id).await?;
        close_other_requests(&mut tx, &request).await?;
    }
    tx.commit().await?;

    match next {
        RequestStatus::Accepted => {
            let partner = db::get_user_by_id(state, request.sender_id).await?;
            log::info!(
                "Users {} and {} are now linked",
                request.sender_id,
                request.receiver_id
            );
            Ok(RespondOutcome::Accepted {
                partner: UserSummary::from(&partner),
            })
        }
        _ => {
            log::info!("Partner request {} rejected", request.id);
            Ok(RespondOutcome::Rejected)
        }
    }
}

async fn mark_request(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: i64,
    status: RequestStatus,
) -> Result<(), AppError> {
    // only a still-pending row may move, so a racing answer loses cleanly
    let result = sqlx::query(
        "UPDATE partner_requests SET status = $1 WHERE id = $2 AND status = 'PENDING'",
    )
    .bind(status)
    .bind(request_id)
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Request has already been answered".to_owned(),
        ));
    }
    Ok(())
}

async fn link_user(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: UserId,
    partner_id: UserId,
) -> Result<(), AppError> {
    let result =
        sqlx::query("UPDATE users SET partner_id = $1 WHERE id = $2 AND partner_id IS NULL")
            .bind(partner_id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
    if result.rows_affected() == 0 {
        log::warn!("User {} is already linked, aborting link", user_id);
        return Err(AppError::Conflict(
            "One of the accounts is already linked".to_owned(),
        ));
    }
    Ok(())
}

/// Rejects every other pending request touching either newly linked user.
async fn close_other_requests(
    tx: &mut Transaction<'_, Sqlite>,
    accepted: &PartnerRequest,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE partner_requests SET status = 'REJECTED' \
         WHERE status = 'PENDING' AND id <> $1 \
         AND (sender_id IN ($2, $3) OR receiver_id IN ($4, $5))",
    )
    .bind(accepted.id)
    .bind(accepted.sender_id)
    .bind(accepted.receiver_id)
    .bind(accepted.sender_id)
    .bind(accepted.receiver_id)
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() > 0 {
        log::info!(
            "Closed {} stale requests after linking {} and {}",
            result.rows_affected(),
            accepted.sender_id,
            accepted.receiver_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[test]
    fn terminal_states_do_not_transition() {
        assert_eq!(
            RequestStatus::Pending.apply(LinkAction::Accept).unwrap(),
            RequestStatus::Accepted
        );
        assert_eq!(
            RequestStatus::Pending.apply(LinkAction::Reject).unwrap(),
            RequestStatus::Rejected
        );
        for status in [RequestStatus::Accepted, RequestStatus::Rejected] {
            for action in [LinkAction::Accept, LinkAction::Reject] {
                assert!(matches!(
                    status.apply(action),
                    Err(AppError::Conflict(_))
                ));
            }
        }
    }

    #[tokio::test]
    async fn search_by_username() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;
        let ben = test_utils::create_user(&state, "ben").await;

        let found = search(&state, ana.id, "ben").await.unwrap();
        assert_eq!(found, UserSummary::from(&ben));

        assert!(matches!(
            search(&state, ana.id, "nobody").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            search(&state, ana.id, "ana").await,
            Err(AppError::InvalidOperation(_))
        ));
        assert!(matches!(
            search(&state, ana.id, "").await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn only_one_pending_request_per_pair() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;
        let ben = test_utils::create_user(&state, "ben").await;

        let request = send_request(&state, ana.id, ben.id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        assert!(matches!(
            send_request(&state, ana.id, ben.id).await,
            Err(AppError::Conflict(_))
        ));
        // the reverse direction counts as the same pair
        assert!(matches!(
            send_request(&state, ben.id, ana.id).await,
            Err(AppError::Conflict(_))
        ));

        let pending = pending_requests(&state, ben.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender.username, "ana");
        assert!(pending_requests(&state, ana.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_request_validation() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;

        assert!(matches!(
            send_request(&state, ana.id, ana.id).await,
            Err(AppError::InvalidOperation(_))
        ));
        assert!(matches!(
            send_request(&state, ana.id, ana.id + 42).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn linked_sender_cannot_request() {
        let state = test_utils::state().await;
        let (ana, _ben) = test_utils::linked_pair(&state).await;
        let carla = test_utils::create_user(&state, "carla").await;

        assert!(matches!(
            send_request(&state, ana.id, carla.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn accept_links_both_users() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;
        let ben = test_utils::create_user(&state, "ben").await;
        let request = send_request(&state, ana.id, ben.id).await.unwrap();

        let outcome = respond(&state, request.id, ben.id, LinkAction::Accept)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RespondOutcome::Accepted {
                partner: UserSummary::from(&ana)
            }
        );

        let ana = db::get_user_by_id(&state, ana.id).await.unwrap();
        let ben = db::get_user_by_id(&state, ben.id).await.unwrap();
        assert_eq!(ana.partner_id, Some(ben.id));
        assert_eq!(ben.partner_id, Some(ana.id));
        assert_eq!(
            test_utils::request_status(&state, request.id).await,
            RequestStatus::Accepted
        );

        // answered requests are terminal
        assert!(matches!(
            respond(&state, request.id, ben.id, LinkAction::Reject).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn only_the_receiver_may_respond() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;
        let ben = test_utils::create_user(&state, "ben").await;
        let request = send_request(&state, ana.id, ben.id).await.unwrap();

        assert!(matches!(
            respond(&state, request.id, ana.id, LinkAction::Accept).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            respond(&state, request.id + 1, ben.id, LinkAction::Accept).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            test_utils::request_status(&state, request.id).await,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn reject_then_request_again() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;
        let ben = test_utils::create_user(&state, "ben").await;
        let request = send_request(&state, ana.id, ben.id).await.unwrap();

        let outcome = respond(&state, request.id, ben.id, LinkAction::Reject)
            .await
            .unwrap();
        assert_eq!(outcome, RespondOutcome::Rejected);
        assert_eq!(
            test_utils::request_status(&state, request.id).await,
            RequestStatus::Rejected
        );
        let ana_after = db::get_user_by_id(&state, ana.id).await.unwrap();
        assert_eq!(ana_after.partner_id, None);

        let again = send_request(&state, ben.id, ana.id).await.unwrap();
        assert_eq!(again.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn failed_accept_leaves_nothing_behind() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;
        let ben = test_utils::create_user(&state, "ben").await;
        let carla = test_utils::create_user(&state, "carla").await;

        let to_ben = send_request(&state, ana.id, ben.id).await.unwrap();
        // ana gets linked elsewhere without going through the request
        sqlx::query("UPDATE users SET partner_id = $1 WHERE id = $2")
            .bind(carla.id)
            .bind(ana.id)
            .execute(&state.db_pool)
            .await
            .unwrap();

        // ben's row and the request row are written before ana's guard fails
        assert!(matches!(
            respond(&state, to_ben.id, ben.id, LinkAction::Accept).await,
            Err(AppError::Conflict(_))
        ));

        let ben = db::get_user_by_id(&state, ben.id).await.unwrap();
        let ana = db::get_user_by_id(&state, ana.id).await.unwrap();
        assert_eq!(ben.partner_id, None);
        assert_eq!(ana.partner_id, Some(carla.id));
        assert_eq!(
            test_utils::request_status(&state, to_ben.id).await,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn accepting_closes_other_pending_requests() {
        let state = test_utils::state().await;
        let ana = test_utils::create_user(&state, "ana").await;
        let ben = test_utils::create_user(&state, "ben").await;
        let carla = test_utils::create_user(&state, "carla").await;
        let dani = test_utils::create_user(&state, "dani").await;

        let ana_to_ben = send_request(&state, ana.id, ben.id).await.unwrap();
        let carla_to_ana = send_request(&state, carla.id, ana.id).await.unwrap();
        let dani_to_ben = send_request(&state, dani.id, ben.id).await.unwrap();
        let carla_to_dani = send_request(&state, carla.id, dani.id).await.unwrap();

        respond(&state, ana_to_ben.id, ben.id, LinkAction::Accept)
            .await
            .unwrap();

        assert_eq!(
            test_utils::request_status(&state, carla_to_ana.id).await,
            RequestStatus::Rejected
        );
        assert_eq!(
            test_utils::request_status(&state, dani_to_ben.id).await,
            RequestStatus::Rejected
        );
        assert_eq!(
            test_utils::request_status(&state, carla_to_dani.id).await,
            RequestStatus::Pending
        );
        assert!(pending_requests(&state, ben.id).await.unwrap().is_empty());
        assert!(pending_requests(&state, ana.id).await.unwrap().is_empty());

        // the stale pair can still link with each other afterwards
        respond(&state, carla_to_dani.id, dani.id, LinkAction::Accept)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn linked_receiver_cannot_be_requested() {
        let state = test_utils::state().await;
        let (ana, _ben) = test_utils::linked_pair(&state).await;
        let carla = test_utils::create_user(&state, "carla").await;

        assert!(matches!(
            send_request(&state, carla.id, ana.id).await,
            Err(AppError::Conflict(_))
        ));
    }
}
