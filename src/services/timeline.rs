use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::pickups::{set_order_status, LineWithOccurrences};
use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{
        occurrence, pickup, timeline_line, LineStatus, OccurrenceKind, OccurrenceStatus,
        PickupStatus, ReturnReason,
    },
    errors::ServiceError,
};

#[derive(Debug, Clone)]
pub struct NewOccurrence {
    pub description: String,
    pub recipient_id: Option<Uuid>,
    pub recipient_name: Option<String>,
    pub destination_department: Option<String>,
    pub kind: OccurrenceKind,
    pub return_reason: Option<ReturnReason>,
}

#[derive(Debug, Clone)]
pub struct OccurrenceOutcome {
    pub occurrence: occurrence::Model,
    /// Pending occurrences on the line that this one answered
    pub answered: u64,
    /// Status of the pickup after the occurrence was recorded
    pub pickup_status: PickupStatus,
}

/// Timeline lines and the occurrences posted on them.
#[derive(Clone)]
pub struct TimelineService {
    db_pool: Arc<DbPool>,
}

impl TimelineService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Opens the next line of a pickup. At most one line per pickup is open.
    #[instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub async fn open_line(
        &self,
        pickup_id: Uuid,
        actor: &AuthUser,
    ) -> Result<timeline_line::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        pickup::Entity::find_by_id(pickup_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Pickup {} not found", pickup_id)))?;

        let open = timeline_line::Entity::find()
            .filter(timeline_line::Column::PickupId.eq(pickup_id))
            .filter(timeline_line::Column::Status.eq(LineStatus::Open))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(open) = open {
            return Err(ServiceError::InvalidOperation(format!(
                "Pickup already has an open timeline line (#{})",
                open.sequence
            )));
        }

        let last = timeline_line::Entity::find()
            .filter(timeline_line::Column::PickupId.eq(pickup_id))
            .order_by_desc(timeline_line::Column::Sequence)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let sequence = last.map_or(1, |l| l.sequence + 1);
        let line = timeline_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            pickup_id: Set(pickup_id),
            sequence: Set(sequence),
            status: Set(LineStatus::Open),
            opened_by: Set(actor.user_id),
            opened_by_name: Set(actor.name.clone()),
            closed_at: Set(None),
            closed_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::from_write_error(e, || {
                ServiceError::InvalidOperation(
                    "Pickup already has an open timeline line".to_string(),
                )
            })
        })?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(line_id = %line.id, sequence, "timeline line opened");
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn list_lines(&self, pickup_id: Uuid) -> Result<Vec<LineWithOccurrences>, ServiceError> {
        let db = &*self.db_pool;
        pickup::Entity::find_by_id(pickup_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Pickup {} not found", pickup_id)))?;

        let lines = timeline_line::Entity::find()
            .filter(timeline_line::Column::PickupId.eq(pickup_id))
            .order_by_asc(timeline_line::Column::Sequence)
            .find_with_related(occurrence::Entity)
            .order_by_asc(occurrence::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(lines
            .into_iter()
            .map(|(line, occurrences)| LineWithOccurrences { line, occurrences })
            .collect())
    }

    /// Closes an open line. Closing is final.
    #[instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub async fn close_line(
        &self,
        pickup_id: Uuid,
        line_id: Uuid,
        actor: &AuthUser,
    ) -> Result<timeline_line::Model, ServiceError> {
        let db = &*self.db_pool;
        self.find_line(pickup_id, line_id).await?;

        let now = Utc::now();
        let result = timeline_line::Entity::update_many()
            .col_expr(timeline_line::Column::Status, Expr::value(LineStatus::Closed))
            .col_expr(timeline_line::Column::ClosedAt, Expr::value(now))
            .col_expr(timeline_line::Column::ClosedBy, Expr::value(actor.user_id))
            .col_expr(timeline_line::Column::UpdatedAt, Expr::value(now))
            .filter(timeline_line::Column::Id.eq(line_id))
            .filter(timeline_line::Column::Status.eq(LineStatus::Open))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(
                "Timeline line is already closed".to_string(),
            ));
        }

        info!(line_id = %line_id, "timeline line closed");
        self.find_line(pickup_id, line_id).await
    }

    /// Posts an occurrence on an open line.
    ///
    /// Every occurrence still pending on the line becomes answered. A product
    /// return also moves the pickup to `RETORNADO`.
    #[instrument(skip(self, input, actor), fields(user = %actor.user_id, kind = %input.kind))]
    pub async fn add_occurrence(
        &self,
        pickup_id: Uuid,
        line_id: Uuid,
        input: NewOccurrence,
        actor: &AuthUser,
    ) -> Result<OccurrenceOutcome, ServiceError> {
        let description = input.description.trim().to_string();
        if description.is_empty() {
            return Err(ServiceError::ValidationError(
                "description is required".to_string(),
            ));
        }
        let return_reason = match input.kind {
            OccurrenceKind::ProductReturn => Some(input.return_reason.ok_or_else(|| {
                ServiceError::ValidationError(
                    "return_reason is required for RETORNO_PRODUTO occurrences".to_string(),
                )
            })?),
            OccurrenceKind::Information => None,
        };

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        // Pickup before line, the same order open_line and delete_pickup take.
        let current = pickup::Entity::find_by_id(pickup_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Pickup {} not found", pickup_id)))?;

        let line = timeline_line::Entity::find_by_id(line_id)
            .filter(timeline_line::Column::PickupId.eq(pickup_id))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| line_not_found(line_id))?;
        if line.status == LineStatus::Closed {
            return Err(ServiceError::InvalidOperation(
                "Timeline line is closed".to_string(),
            ));
        }

        let now = Utc::now();
        let answered = occurrence::Entity::update_many()
            .col_expr(occurrence::Column::Status, Expr::value(OccurrenceStatus::Answered))
            .col_expr(occurrence::Column::AnsweredAt, Expr::value(now))
            .col_expr(occurrence::Column::UpdatedAt, Expr::value(now))
            .filter(occurrence::Column::LineId.eq(line_id))
            .filter(occurrence::Column::Status.eq(OccurrenceStatus::Pending))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .rows_affected;

        let occurrence = occurrence::ActiveModel {
            id: Set(Uuid::new_v4()),
            line_id: Set(line_id),
            pickup_id: Set(pickup_id),
            description: Set(description),
            sender_id: Set(actor.user_id),
            sender_name: Set(actor.name.clone()),
            recipient_id: Set(input.recipient_id),
            recipient_name: Set(non_empty(input.recipient_name)),
            origin_department: Set(actor.department.clone()),
            destination_department: Set(non_empty(input.destination_department)),
            status: Set(OccurrenceStatus::Pending),
            kind: Set(input.kind),
            return_reason: Set(return_reason),
            answered_at: Set(None),
            resolved_at: Set(None),
            resolved_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut pickup_status = current.status;
        if input.kind == OccurrenceKind::ProductReturn
            && current.status.can_transition_to(PickupStatus::Returned)
        {
            let order_id = current.order_id;
            let mut active: pickup::ActiveModel = current.into();
            active.status = Set(PickupStatus::Returned);
            active.updated_at = Set(now);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
            set_order_status(&txn, order_id, Some(PickupStatus::Returned), now).await?;
            pickup_status = PickupStatus::Returned;
            counter!("warehouse_pickups.returned", 1);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("warehouse_occurrences.created", 1, "kind" => input.kind.to_string());
        info!(occurrence_id = %occurrence.id, answered, "occurrence recorded");
        Ok(OccurrenceOutcome {
            occurrence,
            answered,
            pickup_status,
        })
    }

    /// Marks an occurrence as resolved. Resolution is final.
    #[instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub async fn resolve_occurrence(
        &self,
        occurrence_id: Uuid,
        actor: &AuthUser,
    ) -> Result<occurrence::Model, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();
        let result = occurrence::Entity::update_many()
            .col_expr(occurrence::Column::Status, Expr::value(OccurrenceStatus::Resolved))
            .col_expr(occurrence::Column::ResolvedAt, Expr::value(now))
            .col_expr(occurrence::Column::ResolvedBy, Expr::value(actor.user_id))
            .col_expr(occurrence::Column::UpdatedAt, Expr::value(now))
            .filter(occurrence::Column::Id.eq(occurrence_id))
            .filter(occurrence::Column::Status.ne(OccurrenceStatus::Resolved))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;

        let occurrence = occurrence::Entity::find_by_id(occurrence_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Occurrence {} not found", occurrence_id))
            })?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(
                "Occurrence is already resolved".to_string(),
            ));
        }
        Ok(occurrence)
    }

    async fn find_line(
        &self,
        pickup_id: Uuid,
        line_id: Uuid,
    ) -> Result<timeline_line::Model, ServiceError> {
        timeline_line::Entity::find_by_id(line_id)
            .filter(timeline_line::Column::PickupId.eq(pickup_id))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| line_not_found(line_id))
    }
}

fn line_not_found(line_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Timeline line {} not found", line_id))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::DbPool,
        entities::{order, UserRole},
        services::test_support::{seed_user, test_db},
    };
    use assert_matches::assert_matches;

    async fn seed_pickup(pool: &DbPool, status: PickupStatus) -> pickup::Model {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(format!("PED-{}", &Uuid::new_v4().to_string()[..8])),
            erp_order_id: Set(Some("77".into())),
            erp_status: Set(None),
            internal_status: Set(Some(status)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(pool)
        .await
        .unwrap();
        pickup::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            pickup_number: Set(1),
            retriever_name: Set(None),
            retriever_cpf: Set(None),
            operator_id: Set(None),
            operator_name: Set(None),
            carrier: Set(None),
            tracking_code: Set(None),
            previous_tracking_code: Set(None),
            tracking_updated_at: Set(None),
            status: Set(status),
            photo_url: Set(None),
            items: Set(None),
            erp_synced_at: Set(None),
            erp_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(pool)
        .await
        .unwrap()
    }

    fn note(text: &str, department: Option<&str>) -> NewOccurrence {
        NewOccurrence {
            description: text.to_string(),
            recipient_id: None,
            recipient_name: None,
            destination_department: department.map(str::to_string),
            kind: OccurrenceKind::Information,
            return_reason: None,
        }
    }

    #[tokio::test]
    async fn only_one_line_open_at_a_time() {
        let db = test_db().await;
        let user = seed_user(&db.pool, "Ana", UserRole::Operator, "EXPEDICAO").await;
        let pickup = seed_pickup(&db.pool, PickupStatus::PickedUp).await;
        let service = TimelineService::new(db.pool.clone());

        let first = service.open_line(pickup.id, &user).await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_matches!(
            service.open_line(pickup.id, &user).await,
            Err(ServiceError::InvalidOperation(_))
        );

        service.close_line(pickup.id, first.id, &user).await.unwrap();
        assert_matches!(
            service.close_line(pickup.id, first.id, &user).await,
            Err(ServiceError::InvalidOperation(_))
        );

        let second = service.open_line(pickup.id, &user).await.unwrap();
        assert_eq!(second.sequence, 2);
    }

    fn open_line_row(pickup_id: Uuid, sequence: i32, user: &AuthUser) -> timeline_line::ActiveModel {
        let now = Utc::now();
        timeline_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            pickup_id: Set(pickup_id),
            sequence: Set(sequence),
            status: Set(LineStatus::Open),
            opened_by: Set(user.user_id),
            opened_by_name: Set(user.name.clone()),
            closed_at: Set(None),
            closed_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    #[tokio::test]
    async fn open_line_index_rejects_a_second_open_row() {
        let db = test_db().await;
        let user = seed_user(&db.pool, "Ana", UserRole::Operator, "EXPEDICAO").await;
        let pickup = seed_pickup(&db.pool, PickupStatus::PickedUp).await;

        open_line_row(pickup.id, 1, &user).insert(&*db.pool).await.unwrap();

        // Bypasses the service check so only the partial index stands in the way
        let err = open_line_row(pickup.id, 2, &user)
            .insert(&*db.pool)
            .await
            .unwrap_err();
        assert!(crate::errors::is_unique_violation(&err));

        let mapped = ServiceError::from_write_error(err, || {
            ServiceError::InvalidOperation("Pickup already has an open timeline line".into())
        });
        assert_matches!(mapped, ServiceError::InvalidOperation(_));
        assert_eq!(mapped.status_code(), axum::http::StatusCode::BAD_REQUEST);

        // A closed line next to the open one is fine
        let mut closed = open_line_row(pickup.id, 2, &user);
        closed.status = Set(LineStatus::Closed);
        closed.insert(&*db.pool).await.unwrap();
    }

    #[tokio::test]
    async fn occurrence_on_unknown_pickup_is_rejected_before_the_line() {
        let db = test_db().await;
        let user = seed_user(&db.pool, "Ana", UserRole::Operator, "EXPEDICAO").await;
        let pickup = seed_pickup(&db.pool, PickupStatus::PickedUp).await;
        let service = TimelineService::new(db.pool.clone());
        let line = service.open_line(pickup.id, &user).await.unwrap();

        let err = service
            .add_occurrence(Uuid::new_v4(), line.id, note("Oi", Some("SAC")), &user)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(ref msg) if msg.starts_with("Pickup"));

        // Nothing on the real line changed
        let lines = service.list_lines(pickup.id).await.unwrap();
        assert!(lines[0].occurrences.is_empty());
    }

    #[tokio::test]
    async fn new_occurrence_answers_pending_ones() {
        let db = test_db().await;
        let ana = seed_user(&db.pool, "Ana", UserRole::Operator, "EXPEDICAO").await;
        let bruno = seed_user(&db.pool, "Bruno", UserRole::Manager, "SAC").await;
        let pickup = seed_pickup(&db.pool, PickupStatus::PickedUp).await;
        let service = TimelineService::new(db.pool.clone());
        let line = service.open_line(pickup.id, &ana).await.unwrap();

        let question = service
            .add_occurrence(pickup.id, line.id, note("Cliente ligou", Some("SAC")), &ana)
            .await
            .unwrap();
        assert_eq!(question.answered, 0);
        assert_eq!(question.occurrence.origin_department, "EXPEDICAO");

        let reply = service
            .add_occurrence(pickup.id, line.id, note("Já retornamos", Some("EXPEDICAO")), &bruno)
            .await
            .unwrap();
        assert_eq!(reply.answered, 1);

        let first = occurrence::Entity::find_by_id(question.occurrence.id)
            .one(&*db.pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, OccurrenceStatus::Answered);
        assert!(first.answered_at.is_some());
    }

    #[tokio::test]
    async fn product_return_requires_reason_and_returns_pickup() {
        let db = test_db().await;
        let ana = seed_user(&db.pool, "Ana", UserRole::Operator, "EXPEDICAO").await;
        let pickup = seed_pickup(&db.pool, PickupStatus::PickedUp).await;
        let service = TimelineService::new(db.pool.clone());
        let line = service.open_line(pickup.id, &ana).await.unwrap();

        let mut input = note("Voltou avariado", None);
        input.kind = OccurrenceKind::ProductReturn;
        assert_matches!(
            service
                .add_occurrence(pickup.id, line.id, input.clone(), &ana)
                .await,
            Err(ServiceError::ValidationError(_))
        );

        input.return_reason = Some(ReturnReason::Damaged);
        let outcome = service
            .add_occurrence(pickup.id, line.id, input, &ana)
            .await
            .unwrap();
        assert_eq!(outcome.pickup_status, PickupStatus::Returned);
        assert_eq!(outcome.occurrence.return_reason, Some(ReturnReason::Damaged));

        let order = order::Entity::find_by_id(pickup.order_id)
            .one(&*db.pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.internal_status, Some(PickupStatus::Returned));
    }

    #[tokio::test]
    async fn information_drops_stray_return_reason() {
        let db = test_db().await;
        let ana = seed_user(&db.pool, "Ana", UserRole::Operator, "EXPEDICAO").await;
        let pickup = seed_pickup(&db.pool, PickupStatus::AwaitingPickup).await;
        let service = TimelineService::new(db.pool.clone());
        let line = service.open_line(pickup.id, &ana).await.unwrap();

        let mut input = note("Só um aviso", None);
        input.return_reason = Some(ReturnReason::Lost);
        let outcome = service
            .add_occurrence(pickup.id, line.id, input, &ana)
            .await
            .unwrap();
        assert_eq!(outcome.occurrence.return_reason, None);
        assert_eq!(outcome.pickup_status, PickupStatus::AwaitingPickup);
    }

    #[tokio::test]
    async fn closed_line_rejects_occurrences_and_resolution_is_final() {
        let db = test_db().await;
        let ana = seed_user(&db.pool, "Ana", UserRole::Operator, "EXPEDICAO").await;
        let pickup = seed_pickup(&db.pool, PickupStatus::PickedUp).await;
        let service = TimelineService::new(db.pool.clone());
        let line = service.open_line(pickup.id, &ana).await.unwrap();

        let posted = service
            .add_occurrence(pickup.id, line.id, note("Conferir volume", None), &ana)
            .await
            .unwrap();
        service.close_line(pickup.id, line.id, &ana).await.unwrap();
        assert_matches!(
            service
                .add_occurrence(pickup.id, line.id, note("Tarde demais", None), &ana)
                .await,
            Err(ServiceError::InvalidOperation(_))
        );

        let resolved = service
            .resolve_occurrence(posted.occurrence.id, &ana)
            .await
            .unwrap();
        assert_eq!(resolved.status, OccurrenceStatus::Resolved);
        assert_eq!(resolved.resolved_by, Some(ana.user_id));
        assert_matches!(
            service.resolve_occurrence(posted.occurrence.id, &ana).await,
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            service.resolve_occurrence(Uuid::new_v4(), &ana).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
