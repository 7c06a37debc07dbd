use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Query, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{
        occurrence, order, pickup, timeline_line, LineStatus, OccurrenceStatus, PickupStatus,
    },
    erp::{ErpError, ErpGateway, ErpOrder},
    errors::ServiceError,
};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Strips a CPF down to its digits. Partial documents (3 to 11 digits) are accepted.
pub fn normalize_cpf(raw: &str) -> Result<String, ServiceError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if !(3..=11).contains(&digits.len()) {
        return Err(ServiceError::ValidationError(
            "retriever_cpf must contain between 3 and 11 digits".to_string(),
        ));
    }
    Ok(digits)
}

/// What saving a tracking code does to the stored pair of codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingChange {
    /// Same code as the stored one
    Unchanged,
    /// Nothing was stored before
    Assigned,
    /// A different code was stored and moves to `previous_tracking_code`
    Replaced { previous: String },
}

pub fn tracking_change(current: Option<&str>, new_code: &str) -> TrackingChange {
    match current.map(str::trim).filter(|c| !c.is_empty()) {
        None => TrackingChange::Assigned,
        Some(current) if current == new_code => TrackingChange::Unchanged,
        Some(current) => TrackingChange::Replaced {
            previous: current.to_string(),
        },
    }
}

fn apply_tracking_code(
    active: &mut pickup::ActiveModel,
    current: Option<&str>,
    new_code: &str,
    now: DateTime<Utc>,
) -> TrackingChange {
    let change = tracking_change(current, new_code);
    match &change {
        TrackingChange::Unchanged => {}
        TrackingChange::Assigned => {
            active.tracking_code = Set(Some(new_code.to_string()));
            active.tracking_updated_at = Set(Some(now));
        }
        TrackingChange::Replaced { previous } => {
            active.previous_tracking_code = Set(Some(previous.clone()));
            active.tracking_code = Set(Some(new_code.to_string()));
            active.tracking_updated_at = Set(Some(now));
        }
    }
    change
}

#[derive(Debug, Clone)]
pub struct ConfirmPickupInput {
    pub order_number: String,
    pub retriever_name: String,
    pub retriever_cpf: String,
    pub carrier: Option<String>,
    pub tracking_code: Option<String>,
    pub photo_url: Option<String>,
    /// Overrides the items captured from the ERP order.
    pub items: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct SaveTrackingInput {
    pub order_number: String,
    pub tracking_code: String,
    pub carrier: Option<String>,
}

/// Result of pushing a pickup's "shipped" state to the ERP.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ErpSyncOutcome {
    pub synced: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PickupOutcome {
    pub order: order::Model,
    pub pickup: pickup::Model,
    pub erp_sync: ErpSyncOutcome,
}

#[derive(Debug, Clone)]
pub struct TrackingOutcome {
    pub order: order::Model,
    pub pickup: pickup::Model,
    /// True when a new pickup row had to be opened for the code.
    pub created: bool,
    pub change: TrackingChange,
}

#[derive(Debug, Clone, Default)]
pub struct PickupListQuery {
    pub status: Option<PickupStatus>,
    /// Substring match on the order number
    pub order_number: Option<String>,
    /// Only pickups with at least one pending occurrence
    pub pending_only: bool,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct PickupSummary {
    pub pickup: pickup::Model,
    pub order_number: Option<String>,
    pub open_occurrences: u64,
    pub last_occurrence_status: Option<OccurrenceStatus>,
    pub has_open_line: bool,
}

#[derive(Debug, Clone)]
pub struct PickupPage {
    pub items: Vec<PickupSummary>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct LineWithOccurrences {
    pub line: timeline_line::Model,
    pub occurrences: Vec<occurrence::Model>,
}

#[derive(Debug, Clone)]
pub struct PickupDetail {
    pub pickup: pickup::Model,
    pub order: Option<order::Model>,
    pub lines: Vec<LineWithOccurrences>,
}

/// Pickup lifecycle: confirmation at the counter, tracking codes and ERP sync.
#[derive(Clone)]
pub struct PickupService {
    db_pool: Arc<DbPool>,
    erp: Arc<dyn ErpGateway>,
}

impl PickupService {
    pub fn new(db_pool: Arc<DbPool>, erp: Arc<dyn ErpGateway>) -> Self {
        Self { db_pool, erp }
    }

    /// Records that the goods of an order left the warehouse.
    ///
    /// The pickup row is written and committed first; the ERP "shipped" update
    /// runs afterwards and its failure only marks the pickup for a later retry.
    #[instrument(skip(self, input, actor), fields(order_number = %input.order_number, operator = %actor.user_id))]
    pub async fn confirm_pickup(
        &self,
        input: ConfirmPickupInput,
        actor: &AuthUser,
    ) -> Result<PickupOutcome, ServiceError> {
        let order_number = required(&input.order_number, "order_number")?;
        let retriever_name = required(&input.retriever_name, "retriever_name")?;
        let cpf = normalize_cpf(&input.retriever_cpf)?;

        let (order, erp_order) = self.resolve_order(&order_number).await?;
        let items = match input.items {
            Some(items) => Some(items),
            None => erp_order
                .map(|o| serde_json::to_value(o.items))
                .transpose()
                .map_err(|e| ServiceError::InternalError(e.to_string()))?,
        };

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let now = Utc::now();

        let latest = latest_pickup(&txn, order.id).await?;
        let pickup = match latest {
            Some(current) if current.status == PickupStatus::PickedUp => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Order {} was already picked up (pickup #{})",
                    order_number, current.pickup_number
                )));
            }
            Some(current) if current.status == PickupStatus::AwaitingPickup => {
                let stored_code = current.tracking_code.clone();
                let mut active: pickup::ActiveModel = current.into();
                active.status = Set(PickupStatus::PickedUp);
                active.retriever_name = Set(Some(retriever_name));
                active.retriever_cpf = Set(Some(cpf));
                active.operator_id = Set(Some(actor.user_id));
                active.operator_name = Set(Some(actor.name.clone()));
                if let Some(carrier) = non_empty(input.carrier) {
                    active.carrier = Set(Some(carrier));
                }
                if let Some(code) = non_empty(input.tracking_code) {
                    apply_tracking_code(&mut active, stored_code.as_deref(), &code, now);
                }
                if input.photo_url.is_some() {
                    active.photo_url = Set(input.photo_url);
                }
                if items.is_some() {
                    active.items = Set(items);
                }
                active.updated_at = Set(now);
                active.update(&txn).await.map_err(ServiceError::db_error)?
            }
            previous => {
                let tracking_code = non_empty(input.tracking_code);
                pickup::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order.id),
                    pickup_number: Set(next_pickup_number(previous.as_ref())),
                    retriever_name: Set(Some(retriever_name)),
                    retriever_cpf: Set(Some(cpf)),
                    operator_id: Set(Some(actor.user_id)),
                    operator_name: Set(Some(actor.name.clone())),
                    carrier: Set(non_empty(input.carrier)),
                    tracking_updated_at: Set(tracking_code.as_ref().map(|_| now)),
                    tracking_code: Set(tracking_code),
                    previous_tracking_code: Set(None),
                    status: Set(PickupStatus::PickedUp),
                    photo_url: Set(input.photo_url),
                    items: Set(items),
                    erp_synced_at: Set(None),
                    erp_error: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(|e| {
                    ServiceError::from_write_error(e, || {
                        ServiceError::Conflict(format!(
                            "Order {} is being picked up concurrently",
                            order_number
                        ))
                    })
                })?
            }
        };

        set_order_status(&txn, order.id, Some(PickupStatus::PickedUp), now).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("warehouse_pickups.confirmed", 1);
        info!(pickup_id = %pickup.id, pickup_number = pickup.pickup_number, "pickup confirmed");

        let (pickup, erp_sync) = self.push_shipped(pickup, order.erp_order_id.as_deref()).await?;
        let order = self.find_order(order.id).await?;
        Ok(PickupOutcome {
            order,
            pickup,
            erp_sync,
        })
    }

    /// Retries the ERP "shipped" update for a pickup whose earlier attempt failed.
    #[instrument(skip(self))]
    pub async fn retry_erp_sync(&self, pickup_id: Uuid) -> Result<PickupOutcome, ServiceError> {
        let pickup = self.find_pickup(pickup_id).await?;
        if pickup.status != PickupStatus::PickedUp {
            return Err(ServiceError::InvalidOperation(format!(
                "Only picked up pickups are synced to the ERP (status is {})",
                pickup.status
            )));
        }
        let order = self.find_order(pickup.order_id).await?;

        if pickup.erp_synced_at.is_some() {
            return Ok(PickupOutcome {
                order,
                pickup,
                erp_sync: ErpSyncOutcome {
                    synced: true,
                    error: None,
                },
            });
        }

        let (pickup, erp_sync) = self.push_shipped(pickup, order.erp_order_id.as_deref()).await?;
        Ok(PickupOutcome {
            order,
            pickup,
            erp_sync,
        })
    }

    /// Saves a tracking code for an order before (or after) the goods leave.
    #[instrument(skip(self, input, actor), fields(order_number = %input.order_number))]
    pub async fn save_tracking(
        &self,
        input: SaveTrackingInput,
        actor: &AuthUser,
    ) -> Result<TrackingOutcome, ServiceError> {
        let order_number = required(&input.order_number, "order_number")?;
        let code = required(&input.tracking_code, "tracking_code")?;
        let (order, _) = self.resolve_order(&order_number).await?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let now = Utc::now();

        let latest = latest_pickup(&txn, order.id).await?;
        let (pickup, created, change) = match latest {
            Some(current) if !current.status.is_terminal() => {
                let stored_code = current.tracking_code.clone();
                let mut active: pickup::ActiveModel = current.into();
                let change = apply_tracking_code(&mut active, stored_code.as_deref(), &code, now);
                if let Some(carrier) = non_empty(input.carrier) {
                    active.carrier = Set(Some(carrier));
                }
                active.updated_at = Set(now);
                let saved = active.update(&txn).await.map_err(ServiceError::db_error)?;
                (saved, false, change)
            }
            previous => {
                let inserted = pickup::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order.id),
                    pickup_number: Set(next_pickup_number(previous.as_ref())),
                    retriever_name: Set(None),
                    retriever_cpf: Set(None),
                    operator_id: Set(Some(actor.user_id)),
                    operator_name: Set(Some(actor.name.clone())),
                    carrier: Set(non_empty(input.carrier)),
                    tracking_code: Set(Some(code.clone())),
                    previous_tracking_code: Set(None),
                    tracking_updated_at: Set(Some(now)),
                    status: Set(PickupStatus::AwaitingPickup),
                    photo_url: Set(None),
                    items: Set(None),
                    erp_synced_at: Set(None),
                    erp_error: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(|e| {
                    ServiceError::from_write_error(e, || {
                        ServiceError::Conflict(format!(
                            "Order {} is being updated concurrently",
                            order_number
                        ))
                    })
                })?;
                (inserted, true, TrackingChange::Assigned)
            }
        };

        set_order_status(&txn, order.id, Some(pickup.status), now).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(pickup_id = %pickup.id, created, ?change, "tracking code saved");
        let order = self.find_order(order.id).await?;
        Ok(TrackingOutcome {
            order,
            pickup,
            created,
            change,
        })
    }

    /// Replaces the tracking code of a known pickup.
    #[instrument(skip(self))]
    pub async fn update_tracking(
        &self,
        pickup_id: Uuid,
        tracking_code: &str,
        carrier: Option<String>,
    ) -> Result<(pickup::Model, TrackingChange), ServiceError> {
        let code = required(tracking_code, "tracking_code")?;
        let current = self.find_pickup(pickup_id).await?;
        let now = Utc::now();

        let stored_code = current.tracking_code.clone();
        let mut active: pickup::ActiveModel = current.into();
        let change = apply_tracking_code(&mut active, stored_code.as_deref(), &code, now);
        if let Some(carrier) = non_empty(carrier) {
            active.carrier = Set(Some(carrier));
        }
        if !active.is_changed() {
            let unchanged = self.find_pickup(pickup_id).await?;
            return Ok((unchanged, change));
        }
        active.updated_at = Set(now);
        let saved = active
            .update(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((saved, change))
    }

    /// Paginated dashboard listing with per-pickup occurrence aggregates.
    #[instrument(skip(self))]
    pub async fn list_pickups(&self, query: PickupListQuery) -> Result<PickupPage, ServiceError> {
        let db = &*self.db_pool;
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        let page = query.page.max(1);

        let mut select = pickup::Entity::find().find_also_related(order::Entity);
        if let Some(status) = query.status {
            select = select.filter(pickup::Column::Status.eq(status));
        }
        if let Some(number) = query.order_number.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            select = select.filter(order::Column::OrderNumber.contains(number));
        }
        if query.pending_only {
            select = select.filter(
                pickup::Column::Id.in_subquery(
                    Query::select()
                        .column(occurrence::Column::PickupId)
                        .from(occurrence::Entity)
                        .and_where(occurrence::Column::Status.eq(OccurrenceStatus::Pending))
                        .to_owned(),
                ),
            );
        }

        let paginator = select
            .order_by_desc(pickup::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|(p, _)| p.id).collect();
        let occurrences = if ids.is_empty() {
            Vec::new()
        } else {
            occurrence::Entity::find()
                .filter(occurrence::Column::PickupId.is_in(ids.clone()))
                .order_by_asc(occurrence::Column::CreatedAt)
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
        };
        let open_lines = if ids.is_empty() {
            Vec::new()
        } else {
            timeline_line::Entity::find()
                .filter(timeline_line::Column::PickupId.is_in(ids))
                .filter(timeline_line::Column::Status.eq(LineStatus::Open))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
        };

        let mut pending: HashMap<Uuid, u64> = HashMap::new();
        let mut last_status: HashMap<Uuid, OccurrenceStatus> = HashMap::new();
        for occ in &occurrences {
            if occ.status == OccurrenceStatus::Pending {
                *pending.entry(occ.pickup_id).or_default() += 1;
            }
            // ascending order: the last write wins
            last_status.insert(occ.pickup_id, occ.status);
        }

        let items = rows
            .into_iter()
            .map(|(pickup, order)| PickupSummary {
                open_occurrences: pending.get(&pickup.id).copied().unwrap_or(0),
                last_occurrence_status: last_status.get(&pickup.id).copied(),
                has_open_line: open_lines.iter().any(|l| l.pickup_id == pickup.id),
                order_number: order.map(|o| o.order_number),
                pickup,
            })
            .collect();

        Ok(PickupPage {
            items,
            total,
            page,
            limit,
        })
    }

    /// A pickup with its order and full timeline.
    #[instrument(skip(self))]
    pub async fn get_pickup(&self, pickup_id: Uuid) -> Result<PickupDetail, ServiceError> {
        let db = &*self.db_pool;
        let pickup = self.find_pickup(pickup_id).await?;
        let order = order::Entity::find_by_id(pickup.order_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        let lines = timeline_line::Entity::find()
            .filter(timeline_line::Column::PickupId.eq(pickup_id))
            .order_by_asc(timeline_line::Column::Sequence)
            .find_with_related(occurrence::Entity)
            .order_by_asc(occurrence::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|(line, occurrences)| LineWithOccurrences { line, occurrences })
            .collect();

        Ok(PickupDetail {
            pickup,
            order,
            lines,
        })
    }

    /// Removes a pickup with its timeline. The order keeps the status of its
    /// latest remaining pickup.
    #[instrument(skip(self, actor), fields(admin = %actor.user_id))]
    pub async fn delete_pickup(&self, pickup_id: Uuid, actor: &AuthUser) -> Result<(), ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only administrators can delete pickups".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let pickup = pickup::Entity::find_by_id(pickup_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Pickup {} not found", pickup_id)))?;

        occurrence::Entity::delete_many()
            .filter(occurrence::Column::PickupId.eq(pickup_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        timeline_line::Entity::delete_many()
            .filter(timeline_line::Column::PickupId.eq(pickup_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        pickup::Entity::delete_by_id(pickup_id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let remaining = latest_pickup(&txn, pickup.order_id).await?;
        set_order_status(&txn, pickup.order_id, remaining.map(|p| p.status), Utc::now()).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        warn!(pickup_id = %pickup_id, pickup_number = pickup.pickup_number, "pickup deleted");
        Ok(())
    }

    async fn resolve_order(
        &self,
        order_number: &str,
    ) -> Result<(order::Model, Option<ErpOrder>), ServiceError> {
        let db = &*self.db_pool;
        if let Some(existing) = find_order_by_number(db, order_number).await? {
            return Ok((existing, None));
        }

        let erp_order = self
            .erp
            .find_order_by_number(order_number)
            .await
            .map_err(|e| {
                warn!(order_number, error = %e, "ERP order lookup failed");
                ServiceError::Erp(e)
            })?;

        let now = Utc::now();
        let inserted = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.to_string()),
            erp_order_id: Set(Some(erp_order.id.clone())),
            erp_status: Set(erp_order.status.clone()),
            internal_status: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await;

        match inserted {
            Ok(model) => Ok((model, Some(erp_order))),
            // Another request registered the order first.
            Err(err) if crate::errors::is_unique_violation(&err) => {
                let existing = find_order_by_number(db, order_number)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;
                Ok((existing, Some(erp_order)))
            }
            Err(err) => Err(ServiceError::db_error(err)),
        }
    }

    async fn push_shipped(
        &self,
        pickup: pickup::Model,
        erp_order_id: Option<&str>,
    ) -> Result<(pickup::Model, ErpSyncOutcome), ServiceError> {
        let result = match erp_order_id {
            Some(id) => self.erp.mark_order_shipped(id).await,
            None => Err(ErpError::NotFound("order has no ERP reference".to_string())),
        };

        let now = Utc::now();
        let mut active: pickup::ActiveModel = pickup.into();
        let outcome = match result {
            Ok(()) => {
                counter!("warehouse_erp.sync", 1, "result" => "ok");
                active.erp_synced_at = Set(Some(now));
                active.erp_error = Set(None);
                ErpSyncOutcome {
                    synced: true,
                    error: None,
                }
            }
            Err(err) => {
                counter!("warehouse_erp.sync", 1, "result" => "failed");
                warn!(error = %err, "ERP shipped update failed; pickup kept for retry");
                active.erp_error = Set(Some(err.to_string()));
                ErpSyncOutcome {
                    synced: false,
                    error: Some(err.to_string()),
                }
            }
        };
        active.updated_at = Set(now);
        let saved = active
            .update(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((saved, outcome))
    }

    async fn find_pickup(&self, pickup_id: Uuid) -> Result<pickup::Model, ServiceError> {
        pickup::Entity::find_by_id(pickup_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Pickup {} not found", pickup_id)))
    }

    async fn find_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}

async fn find_order_by_number<C: ConnectionTrait>(
    db: &C,
    order_number: &str,
) -> Result<Option<order::Model>, ServiceError> {
    order::Entity::find()
        .filter(order::Column::OrderNumber.eq(order_number))
        .one(db)
        .await
        .map_err(ServiceError::db_error)
}

/// Latest pickup of an order, row-locked for the rest of the transaction.
async fn latest_pickup<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
) -> Result<Option<pickup::Model>, ServiceError> {
    pickup::Entity::find()
        .filter(pickup::Column::OrderId.eq(order_id))
        .order_by_desc(pickup::Column::PickupNumber)
        .lock_exclusive()
        .one(db)
        .await
        .map_err(ServiceError::db_error)
}

fn next_pickup_number(previous: Option<&pickup::Model>) -> i32 {
    previous.map_or(1, |p| p.pickup_number + 1)
}

pub(crate) async fn set_order_status<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
    status: Option<PickupStatus>,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    order::Entity::update_many()
        .set(order::ActiveModel {
            internal_status: Set(status),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(order::Column::Id.eq(order_id))
        .exec(db)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

fn required(value: &str, field: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
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
        entities::UserRole,
        erp::{ErpOrderItem, MockErpGateway},
        services::test_support::{seed_user, test_db},
    };
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn erp_order(number: &str) -> ErpOrder {
        ErpOrder {
            id: format!("erp-{}", number),
            number: number.to_string(),
            status: Some("Aprovada".into()),
            customer_name: Some("Cliente".into()),
            items: vec![ErpOrderItem {
                sku: Some("CAN-01".into()),
                description: "Caneca".into(),
                quantity: 2.0,
            }],
        }
    }

    fn confirm_input(number: &str) -> ConfirmPickupInput {
        ConfirmPickupInput {
            order_number: number.to_string(),
            retriever_name: "João Motorista".into(),
            retriever_cpf: "123.456.789-01".into(),
            carrier: Some("Jadlog".into()),
            tracking_code: None,
            photo_url: None,
            items: None,
        }
    }

    #[test]
    fn cpf_is_reduced_to_digits() {
        assert_eq!(normalize_cpf("123.456.789-01").unwrap(), "12345678901");
        assert_eq!(normalize_cpf(" 4 5 6 ").unwrap(), "456");
        assert_matches!(normalize_cpf("12"), Err(ServiceError::ValidationError(_)));
        assert_matches!(normalize_cpf("123456789012"), Err(ServiceError::ValidationError(_)));
    }

    proptest! {
        #[test]
        fn normalized_cpf_is_digits_only(raw in "[0-9.\\- ]{0,20}") {
            if let Ok(cpf) = normalize_cpf(&raw) {
                prop_assert!(cpf.chars().all(|c| c.is_ascii_digit()));
                prop_assert!((3..=11).contains(&cpf.len()));
            }
        }
    }

    #[test]
    fn tracking_overwrite_keeps_one_previous_code() {
        assert_eq!(tracking_change(None, "BR1"), TrackingChange::Assigned);
        assert_eq!(tracking_change(Some("  "), "BR1"), TrackingChange::Assigned);
        assert_eq!(tracking_change(Some("BR1"), "BR1"), TrackingChange::Unchanged);
        assert_eq!(
            tracking_change(Some("BR1"), "BR2"),
            TrackingChange::Replaced {
                previous: "BR1".into()
            }
        );
    }

    #[tokio::test]
    async fn confirm_creates_order_and_marks_erp_shipped() {
        let db = test_db().await;
        let operator = seed_user(&db.pool, "Operador", UserRole::Operator, "EXPEDICAO").await;

        let mut erp = MockErpGateway::new();
        erp.expect_find_order_by_number()
            .times(1)
            .returning(|n| Ok(erp_order(n)));
        erp.expect_mark_order_shipped()
            .withf(|id| id == "erp-1001")
            .times(1)
            .returning(|_| Ok(()));

        let service = PickupService::new(db.pool.clone(), Arc::new(erp));
        let outcome = service
            .confirm_pickup(confirm_input("1001"), &operator)
            .await
            .unwrap();

        assert_eq!(outcome.pickup.pickup_number, 1);
        assert_eq!(outcome.pickup.status, PickupStatus::PickedUp);
        assert_eq!(outcome.pickup.retriever_cpf.as_deref(), Some("12345678901"));
        assert!(outcome.pickup.items.is_some());
        assert!(outcome.erp_sync.synced);
        assert!(outcome.pickup.erp_synced_at.is_some());
        assert_eq!(outcome.order.internal_status, Some(PickupStatus::PickedUp));
    }

    #[tokio::test]
    async fn erp_failure_after_commit_keeps_pickup() {
        let db = test_db().await;
        let operator = seed_user(&db.pool, "Operador", UserRole::Operator, "EXPEDICAO").await;

        let mut erp = MockErpGateway::new();
        erp.expect_find_order_by_number()
            .returning(|n| Ok(erp_order(n)));
        let mut calls = 0;
        erp.expect_mark_order_shipped().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(ErpError::Transport("connection reset".into()))
            } else {
                Ok(())
            }
        });

        let service = PickupService::new(db.pool.clone(), Arc::new(erp));
        let outcome = service
            .confirm_pickup(confirm_input("2002"), &operator)
            .await
            .unwrap();
        assert!(!outcome.erp_sync.synced);
        assert!(outcome.pickup.erp_error.is_some());

        let retried = service.retry_erp_sync(outcome.pickup.id).await.unwrap();
        assert!(retried.erp_sync.synced);
        assert!(retried.pickup.erp_error.is_none());
    }

    #[tokio::test]
    async fn unknown_order_writes_nothing() {
        let db = test_db().await;
        let operator = seed_user(&db.pool, "Operador", UserRole::Operator, "EXPEDICAO").await;

        let mut erp = MockErpGateway::new();
        erp.expect_find_order_by_number()
            .returning(|n| Err(ErpError::NotFound(format!("order {}", n))));

        let service = PickupService::new(db.pool.clone(), Arc::new(erp));
        let err = service
            .confirm_pickup(confirm_input("404"), &operator)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(order::Entity::find().count(&*db.pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_confirmation_is_rejected() {
        let db = test_db().await;
        let operator = seed_user(&db.pool, "Operador", UserRole::Operator, "EXPEDICAO").await;

        let mut erp = MockErpGateway::new();
        erp.expect_find_order_by_number()
            .times(1)
            .returning(|n| Ok(erp_order(n)));
        erp.expect_mark_order_shipped().returning(|_| Ok(()));

        let service = PickupService::new(db.pool.clone(), Arc::new(erp));
        service
            .confirm_pickup(confirm_input("3003"), &operator)
            .await
            .unwrap();
        let err = service
            .confirm_pickup(confirm_input("3003"), &operator)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidOperation(_));
    }

    #[tokio::test]
    async fn tracking_then_confirm_promotes_the_awaiting_row() {
        let db = test_db().await;
        let operator = seed_user(&db.pool, "Operador", UserRole::Operator, "EXPEDICAO").await;

        let mut erp = MockErpGateway::new();
        erp.expect_find_order_by_number()
            .times(1)
            .returning(|n| Ok(erp_order(n)));
        erp.expect_mark_order_shipped().returning(|_| Ok(()));
        let service = PickupService::new(db.pool.clone(), Arc::new(erp));

        let saved = service
            .save_tracking(
                SaveTrackingInput {
                    order_number: "4004".into(),
                    tracking_code: "BR100".into(),
                    carrier: Some("Correios".into()),
                },
                &operator,
            )
            .await
            .unwrap();
        assert!(saved.created);
        assert_eq!(saved.pickup.status, PickupStatus::AwaitingPickup);
        assert_eq!(saved.order.internal_status, Some(PickupStatus::AwaitingPickup));

        let again = service
            .save_tracking(
                SaveTrackingInput {
                    order_number: "4004".into(),
                    tracking_code: "BR200".into(),
                    carrier: None,
                },
                &operator,
            )
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.pickup.previous_tracking_code.as_deref(), Some("BR100"));
        assert_eq!(again.pickup.tracking_code.as_deref(), Some("BR200"));

        let confirmed = service
            .confirm_pickup(confirm_input("4004"), &operator)
            .await
            .unwrap();
        assert_eq!(confirmed.pickup.id, saved.pickup.id);
        assert_eq!(confirmed.pickup.status, PickupStatus::PickedUp);
        assert_eq!(confirmed.pickup.carrier.as_deref(), Some("Jadlog"));
    }

    #[tokio::test]
    async fn only_admins_delete() {
        let db = test_db().await;
        let operator = seed_user(&db.pool, "Operador", UserRole::Operator, "EXPEDICAO").await;
        let service = PickupService::new(db.pool.clone(), Arc::new(MockErpGateway::new()));

        let err = service
            .delete_pickup(Uuid::new_v4(), &operator)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Forbidden(_));
    }
}
