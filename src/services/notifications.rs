use std::{collections::HashMap, sync::Arc};

use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{occurrence, order, pickup, OccurrenceStatus},
    errors::ServiceError,
};

pub const DEFAULT_NOTIFICATION_LIMIT: u64 = 50;
pub const MAX_NOTIFICATION_LIMIT: u64 = 200;

#[derive(Debug, Clone)]
pub struct Notification {
    pub occurrence: occurrence::Model,
    pub order_number: Option<String>,
    pub pickup_number: Option<i32>,
}

/// Answers "what is waiting for me": pending occurrences routed to a user.
#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DbPool>,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Pending occurrences addressed to the user, newest first.
    #[instrument(skip(self, user), fields(user = %user.user_id))]
    pub async fn pending_for(
        &self,
        user: &AuthUser,
        limit: u64,
    ) -> Result<Vec<Notification>, ServiceError> {
        let db = &*self.db_pool;
        let occurrences = occurrence::Entity::find()
            .filter(routing_condition(user))
            .order_by_desc(occurrence::Column::CreatedAt)
            .limit(limit.clamp(1, MAX_NOTIFICATION_LIMIT))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let pickup_ids: Vec<Uuid> = occurrences.iter().map(|o| o.pickup_id).collect();
        let pickups: HashMap<Uuid, (pickup::Model, Option<order::Model>)> = if pickup_ids.is_empty() {
            HashMap::new()
        } else {
            pickup::Entity::find()
                .filter(pickup::Column::Id.is_in(pickup_ids))
                .find_also_related(order::Entity)
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|(p, o)| (p.id, (p, o)))
                .collect()
        };

        Ok(occurrences
            .into_iter()
            .map(|occurrence| {
                let parent = pickups.get(&occurrence.pickup_id);
                Notification {
                    order_number: parent
                        .and_then(|(_, o)| o.as_ref())
                        .map(|o| o.order_number.clone()),
                    pickup_number: parent.map(|(p, _)| p.pickup_number),
                    occurrence,
                }
            })
            .collect())
    }

    #[instrument(skip(self, user), fields(user = %user.user_id))]
    pub async fn count_for(&self, user: &AuthUser) -> Result<u64, ServiceError> {
        occurrence::Entity::find()
            .filter(routing_condition(user))
            .count(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// An occurrence notifies a user while it is pending, was sent by someone
/// else, and names the user directly or by department. Older records carry
/// the user's name in the department column, so that matches too.
pub fn routing_condition(user: &AuthUser) -> Condition {
    Condition::all()
        .add(occurrence::Column::Status.eq(OccurrenceStatus::Pending))
        .add(occurrence::Column::SenderId.ne(user.user_id))
        .add(
            Condition::any()
                .add(occurrence::Column::RecipientId.eq(user.user_id))
                .add(occurrence::Column::DestinationDepartment.eq(user.department.clone()))
                .add(occurrence::Column::DestinationDepartment.eq(user.name.clone())),
        )
}
