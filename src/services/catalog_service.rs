use crate::entities::{
    ServiceKind, catering_addon_entity as catering_addons, catering_entity as caterings,
    event_entity as events, property_entity as properties, restaurant_entity as restaurants,
    service_entity as services,
};
use crate::error::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    None,
    /// FOR SHARE
    Shared,
    /// FOR UPDATE
    Exclusive,
}

pub(crate) fn with_lock<E: EntityTrait>(select: Select<E>, mode: LockMode) -> Select<E> {
    match mode {
        LockMode::None => select,
        LockMode::Shared => select.lock_shared(),
        LockMode::Exclusive => select.lock_exclusive(),
    }
}

/// 服务子表记录，与 `services.kind` 一一对应
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceDetail {
    Event(events::Model),
    Catering {
        catering: caterings::Model,
        addons: Vec<catering_addons::Model>,
    },
    Restaurant(restaurants::Model),
    Property(properties::Model),
}

impl ServiceDetail {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceDetail::Event(_) => ServiceKind::Event,
            ServiceDetail::Catering { .. } => ServiceKind::Catering,
            ServiceDetail::Restaurant(_) => ServiceKind::Restaurant,
            ServiceDetail::Property(_) => ServiceKind::Property,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceListing {
    pub service: services::Model,
    pub detail: ServiceDetail,
}

impl ServiceListing {
    pub fn kind(&self) -> ServiceKind {
        self.detail.kind()
    }

    pub fn catering(&self) -> Option<&caterings::Model> {
        match &self.detail {
            ServiceDetail::Catering { catering, .. } => Some(catering),
            _ => None,
        }
    }
}

/// 读取服务及其子表记录。
/// 加锁顺序固定为 services 行 -> 子表行（餐饮库存行）。
pub async fn load_listing<C: ConnectionTrait>(
    conn: &C,
    service_id: i64,
    lock: LockMode,
) -> AppResult<ServiceListing> {
    let service = with_lock(services::Entity::find_by_id(service_id), lock)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Service {service_id} not found")))?;

    let detail = load_detail(conn, &service, lock).await?;
    Ok(ServiceListing { service, detail })
}

async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    service: &services::Model,
    lock: LockMode,
) -> AppResult<ServiceDetail> {
    let missing = || {
        AppError::InternalError(format!(
            "Service {} ({}) has no detail record",
            service.id, service.kind
        ))
    };

    let detail = match service.kind {
        ServiceKind::Event => ServiceDetail::Event(
            events::Entity::find_by_id(service.id)
                .one(conn)
                .await?
                .ok_or_else(missing)?,
        ),
        ServiceKind::Catering => {
            let catering = with_lock(caterings::Entity::find_by_id(service.id), lock)
                .one(conn)
                .await?
                .ok_or_else(missing)?;
            let addons = catering_addons::Entity::find()
                .filter(catering_addons::Column::ServiceId.eq(service.id))
                .order_by_asc(catering_addons::Column::Id)
                .all(conn)
                .await?;
            ServiceDetail::Catering { catering, addons }
        }
        ServiceKind::Restaurant => ServiceDetail::Restaurant(
            restaurants::Entity::find_by_id(service.id)
                .one(conn)
                .await?
                .ok_or_else(missing)?,
        ),
        ServiceKind::Property => ServiceDetail::Property(
            properties::Entity::find_by_id(service.id)
                .one(conn)
                .await?
                .ok_or_else(missing)?,
        ),
    };
    Ok(detail)
}
