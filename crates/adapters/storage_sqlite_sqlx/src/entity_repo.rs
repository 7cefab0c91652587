//! Row mapping and queries for the `entities` table.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteExecutor};

use homehub_domain::entity::{Capability, Entity, EntityValue};
use homehub_domain::id::DeviceId;

use crate::device_repo::parse_timestamp;
use crate::error::StorageError;

/// Wrapper for converting database rows into domain types without polluting
/// domain structs with database concerns.
struct Wrapper(Entity);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let device_id: String = row.try_get("device_id")?;
        let key: String = row.try_get("key")?;
        let name: String = row.try_get("name")?;
        let capability: String = row.try_get("capability")?;
        let value: Option<String> = row.try_get("value")?;
        let updated_at: String = row.try_get("updated_at")?;

        let device_id =
            DeviceId::from_str(&device_id).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let capability: Capability = serde_json::from_str(&capability)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        let mut builder = Entity::builder()
            .device_id(device_id)
            .key(key)
            .name(name)
            .capability(capability)
            .updated_at(parse_timestamp(&updated_at)?);
        if let Some(value) = value {
            let value: EntityValue = serde_json::from_str(&value)
                .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
            builder = builder.value(value);
        }

        builder
            .build()
            .map(Self)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))
    }
}

const UPSERT: &str = "INSERT INTO entities (device_id, key, name, capability, value, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?) \
    ON CONFLICT (device_id, key) DO UPDATE SET \
    name = excluded.name, \
    capability = excluded.capability, \
    value = excluded.value, \
    updated_at = excluded.updated_at";
const SELECT_ALL: &str = "SELECT * FROM entities ORDER BY device_id, key";

pub(crate) async fn upsert<'e, E>(executor: E, entity: &Entity) -> Result<(), StorageError>
where
    E: SqliteExecutor<'e>,
{
    let capability = serde_json::to_string(entity.capability())?;
    let value = entity.value.as_ref().map(serde_json::to_string).transpose()?;

    sqlx::query(UPSERT)
        .bind(entity.device_id.as_str())
        .bind(&entity.key)
        .bind(&entity.name)
        .bind(capability)
        .bind(value)
        .bind(entity.updated_at.to_rfc3339())
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_all<'e, E>(executor: E) -> Result<Vec<Entity>, StorageError>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL).fetch_all(executor).await?;
    Ok(rows.into_iter().map(|w| w.0).collect())
}

#[cfg(test)]
mod tests {
    use homehub_app::ports::StorageConfig;
    use homehub_domain::device::DeviceUpdate;
    use homehub_domain::protocol::ProtocolTag;

    use super::*;
    use crate::device_repo;
    use crate::pool::Database;

    async fn setup() -> Database {
        let db = Database::open(&StorageConfig::in_memory()).await.unwrap();
        let device = DeviceUpdate::new(
            DeviceId::new("bulb-1").unwrap(),
            ProtocolTag::new("matter").unwrap(),
        )
        .into_device(homehub_domain::time::now())
        .unwrap();
        device_repo::upsert(db.pool(), &device).await.unwrap();
        db
    }

    fn entity(key: &str, capability: Capability, value: Option<EntityValue>) -> Entity {
        let mut builder = Entity::builder()
            .device_id(DeviceId::new("bulb-1").unwrap())
            .key(key)
            .capability(capability);
        if let Some(value) = value {
            builder = builder.value(value);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn should_keep_capability_bounds_and_value() {
        let db = setup().await;
        let brightness = entity(
            "brightness",
            Capability::brightness_percent(),
            Some(EntityValue::Number(42.0)),
        );
        let power = entity(
            "power",
            Capability::numeric_bounded(Some("W"), 0.0, 3600.0, 0.5).unwrap(),
            None,
        );
        upsert(db.pool(), &brightness).await.unwrap();
        upsert(db.pool(), &power).await.unwrap();

        let loaded = find_all(db.pool()).await.unwrap();

        assert_eq!(loaded, vec![brightness, power]);
    }

    #[tokio::test]
    async fn should_replace_value_on_second_upsert() {
        let db = setup().await;
        upsert(
            db.pool(),
            &entity("on", Capability::OnOff, Some(EntityValue::Bool(false))),
        )
        .await
        .unwrap();
        upsert(
            db.pool(),
            &entity("on", Capability::OnOff, Some(EntityValue::Bool(true))),
        )
        .await
        .unwrap();

        let loaded = find_all(db.pool()).await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].value, Some(EntityValue::Bool(true)));
    }

    #[tokio::test]
    async fn should_reject_entity_of_unknown_device() {
        let db = setup().await;
        let orphan = Entity::builder()
            .device_id(DeviceId::new("ghost").unwrap())
            .key("on")
            .capability(Capability::OnOff)
            .build()
            .unwrap();

        let result = upsert(db.pool(), &orphan).await;

        assert!(matches!(result, Err(StorageError::Database(_))));
    }
}
