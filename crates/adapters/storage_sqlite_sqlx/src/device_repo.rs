//! Row mapping and queries for the `devices` table.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteExecutor};

use homehub_domain::credentials::Credentials;
use homehub_domain::device::{Device, DeviceStatus};
use homehub_domain::id::DeviceId;
use homehub_domain::protocol::ProtocolTag;
use homehub_domain::time::Timestamp;

use crate::error::StorageError;

/// Wrapper for converting database rows into domain [`Device`].
struct Wrapper(Device);

fn decode<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|at| at.to_utc())
        .map_err(decode)
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let protocol: String = row.try_get("protocol")?;
        let status: String = row.try_get("status")?;
        let manufacturer: Option<String> = row.try_get("manufacturer")?;
        let model: Option<String> = row.try_get("model")?;
        let credentials: Option<String> = row.try_get("credentials")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        let last_seen: Option<String> = row.try_get("last_seen")?;

        let credentials = credentials
            .map(|json| serde_json::from_str::<Credentials>(&json))
            .transpose()
            .map_err(decode)?;

        Ok(Self(Device {
            id: DeviceId::from_str(&id).map_err(decode)?,
            name,
            protocol: ProtocolTag::new(protocol).map_err(decode)?,
            status: DeviceStatus::from_str(&status).map_err(decode)?,
            manufacturer,
            model,
            credentials,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            last_seen: last_seen.as_deref().map(parse_timestamp).transpose()?,
        }))
    }
}

const UPSERT: &str = "INSERT INTO devices \
    (id, name, protocol, status, manufacturer, model, credentials, created_at, updated_at, last_seen) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT (id) DO UPDATE SET \
    name = excluded.name, \
    protocol = excluded.protocol, \
    status = excluded.status, \
    manufacturer = excluded.manufacturer, \
    model = excluded.model, \
    credentials = excluded.credentials, \
    updated_at = excluded.updated_at, \
    last_seen = excluded.last_seen";
const SELECT_ALL: &str = "SELECT * FROM devices ORDER BY id";

/// Insert the device or overwrite the stored row. `created_at` is kept from
/// the first insert.
pub(crate) async fn upsert<'e, E>(executor: E, device: &Device) -> Result<(), StorageError>
where
    E: SqliteExecutor<'e>,
{
    let credentials = device
        .credentials
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(UPSERT)
        .bind(device.id.as_str())
        .bind(&device.name)
        .bind(device.protocol.as_str())
        .bind(device.status.as_str())
        .bind(&device.manufacturer)
        .bind(&device.model)
        .bind(credentials)
        .bind(device.created_at.to_rfc3339())
        .bind(device.updated_at.to_rfc3339())
        .bind(device.last_seen.map(|at| at.to_rfc3339()))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_all<'e, E>(executor: E) -> Result<Vec<Device>, StorageError>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL).fetch_all(executor).await?;
    Ok(rows.into_iter().map(|w| w.0).collect())
}
