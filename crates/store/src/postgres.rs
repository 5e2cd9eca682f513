use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, SkuId, Version};
use domain::{Aggregate, InventoryLevel, InventoryReservation, LedgerEntry, Order};
use serde::de::DeserializeOwned;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventEnvelope, Result,
    store::{CommittedVersions, EventSink, InventoryStore, OrderStore, conflict},
};

/// PostgreSQL-backed store.
///
/// Each record is a JSONB document next to a `version` column; the columns
/// the queries filter on are duplicated out of the document.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record<A: Aggregate + DeserializeOwned>(row: PgRow) -> Result<A> {
        let document: serde_json::Value = row.try_get("document")?;
        let mut record: A = serde_json::from_value(document)?;
        record.set_version(Version::new(row.try_get("version")?));
        Ok(record)
    }

    fn rows_to_records<A: Aggregate + DeserializeOwned>(rows: Vec<PgRow>) -> Result<Vec<A>> {
        rows.into_iter().map(Self::row_to_record).collect()
    }

    /// Serializes a record as it will be stored at `version`.
    fn document<A: Aggregate>(record: &A, version: Version) -> Result<serde_json::Value> {
        let mut stored = record.clone();
        stored.set_version(version);
        Ok(serde_json::to_value(&stored)?)
    }

    async fn stored_version_by_text(
        conn: &mut PgConnection,
        sql: &'static str,
        key: &str,
    ) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(sql)
            .bind(key)
            .fetch_optional(conn)
            .await?;
        Ok(version.map(Version::new).unwrap_or(Version::initial()))
    }

    async fn stored_version_by_uuid(
        conn: &mut PgConnection,
        sql: &'static str,
        key: Uuid,
    ) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(sql)
            .bind(key)
            .fetch_optional(conn)
            .await?;
        Ok(version.map(Version::new).unwrap_or(Version::initial()))
    }

    /// Writes a level. A new level is inserted; an existing one is updated
    /// only if its stored version still matches.
    async fn write_level(conn: &mut PgConnection, level: &InventoryLevel) -> Result<Version> {
        let expected = level.version();
        let version = expected.next();
        let document = Self::document(level, version)?;

        let result = if expected == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO inventory_levels (sku_id, version, document, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (sku_id) DO NOTHING
                "#,
            )
            .bind(level.sku_id().as_str())
            .bind(version.as_i64())
            .bind(document)
            .bind(level.updated_at())
            .execute(&mut *conn)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE inventory_levels
                SET version = $2, document = $3, updated_at = $4
                WHERE sku_id = $1 AND version = $5
                "#,
            )
            .bind(level.sku_id().as_str())
            .bind(version.as_i64())
            .bind(document)
            .bind(level.updated_at())
            .bind(expected.as_i64())
            .execute(&mut *conn)
            .await?
        };

        if result.rows_affected() == 0 {
            let actual = Self::stored_version_by_text(
                conn,
                "SELECT version FROM inventory_levels WHERE sku_id = $1",
                level.sku_id().as_str(),
            )
            .await?;
            return Err(conflict(level, actual));
        }
        Ok(version)
    }

    async fn write_reservation(
        conn: &mut PgConnection,
        reservation: &InventoryReservation,
    ) -> Result<Version> {
        let expected = reservation.version();
        let version = expected.next();
        let document = Self::document(reservation, version)?;

        let result = if expected == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO inventory_reservations
                    (id, sku_id, order_id, status, expires_at, reserved_at, version, document)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(reservation.id().as_uuid())
            .bind(reservation.sku_id().as_str())
            .bind(reservation.order_id().as_uuid())
            .bind(reservation.status().as_str())
            .bind(reservation.expires_at())
            .bind(reservation.reserved_at())
            .bind(version.as_i64())
            .bind(document)
            .execute(&mut *conn)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE inventory_reservations
                SET status = $2, expires_at = $3, version = $4, document = $5
                WHERE id = $1 AND version = $6
                "#,
            )
            .bind(reservation.id().as_uuid())
            .bind(reservation.status().as_str())
            .bind(reservation.expires_at())
            .bind(version.as_i64())
            .bind(document)
            .bind(expected.as_i64())
            .execute(&mut *conn)
            .await?
        };

        if result.rows_affected() == 0 {
            let actual = Self::stored_version_by_uuid(
                conn,
                "SELECT version FROM inventory_reservations WHERE id = $1",
                reservation.id().as_uuid(),
            )
            .await?;
            return Err(conflict(reservation, actual));
        }
        Ok(version)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn save_order(&self, order: &Order) -> Result<Version> {
        let expected = order.version();
        let version = expected.next();
        let document = Self::document(order, version)?;

        let result = if expected == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO orders (id, customer_id, status, version, document, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(order.customer_id().as_uuid())
            .bind(order.status().as_str())
            .bind(version.as_i64())
            .bind(document)
            .bind(order.updated_at())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE orders
                SET status = $2, version = $3, document = $4, updated_at = $5
                WHERE id = $1 AND version = $6
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(order.status().as_str())
            .bind(version.as_i64())
            .bind(document)
            .bind(order.updated_at())
            .bind(expected.as_i64())
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            let mut conn = self.pool.acquire().await?;
            let actual = Self::stored_version_by_uuid(
                &mut conn,
                "SELECT version FROM orders WHERE id = $1",
                order.id().as_uuid(),
            )
            .await?;
            return Err(conflict(order, actual));
        }
        Ok(version)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query("SELECT version, document FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn save_level(&self, level: &InventoryLevel) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = Self::write_level(&mut tx, level).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn find_level(&self, sku_id: &SkuId) -> Result<Option<InventoryLevel>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT version, document FROM inventory_levels WHERE sku_id = $1")
                .bind(sku_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn list_levels(&self) -> Result<Vec<InventoryLevel>> {
        let rows = sqlx::query("SELECT version, document FROM inventory_levels ORDER BY sku_id")
            .fetch_all(&self.pool)
            .await?;

        Self::rows_to_records(rows)
    }

    async fn find_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<InventoryReservation>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT version, document FROM inventory_reservations WHERE id = $1")
                .bind(reservation_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn find_reservations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<InventoryReservation>> {
        let rows = sqlx::query(
            r#"
            SELECT version, document
            FROM inventory_reservations
            WHERE order_id = $1
            ORDER BY reserved_at ASC, id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }

    async fn find_reservations_for_sku(
        &self,
        sku_id: &SkuId,
    ) -> Result<Vec<InventoryReservation>> {
        let rows = sqlx::query(
            r#"
            SELECT version, document
            FROM inventory_reservations
            WHERE sku_id = $1
            ORDER BY reserved_at ASC, id ASC
            "#,
        )
        .bind(sku_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }

    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<InventoryReservation>> {
        let rows = sqlx::query(
            r#"
            SELECT version, document
            FROM inventory_reservations
            WHERE status IN ('PENDING', 'CONFIRMED')
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY reserved_at ASC, id ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }

    async fn commit(&self, entry: &LedgerEntry) -> Result<CommittedVersions> {
        let mut tx = self.pool.begin().await?;

        // Any error drops `tx`, which rolls back both writes.
        let level = Self::write_level(&mut tx, &entry.level).await?;
        let reservation = Self::write_reservation(&mut tx, &entry.reservation).await?;

        tx.commit().await?;
        Ok(CommittedVersions { level, reservation })
    }
}

#[async_trait]
impl EventSink for PostgresStore {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        let metadata = serde_json::to_value(&envelope.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, event_type, aggregate_type, aggregate_id, occurred_at, payload, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(envelope.event_id.as_uuid())
        .bind(&envelope.event_type)
        .bind(&envelope.aggregate_type)
        .bind(&envelope.aggregate_id)
        .bind(envelope.timestamp)
        .bind(&envelope.payload)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
