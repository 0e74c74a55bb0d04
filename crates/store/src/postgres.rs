use std::str::FromStr;

use async_trait::async_trait;
use common::{ArtifactId, OrderId, ReviewId};
use domain::{
    Artifact, DomainError, EntryKind, Money, Order, OrderStatus, Review, ReviewOutcome,
    ReviewType, StatusHistoryEntry, VendorOrderRef, VendorProduct, VendorProductKey,
};
use sqlx::{
    PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{EnhancementUpdate, FulfillmentStore, ReviewInsert},
};

const ARTIFACT_COLUMNS: &str = "id, primary_url, enhanced_url, enhancement_status, created_at";

const ORDER_COLUMNS: &str = "id, artifact_id, payment_reference, payment_confirmed_at, \
    product_type, size, price_cents, currency, contact, shipping_address, vendor_order_id, \
    vendor_order_status, hold_reason, status, created_at, updated_at";

const PAYMENT_REFERENCE_CONSTRAINT: &str = "unique_payment_reference";

const REVIEW_COLUMNS: &str =
    "id, artifact_id, review_type, status, reviewer, notes, decided_at, created_at";

/// PostgreSQL-backed fulfillment store.
#[derive(Clone)]
pub struct PostgresFulfillmentStore {
    pool: PgPool,
}

fn parse<T: FromStr<Err = DomainError>>(value: String) -> Result<T> {
    Ok(value.parse::<T>()?)
}

impl PostgresFulfillmentStore {
    /// Creates a new PostgreSQL fulfillment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_artifact(row: PgRow) -> Result<Artifact> {
        Ok(Artifact::restore(
            ArtifactId::from_uuid(row.try_get::<Uuid, _>("id")?),
            row.try_get("primary_url")?,
            row.try_get("enhanced_url")?,
            parse(row.try_get("enhancement_status")?)?,
            row.try_get("created_at")?,
        )?)
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let shipping_address: Option<serde_json::Value> = row.try_get("shipping_address")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            artifact_id: row
                .try_get::<Option<Uuid>, _>("artifact_id")?
                .map(ArtifactId::from_uuid),
            payment_reference: row.try_get("payment_reference")?,
            payment_confirmed_at: row.try_get("payment_confirmed_at")?,
            product_type: parse(row.try_get("product_type")?)?,
            size: row.try_get("size")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            currency: row.try_get("currency")?,
            contact: serde_json::from_value(row.try_get("contact")?)?,
            shipping_address: shipping_address.map(serde_json::from_value).transpose()?,
            vendor_order_id: row.try_get("vendor_order_id")?,
            vendor_order_status: row.try_get("vendor_order_status")?,
            hold_reason: row.try_get("hold_reason")?,
            status: parse(row.try_get("status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_review(row: PgRow) -> Result<Review> {
        Ok(Review {
            id: ReviewId::from_uuid(row.try_get::<Uuid, _>("id")?),
            artifact_id: ArtifactId::from_uuid(row.try_get::<Uuid, _>("artifact_id")?),
            review_type: parse(row.try_get("review_type")?)?,
            status: parse(row.try_get("status")?)?,
            reviewer: row.try_get("reviewer")?,
            notes: row.try_get("notes")?,
            decided_at: row.try_get("decided_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_history(row: PgRow) -> Result<StatusHistoryEntry> {
        Ok(StatusHistoryEntry {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            status: parse(row.try_get("status")?)?,
            kind: parse(row.try_get("kind")?)?,
            note: row.try_get("note")?,
            recorded_at: row.try_get("recorded_at")?,
            sequence: row.try_get("sequence")?,
        })
    }

    fn row_to_vendor_product(row: PgRow) -> Result<VendorProduct> {
        Ok(VendorProduct {
            key: VendorProductKey {
                product_type: parse(row.try_get("product_type")?)?,
                size: row.try_get("size")?,
                region: parse(row.try_get("region")?)?,
            },
            vendor_product_id: row.try_get("vendor_product_id")?,
            vendor_variant_id: row.try_get::<i64, _>("vendor_variant_id")? as u64,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn fetch_order_where(&self, clause: &str, value: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {clause} = $1");
        sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    /// Explains why a guarded UPDATE matched no row.
    async fn status_mismatch(
        tx: &mut Transaction<'_, Postgres>,
        id: OrderId,
        expected: OrderStatus,
    ) -> StoreError {
        let actual: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await;
        tracing::debug!(order_id = %id, %expected, "guarded order update matched no row");
        metrics::counter!("store_status_conflicts_total").increment(1);
        match actual {
            Ok(Some(actual)) => match actual.parse::<OrderStatus>() {
                Ok(actual) => StoreError::StatusConflict {
                    order_id: id,
                    expected,
                    actual,
                },
                Err(e) => StoreError::Domain(e),
            },
            Ok(None) => StoreError::not_found("order", id),
            Err(e) => StoreError::Database(e),
        }
    }

    async fn insert_history(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        status: OrderStatus,
        kind: EntryKind,
        note: &str,
    ) -> Result<StatusHistoryEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, status, kind, note)
            VALUES ($1, $2, $3, $4)
            RETURNING sequence, order_id, status, kind, note, recorded_at
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(status.as_str())
        .bind(kind.as_str())
        .bind(note)
        .fetch_one(&mut **tx)
        .await?;
        Self::row_to_history(row)
    }
}

#[async_trait]
impl FulfillmentStore for PostgresFulfillmentStore {
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, primary_url, enhanced_url, enhancement_status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(artifact.id.as_uuid())
        .bind(&artifact.primary_url)
        .bind(artifact.enhanced_url())
        .bind(artifact.enhancement_status().as_str())
        .bind(artifact.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::already_exists("artifact", artifact.id)
            }
            other => StoreError::Database(other),
        })?;
        Ok(())
    }

    async fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>> {
        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_artifact)
            .transpose()
    }

    async fn update_enhancement(
        &self,
        id: ArtifactId,
        update: EnhancementUpdate,
    ) -> Result<Artifact> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("artifact", id))?;
        let mut artifact = Self::row_to_artifact(row)?;
        update.apply(&mut artifact)?;

        sqlx::query(
            "UPDATE artifacts SET enhancement_status = $2, enhanced_url = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(artifact.enhancement_status().as_str())
        .bind(artifact.enhanced_url())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(artifact)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, artifact_id, payment_reference, payment_confirmed_at,
                product_type, size, price_cents, currency, contact, shipping_address,
                vendor_order_id, vendor_order_status, hold_reason, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.artifact_id.map(|a| a.as_uuid()))
        .bind(&order.payment_reference)
        .bind(order.payment_confirmed_at)
        .bind(order.product_type.as_str())
        .bind(&order.size)
        .bind(order.price.cents())
        .bind(&order.currency)
        .bind(serde_json::to_value(&order.contact)?)
        .bind(
            order
                .shipping_address
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&order.vendor_order_id)
        .bind(&order.vendor_order_status)
        .bind(&order.hold_reason)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                if db_err.constraint() == Some(PAYMENT_REFERENCE_CONSTRAINT) {
                    StoreError::already_exists("payment reference", &order.payment_reference)
                } else {
                    StoreError::already_exists("order", order.id)
                }
            }
            other => StoreError::Database(other),
        })?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        self.fetch_order_where("payment_reference", reference).await
    }

    async fn find_order_by_vendor_order_id(&self, vendor_order_id: &str) -> Result<Option<Order>> {
        self.fetch_order_where("vendor_order_id", vendor_order_id)
            .await
    }

    async fn confirm_payment(&self, id: OrderId, payment_reference: &str) -> Result<Order> {
        let sql = format!(
            r#"
            UPDATE orders
            SET payment_reference = $2, payment_confirmed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND payment_confirmed_at IS NULL
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let updated = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(payment_reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::already_exists("payment reference", payment_reference)
                }
                other => StoreError::Database(other),
            })?;
        match updated {
            Some(row) => Self::row_to_order(row),
            None => self
                .get_order(id)
                .await?
                .ok_or_else(|| StoreError::not_found("order", id)),
        }
    }

    async fn attach_artifact(&self, id: OrderId, artifact_id: ArtifactId) -> Result<Order> {
        let sql = format!(
            r#"
            UPDATE orders SET artifact_id = $2, updated_at = NOW()
            WHERE id = $1 AND (artifact_id IS NULL OR artifact_id = $2)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let updated = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(artifact_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    StoreError::not_found("artifact", artifact_id)
                }
                other => StoreError::Database(other),
            })?;
        match updated {
            Some(row) => Self::row_to_order(row),
            None => {
                let order = self
                    .get_order(id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("order", id))?;
                let existing = order
                    .artifact_id
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                Err(StoreError::already_exists("order artifact", existing))
            }
        }
    }

    async fn transition_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        note: &str,
    ) -> Result<Order> {
        if !expected.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: expected,
                to: next,
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE orders SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(next.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(Self::status_mismatch(&mut tx, id, expected).await);
        };
        let order = Self::row_to_order(row)?;

        Self::insert_history(&mut tx, id, next, EntryKind::Transition, note).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn record_vendor_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        vendor_order: &VendorOrderRef,
        note: &str,
    ) -> Result<Order> {
        if !expected.can_transition_to(OrderStatus::Processing) {
            return Err(DomainError::InvalidTransition {
                from: expected,
                to: OrderStatus::Processing,
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE orders
            SET status = 'processing', vendor_order_id = $3, vendor_order_status = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = $2 AND vendor_order_id IS NULL
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(&vendor_order.vendor_order_id)
            .bind(&vendor_order.status)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::already_exists("vendor order", &vendor_order.vendor_order_id)
                }
                other => StoreError::Database(other),
            })?;
        let Some(row) = row else {
            return Err(Self::status_mismatch(&mut tx, id, expected).await);
        };
        let order = Self::row_to_order(row)?;

        Self::insert_history(
            &mut tx,
            id,
            OrderStatus::Processing,
            EntryKind::Transition,
            note,
        )
        .await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn update_vendor_status(&self, id: OrderId, vendor_status: &str) -> Result<Order> {
        let sql = format!(
            r#"
            UPDATE orders SET vendor_order_status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(vendor_status)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn set_hold(&self, id: OrderId, reason: Option<&str>) -> Result<Order> {
        let sql = format!(
            r#"
            UPDATE orders SET hold_reason = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(reason)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn orders_awaiting_vendor(&self) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE vendor_order_id IS NULL
              AND payment_confirmed_at IS NOT NULL
              AND product_type <> 'digital'
              AND status IN ('pending', 'pending_review')
            ORDER BY created_at ASC
            "#
        );
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_order)
            .collect()
    }

    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<StatusHistoryEntry> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::insert_history(
            &mut tx,
            entry.order_id,
            entry.status,
            EntryKind::Annotation,
            &entry.note,
        )
        .await
        .map_err(|e| match e {
            StoreError::Database(sqlx::Error::Database(ref db_err))
                if db_err.is_foreign_key_violation() =>
            {
                StoreError::not_found("order", entry.order_id)
            }
            other => other,
        })?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        sqlx::query(
            r#"
            SELECT sequence, order_id, status, kind, note, recorded_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY recorded_at ASC, sequence ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_history)
        .collect()
    }

    async fn insert_review_unless_pending(&self, review: &Review) -> Result<ReviewInsert> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO reviews (id, artifact_id, review_type, status, reviewer, notes, decided_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (artifact_id, review_type) WHERE status = 'pending' DO NOTHING
            "#,
        )
        .bind(review.id.as_uuid())
        .bind(review.artifact_id.as_uuid())
        .bind(review.review_type.as_str())
        .bind(review.status.as_str())
        .bind(&review.reviewer)
        .bind(&review.notes)
        .bind(review.decided_at)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::not_found("artifact", review.artifact_id)
            }
            other => StoreError::Database(other),
        })?;

        if inserted.rows_affected() == 1 {
            return Ok(ReviewInsert::Created(review.clone()));
        }

        let sql = format!(
            r#"
            SELECT {REVIEW_COLUMNS} FROM reviews
            WHERE artifact_id = $1 AND review_type = $2 AND status = 'pending'
            "#
        );
        let row = sqlx::query(&sql)
            .bind(review.artifact_id.as_uuid())
            .bind(review.review_type.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("pending review", review.artifact_id))?;
        Ok(ReviewInsert::Existing(Self::row_to_review(row)?))
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_review)
            .transpose()
    }

    async fn decide_review(
        &self,
        id: ReviewId,
        outcome: ReviewOutcome,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<Review> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("review", id))?;
        let mut review = Self::row_to_review(row)?;
        review.decide(outcome, reviewer, notes)?;

        sqlx::query(
            r#"
            UPDATE reviews SET status = $2, reviewer = $3, notes = $4, decided_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(review.status.as_str())
        .bind(&review.reviewer)
        .bind(&review.notes)
        .bind(review.decided_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(review)
    }

    async fn reviews_for_artifact(&self, artifact_id: ArtifactId) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE artifact_id = $1 ORDER BY created_at ASC"
        );
        sqlx::query(&sql)
            .bind(artifact_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_review)
            .collect()
    }

    async fn pending_reviews(&self, review_type: Option<ReviewType>) -> Result<Vec<Review>> {
        let sql = format!(
            r#"
            SELECT {REVIEW_COLUMNS} FROM reviews
            WHERE status = 'pending' AND ($1::TEXT IS NULL OR review_type = $1)
            ORDER BY created_at ASC
            "#
        );
        sqlx::query(&sql)
            .bind(review_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_review)
            .collect()
    }

    async fn get_vendor_product(&self, key: &VendorProductKey) -> Result<Option<VendorProduct>> {
        sqlx::query(
            r#"
            SELECT product_type, size, region, vendor_product_id, vendor_variant_id, created_at
            FROM vendor_products
            WHERE product_type = $1 AND size = $2 AND region = $3
            "#,
        )
        .bind(key.product_type.as_str())
        .bind(&key.size)
        .bind(key.region.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_vendor_product)
        .transpose()
    }

    async fn insert_vendor_product(&self, product: &VendorProduct) -> Result<VendorProduct> {
        sqlx::query(
            r#"
            INSERT INTO vendor_products (product_type, size, region, vendor_product_id, vendor_variant_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_type, size, region) DO NOTHING
            "#,
        )
        .bind(product.key.product_type.as_str())
        .bind(&product.key.size)
        .bind(product.key.region.as_str())
        .bind(&product.vendor_product_id)
        .bind(product.vendor_variant_id as i64)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        self.get_vendor_product(&product.key)
            .await?
            .ok_or_else(|| StoreError::not_found("vendor product", &product.key))
    }
}

