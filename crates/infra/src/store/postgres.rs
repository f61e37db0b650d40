//! Postgres-backed store.
//!
//! Each unit of work is one database transaction. Item and order rows are
//! read with `SELECT ... FOR UPDATE` and written back with a version guard, so
//! concurrent writers either serialize on the row lock or fail the version
//! check.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | StoreError |
//! |------------|---------------|------------|
//! | unique violation | `23505` | `Concurrency` |
//! | serialization failure | `40001` | `Concurrency` |
//! | deadlock detected | `40P01` | `Concurrency` |
//! | lock not available | `55P03` | `Concurrency` |
//! | any other database error | other | `Backend` |
//! | pool / IO / protocol errors | n/a | `Backend` |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use netfab_core::{AggregateRoot, ExpectedVersion, ItemId, LineId, MovementId, OrderId, Quantity, UserId};
use netfab_inventory::{InventoryEvent, InventoryItem, ItemDetails, MovementEntry, MovementType};
use netfab_production::{
    OrderEvent, OrderLine, OrderNumber, OrderSnapshot, OrderState, ProductionOrder, StateChange,
};

use super::query::{
    ItemFilter, MovementFilter, MovementStats, MovementTypeStats, OrderFilter, OrderStats, Page,
    Pagination, StateCount,
};
use super::r#trait::{Store, StoreError, UnitOfWork};

const ITEM_COLUMNS: &str =
    "id, code, name, category, unit, unit_cost, quantity_on_hand, active, version";

const MOVEMENT_COLUMNS: &str = "id, item_id, movement_type, quantity, quantity_before, \
     quantity_after, related_order_id, actor, reason, notes, recorded_at";

const ORDER_COLUMNS: &str =
    "id, order_number, client, notes, state, priority, created_at, version";

/// How long a unit of work waits for a row lock before giving up.
const LOCK_TIMEOUT: &str = "5s";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, StoreError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query(&format!("SET LOCAL lock_timeout = '{LOCK_TIMEOUT}'"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        let mut conn = self.conn().await?;
        fetch_item(&mut conn, item_id, false).await
    }

    #[instrument(skip(self), err)]
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {ITEM_COLUMNS} FROM items WHERE TRUE"));
        if !filter.include_retired {
            qb.push(" AND active");
        }
        if let Some(category) = filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        qb.push(" ORDER BY code ASC");

        let mut conn = self.conn().await?;
        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), fields(movement_count = tracing::field::Empty), err)]
    async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<Page<MovementEntry>, StoreError> {
        let span = Span::current();
        let mut conn = self.conn().await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM movements WHERE TRUE");
        push_movement_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE TRUE"
        ));
        push_movement_filters(&mut qb, filter);
        qb.push(" ORDER BY seq DESC LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset));
        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;
        let entries = rows.iter().map(movement_from_row).collect::<Result<Vec<_>, _>>()?;

        span.record("movement_count", entries.len());
        Ok(Page::new(entries, total as u64, pagination))
    }

    #[instrument(skip(self), fields(movement_id = %movement_id), err)]
    async fn get_movement(&self, movement_id: MovementId) -> Result<Option<MovementEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query(&format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE id = $1"))
            .bind(movement_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_movement", e))?;
        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn movement_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<MovementStats, StoreError> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query(
            r#"
            SELECT movement_type, COUNT(*) AS count, COALESCE(SUM(quantity), 0) AS total_quantity
            FROM movements
            WHERE ($1::timestamptz IS NULL OR recorded_at >= $1)
              AND ($2::timestamptz IS NULL OR recorded_at <= $2)
            GROUP BY movement_type
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("movement_stats", e))?;

        let mut stats = MovementStats::from_entries(std::iter::empty());
        for row in rows {
            let movement_type: MovementType = parse_column(&row, "movement_type")?;
            let count: i64 = get(&row, "count")?;
            let total_quantity: Decimal = get(&row, "total_quantity")?;
            if let Some(slot) = stats.by_type.iter_mut().find(|s| s.movement_type == movement_type) {
                *slot = MovementTypeStats {
                    movement_type,
                    count: count as u64,
                    total_quantity,
                };
            }
            stats.total += count as u64;
        }
        Ok(stats)
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn get_order(&self, order_id: OrderId) -> Result<Option<ProductionOrder>, StoreError> {
        let mut conn = self.conn().await?;
        fetch_order(&mut conn, order_id, false).await
    }

    #[instrument(skip(self), err)]
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<Page<ProductionOrder>, StoreError> {
        let mut conn = self.conn().await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM production_orders WHERE TRUE");
        push_order_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("count_orders", e))?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM production_orders WHERE TRUE"
        ));
        push_order_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, order_number DESC LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset));
        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;
        let rows = rows
            .iter()
            .map(|r| OrderRow::from_row(r).map_err(|e| corrupt("production_orders", e)))
            .collect::<Result<Vec<_>, _>>()?;

        let orders = hydrate_orders(&mut conn, rows).await?;
        Ok(Page::new(orders, total as u64, pagination))
    }

    #[instrument(skip(self), err)]
    async fn order_stats(&self) -> Result<OrderStats, StoreError> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query("SELECT state, COUNT(*) AS count FROM production_orders GROUP BY state")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("order_stats", e))?;

        let mut stats = OrderStats::from_states(std::iter::empty());
        for row in rows {
            let state: OrderState = parse_column(&row, "state")?;
            let count: i64 = get(&row, "count")?;
            if let Some(slot) = stats.by_state.iter_mut().find(|s| s.state == state) {
                *slot = StateCount {
                    state,
                    count: count as u64,
                };
            }
            stats.total += count as u64;
        }
        Ok(stats)
    }
}

struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn lock_item(&mut self, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        fetch_item(&mut self.tx, item_id, true).await
    }

    async fn item_code_taken(&mut self, code: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM items WHERE code = $1)")
            .bind(code)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("item_code_taken", e))
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn item_ledger(&mut self, item_id: ItemId) -> Result<Vec<MovementEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE item_id = $1 ORDER BY seq ASC"
        ))
        .bind(item_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("item_ledger", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn restored_quantity(
        &mut self,
        order_id: OrderId,
        item_id: ItemId,
    ) -> Result<Decimal, StoreError> {
        sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0)
            FROM movements
            WHERE related_order_id = $1
              AND item_id = $2
              AND reason = 'cancellation_restoration'
              AND movement_type = 'ENTRADA'
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("restored_quantity", e))
    }

    #[instrument(
        skip(self, item, events),
        fields(item_id = %item.id(), event_count = events.len(), expected_version = ?expected),
        err
    )]
    async fn persist_item(
        &mut self,
        item: &InventoryItem,
        events: &[InventoryEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let details = item.details();
        match expected {
            ExpectedVersion::New => {
                sqlx::query(
                    r#"
                    INSERT INTO items (
                        id, code, name, category, unit, unit_cost,
                        quantity_on_hand, active, version
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(item.id().as_uuid())
                .bind(&details.code)
                .bind(&details.name)
                .bind(details.category.as_str())
                .bind(&details.unit)
                .bind(details.unit_cost)
                .bind(item.quantity_on_hand().value())
                .bind(item.is_active())
                .bind(item.version() as i64)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("insert_item", e))?;
            }
            ExpectedVersion::Exact(version) => {
                let result = sqlx::query(
                    r#"
                    UPDATE items
                    SET quantity_on_hand = $2, active = $3, version = $4,
                        name = $6, unit = $7, unit_cost = $8, updated_at = NOW()
                    WHERE id = $1 AND version = $5
                    "#,
                )
                .bind(item.id().as_uuid())
                .bind(item.quantity_on_hand().value())
                .bind(item.is_active())
                .bind(item.version() as i64)
                .bind(version as i64)
                .bind(&details.name)
                .bind(&details.unit)
                .bind(details.unit_cost)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_item", e))?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::Concurrency(format!(
                        "item {} is no longer at version {version}",
                        item.id()
                    )));
                }
            }
        }

        for event in events {
            if let InventoryEvent::MovementRecorded(entry) = event {
                insert_movement(&mut self.tx, entry).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<ProductionOrder>, StoreError> {
        fetch_order(&mut self.tx, order_id, true).await
    }

    async fn order_exists(&mut self, order_id: OrderId) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM production_orders WHERE id = $1)")
            .bind(order_id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order_exists", e))
    }

    #[instrument(skip(self), err)]
    async fn last_order_number(&mut self, date: NaiveDate) -> Result<Option<OrderNumber>, StoreError> {
        let prefix = OrderNumber::day_prefix(date);

        // Held until commit/rollback: one numbering transaction per day at a time.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&prefix)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order_numbering", e))?;

        let last: Option<String> = sqlx::query_scalar(
            r#"
            SELECT order_number
            FROM production_orders
            WHERE order_number LIKE $1 || '%'
            ORDER BY length(order_number) DESC, order_number DESC
            LIMIT 1
            "#,
        )
        .bind(&prefix)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("last_order_number", e))?;

        last.map(|n| n.parse::<OrderNumber>().map_err(|e| corrupt("production_orders.order_number", e)))
            .transpose()
    }

    #[instrument(
        skip(self, order, events),
        fields(order_id = %order.id(), event_count = events.len(), expected_version = ?expected),
        err
    )]
    async fn persist_order(
        &mut self,
        order: &ProductionOrder,
        events: &[OrderEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        match expected {
            ExpectedVersion::New => {
                let number = order
                    .order_number()
                    .ok_or_else(|| StoreError::Corrupt("new order without a number".to_string()))?;
                sqlx::query(
                    r#"
                    INSERT INTO production_orders (
                        id, order_number, client, notes, state, priority, created_at, version
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(order.id().as_uuid())
                .bind(number.to_string())
                .bind(order.client())
                .bind(order.notes())
                .bind(order.state().as_str())
                .bind(order.priority().as_str())
                .bind(order.created_at().unwrap_or_else(Utc::now))
                .bind(order.version() as i64)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("insert_order", e))?;
            }
            ExpectedVersion::Exact(version) => {
                let result = sqlx::query(
                    r#"
                    UPDATE production_orders
                    SET state = $2, version = $3, client = $5, notes = $6, priority = $7,
                        updated_at = NOW()
                    WHERE id = $1 AND version = $4
                    "#,
                )
                .bind(order.id().as_uuid())
                .bind(order.state().as_str())
                .bind(order.version() as i64)
                .bind(version as i64)
                .bind(order.client())
                .bind(order.notes())
                .bind(order.priority().as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_order", e))?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::Concurrency(format!(
                        "order {} is no longer at version {version}",
                        order.id()
                    )));
                }
            }
        }

        for event in events {
            match event {
                OrderEvent::OrderCreated(e) => {
                    for line in &e.lines {
                        insert_line(&mut self.tx, e.order_id, line).await?;
                    }
                    if let Some(initial) = order.history().first() {
                        insert_history(&mut self.tx, e.order_id, initial).await?;
                    }
                }
                OrderEvent::StateChanged(e) => {
                    insert_history(&mut self.tx, e.order_id, &e.change).await?;
                }
                // Header columns are written by the UPDATE above.
                OrderEvent::DetailsUpdated(_) => {}
                OrderEvent::LineRestored(e) => {
                    sqlx::query("UPDATE order_lines SET restored = TRUE WHERE order_id = $1 AND line_no = $2")
                        .bind(e.order_id.as_uuid())
                        .bind(e.line_no as i32)
                        .execute(&mut *self.tx)
                        .await
                        .map_err(|e| map_sqlx_error("mark_line_restored", e))?;
                }
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

async fn fetch_item(
    conn: &mut PgConnection,
    item_id: ItemId,
    for_update: bool,
) -> Result<Option<InventoryItem>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1{lock}"))
        .bind(item_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_item", e))?;
    row.as_ref().map(item_from_row).transpose()
}

async fn fetch_order(
    conn: &mut PgConnection,
    order_id: OrderId,
    for_update: bool,
) -> Result<Option<ProductionOrder>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM production_orders WHERE id = $1{lock}"
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_order", e))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let row = OrderRow::from_row(&row).map_err(|e| corrupt("production_orders", e))?;
    Ok(hydrate_orders(conn, vec![row]).await?.pop())
}

/// Attach lines and history to order rows, keeping the rows' order.
async fn hydrate_orders(
    conn: &mut PgConnection,
    rows: Vec<OrderRow>,
) -> Result<Vec<ProductionOrder>, StoreError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let line_rows = sqlx::query(
        r#"
        SELECT id, order_id, line_no, item_id, item_type, quantity_committed,
               unit, unit_cost, total_cost, notes, restored
        FROM order_lines
        WHERE order_id = ANY($1)
        ORDER BY order_id, line_no
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_order_lines", e))?;

    let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in &line_rows {
        let order_id: Uuid = get(row, "order_id")?;
        lines.entry(order_id).or_default().push(line_from_row(row)?);
    }

    let history_rows = sqlx::query(
        r#"
        SELECT order_id, from_state, to_state, comment, actor, changed_at
        FROM order_state_history
        WHERE order_id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_order_history", e))?;

    let mut history: HashMap<Uuid, Vec<StateChange>> = HashMap::new();
    for row in &history_rows {
        let order_id: Uuid = get(row, "order_id")?;
        let from: Option<String> = get(row, "from_state")?;
        let change = StateChange {
            from: from
                .map(|s| s.parse::<OrderState>().map_err(|e| corrupt("order_state_history.from_state", e)))
                .transpose()?,
            to: parse_column(row, "to_state")?,
            comment: get(row, "comment")?,
            actor: UserId::from_uuid(get(row, "actor")?),
            changed_at: get(row, "changed_at")?,
        };
        history.entry(order_id).or_default().push(change);
    }

    rows.into_iter()
        .map(|row| {
            let lines = lines.remove(&row.id).unwrap_or_default();
            let history = history.remove(&row.id).unwrap_or_default();
            row.into_order(lines, history)
        })
        .collect()
}

async fn insert_movement(conn: &mut PgConnection, entry: &MovementEntry) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO movements (
            id, item_id, movement_type, quantity, quantity_before, quantity_after,
            related_order_id, actor, reason, notes, recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.item_id.as_uuid())
    .bind(entry.movement_type.as_str())
    .bind(entry.quantity.value())
    .bind(entry.quantity_before.value())
    .bind(entry.quantity_after.value())
    .bind(entry.related_order_id.map(Uuid::from))
    .bind(entry.actor.as_uuid())
    .bind(entry.reason.as_str())
    .bind(entry.notes.as_deref())
    .bind(entry.recorded_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

async fn insert_line(conn: &mut PgConnection, order_id: OrderId, line: &OrderLine) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO order_lines (
            id, order_id, line_no, item_id, item_type, quantity_committed,
            unit, unit_cost, total_cost, notes, restored
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(line.id.as_uuid())
    .bind(order_id.as_uuid())
    .bind(line.line_no as i32)
    .bind(line.item_id.as_uuid())
    .bind(line.item_type.as_str())
    .bind(line.quantity_committed.value())
    .bind(&line.unit)
    .bind(line.unit_cost)
    .bind(line.total_cost)
    .bind(line.notes.as_deref())
    .bind(line.restored)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_order_line", e))?;
    Ok(())
}

async fn insert_history(
    conn: &mut PgConnection,
    order_id: OrderId,
    change: &StateChange,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO order_state_history (order_id, from_state, to_state, comment, actor, changed_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(order_id.as_uuid())
    .bind(change.from.map(|s| s.as_str()))
    .bind(change.to.as_str())
    .bind(change.comment.as_deref())
    .bind(change.actor.as_uuid())
    .bind(change.changed_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_state_history", e))?;
    Ok(())
}

fn push_movement_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &MovementFilter) {
    if let Some(t) = filter.movement_type {
        qb.push(" AND movement_type = ").push_bind(t.as_str());
    }
    if let Some(item_id) = filter.item_id {
        qb.push(" AND item_id = ").push_bind(Uuid::from(item_id));
    }
    if let Some(order_id) = filter.order_id {
        qb.push(" AND related_order_id = ").push_bind(Uuid::from(order_id));
    }
    if let Some(from) = filter.from {
        qb.push(" AND recorded_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND recorded_at <= ").push_bind(to);
    }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    if let Some(state) = filter.state {
        qb.push(" AND state = ").push_bind(state.as_str());
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(client) = filter.client.as_deref() {
        qb.push(" AND client ILIKE ")
            .push_bind(format!("%{}%", client.replace('%', "\\%").replace('_', "\\_")));
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {column}: {e}")))
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = get(row, column)?;
    raw.parse().map_err(|e| corrupt(column, e))
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {err}"))
}

fn quantity(row: &PgRow, column: &str) -> Result<Quantity, StoreError> {
    Quantity::new(get(row, column)?).map_err(|e| corrupt(column, e))
}

fn item_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    let version: i64 = get(row, "version")?;
    Ok(InventoryItem::rehydrate(
        ItemId::from_uuid(get(row, "id")?),
        ItemDetails {
            code: get(row, "code")?,
            name: get(row, "name")?,
            category: parse_column(row, "category")?,
            unit: get(row, "unit")?,
            unit_cost: get(row, "unit_cost")?,
        },
        quantity(row, "quantity_on_hand")?,
        get(row, "active")?,
        version as u64,
    ))
}

fn movement_from_row(row: &PgRow) -> Result<MovementEntry, StoreError> {
    let related: Option<Uuid> = get(row, "related_order_id")?;
    Ok(MovementEntry {
        id: MovementId::from_uuid(get(row, "id")?),
        item_id: ItemId::from_uuid(get(row, "item_id")?),
        movement_type: parse_column(row, "movement_type")?,
        quantity: quantity(row, "quantity")?,
        quantity_before: quantity(row, "quantity_before")?,
        quantity_after: quantity(row, "quantity_after")?,
        related_order_id: related.map(OrderId::from_uuid),
        actor: UserId::from_uuid(get(row, "actor")?),
        reason: parse_column(row, "reason")?,
        notes: get(row, "notes")?,
        recorded_at: get(row, "recorded_at")?,
    })
}

fn line_from_row(row: &PgRow) -> Result<OrderLine, StoreError> {
    let line_no: i32 = get(row, "line_no")?;
    Ok(OrderLine {
        id: LineId::from_uuid(get(row, "id")?),
        line_no: line_no as u32,
        item_id: ItemId::from_uuid(get(row, "item_id")?),
        item_type: parse_column(row, "item_type")?,
        quantity_committed: quantity(row, "quantity_committed")?,
        unit: get(row, "unit")?,
        unit_cost: get(row, "unit_cost")?,
        total_cost: get(row, "total_cost")?,
        notes: get(row, "notes")?,
        restored: get(row, "restored")?,
    })
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    client: String,
    notes: Option<String>,
    state: String,
    priority: String,
    created_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            order_number: row.try_get("order_number")?,
            client: row.try_get("client")?,
            notes: row.try_get("notes")?,
            state: row.try_get("state")?,
            priority: row.try_get("priority")?,
            created_at: row.try_get("created_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>, history: Vec<StateChange>) -> Result<ProductionOrder, StoreError> {
        Ok(ProductionOrder::rehydrate(OrderSnapshot {
            id: OrderId::from_uuid(self.id),
            order_number: self
                .order_number
                .parse()
                .map_err(|e| corrupt("production_orders.order_number", e))?,
            client: self.client,
            notes: self.notes,
            state: self.state.parse().map_err(|e| corrupt("production_orders.state", e))?,
            priority: self
                .priority
                .parse()
                .map_err(|e| corrupt("production_orders.priority", e))?,
            created_at: self.created_at,
            lines,
            history,
            version: self.version as u64,
        }))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") | Some("55P03") => {
                    StoreError::Concurrency(msg)
                }
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
