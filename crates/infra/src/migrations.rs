//! Versioned schema migrations.
//!
//! Applied in order at startup. Each step runs in its own transaction together
//! with its `schema_migrations` row, so a failed step leaves no trace and a
//! finished one is never re-run.

use sqlx::PgPool;
use tracing::{info, instrument};

use crate::store::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Serializes concurrent runners across processes.
const MIGRATION_LOCK_KEY: i64 = 0x6e65_7466_6162;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "items",
        sql: r#"
        CREATE TABLE items (
            id               UUID PRIMARY KEY,
            code             TEXT NOT NULL UNIQUE,
            name             TEXT NOT NULL,
            category         TEXT NOT NULL CHECK (category IN ('panel', 'material', 'tool')),
            unit             TEXT NOT NULL,
            unit_cost        NUMERIC(18, 4) NOT NULL DEFAULT 0 CHECK (unit_cost >= 0),
            quantity_on_hand NUMERIC(18, 4) NOT NULL DEFAULT 0 CHECK (quantity_on_hand >= 0),
            active           BOOLEAN NOT NULL DEFAULT TRUE,
            version          BIGINT NOT NULL,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX items_category_idx ON items (category) WHERE active;
        "#,
    },
    Migration {
        version: 2,
        name: "production_orders",
        sql: r#"
        CREATE TABLE production_orders (
            id           UUID PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            client       TEXT NOT NULL,
            notes        TEXT,
            state        TEXT NOT NULL
                         CHECK (state IN ('pendiente', 'en_proceso', 'completada', 'cancelada', 'pausada')),
            priority     TEXT NOT NULL DEFAULT 'media'
                         CHECK (priority IN ('baja', 'media', 'alta', 'urgente')),
            created_at   TIMESTAMPTZ NOT NULL,
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            version      BIGINT NOT NULL
        );
        CREATE INDEX production_orders_state_idx ON production_orders (state);
        CREATE INDEX production_orders_created_idx ON production_orders (created_at DESC);

        CREATE TABLE order_lines (
            id                 UUID PRIMARY KEY,
            order_id           UUID NOT NULL REFERENCES production_orders (id) ON DELETE CASCADE,
            line_no            INTEGER NOT NULL CHECK (line_no > 0),
            item_id            UUID NOT NULL REFERENCES items (id),
            item_type          TEXT NOT NULL CHECK (item_type IN ('PANO', 'MATERIAL', 'HERRAMIENTA')),
            quantity_committed NUMERIC(18, 4) NOT NULL CHECK (quantity_committed > 0),
            unit               TEXT NOT NULL,
            unit_cost          NUMERIC(18, 4) NOT NULL CHECK (unit_cost >= 0),
            total_cost         NUMERIC(22, 8) NOT NULL,
            notes              TEXT,
            restored           BOOLEAN NOT NULL DEFAULT FALSE,
            UNIQUE (order_id, line_no)
        );

        CREATE TABLE order_state_history (
            id         BIGSERIAL PRIMARY KEY,
            order_id   UUID NOT NULL REFERENCES production_orders (id) ON DELETE CASCADE,
            from_state TEXT,
            to_state   TEXT NOT NULL,
            comment    TEXT,
            actor      UUID NOT NULL,
            changed_at TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX order_state_history_order_idx ON order_state_history (order_id, id);
        "#,
    },
    Migration {
        version: 3,
        name: "movements",
        sql: r#"
        CREATE TABLE movements (
            seq              BIGSERIAL NOT NULL UNIQUE,
            id               UUID PRIMARY KEY,
            item_id          UUID NOT NULL REFERENCES items (id),
            movement_type    TEXT NOT NULL CHECK (movement_type IN ('ENTRADA', 'SALIDA', 'AJUSTE')),
            quantity         NUMERIC(18, 4) NOT NULL CHECK (quantity >= 0),
            quantity_before  NUMERIC(18, 4) NOT NULL CHECK (quantity_before >= 0),
            quantity_after   NUMERIC(18, 4) NOT NULL CHECK (quantity_after >= 0),
            related_order_id UUID REFERENCES production_orders (id) ON DELETE SET NULL,
            actor            UUID NOT NULL,
            reason           TEXT NOT NULL
                             CHECK (reason IN ('initial_stock', 'manual', 'order_reservation', 'cancellation_restoration')),
            notes            TEXT,
            recorded_at      TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX movements_item_idx ON movements (item_id, seq);
        CREATE INDEX movements_order_idx ON movements (related_order_id) WHERE related_order_id IS NOT NULL;
        CREATE INDEX movements_recorded_idx ON movements (recorded_at);
        "#,
    },
    Migration {
        version: 4,
        name: "movements_insert_only",
        sql: r#"
        CREATE FUNCTION movements_reject_change() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'movements are insert-only';
        END;
        $$ LANGUAGE plpgsql;

        -- related_order_id stays writable so ON DELETE SET NULL keeps working.
        CREATE TRIGGER movements_no_update
            BEFORE UPDATE OF id, item_id, movement_type, quantity, quantity_before,
                             quantity_after, actor, reason, notes, recorded_at
            ON movements
            FOR EACH ROW EXECUTE FUNCTION movements_reject_change();

        CREATE TRIGGER movements_no_delete
            BEFORE DELETE ON movements
            FOR EACH ROW EXECUTE FUNCTION movements_reject_change();
        "#,
    },
];

/// Apply every migration not yet recorded. Returns the versions applied now.
#[instrument(skip(pool), err)]
pub async fn run(pool: &PgPool) -> Result<Vec<i64>, StoreError> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    BIGINT PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| backend("create_schema_migrations", e))?;

    let mut applied = Vec::new();
    for migration in MIGRATIONS {
        let mut tx = pool.begin().await.map_err(|e| backend("begin_migration", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("lock_migrations", e))?;

        let done: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM schema_migrations WHERE version = $1)")
                .bind(migration.version)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| backend("check_migration", e))?;
        if done {
            tx.rollback().await.map_err(|e| backend("rollback", e))?;
            continue;
        }

        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(migration.name, e))?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("record_migration", e))?;
        tx.commit().await.map_err(|e| backend("commit_migration", e))?;

        info!(version = migration.version, name = migration.name, "migration applied");
        applied.push(migration.version);
    }
    Ok(applied)
}

fn backend(step: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("migration step {step} failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
        assert_eq!(MIGRATIONS[0].version, 1);
    }

    #[test]
    fn check_constraints_cover_every_domain_value() {
        let sql: String = MIGRATIONS.iter().map(|m| m.sql).collect();
        for state in netfab_production::OrderState::ALL {
            assert!(sql.contains(&format!("'{}'", state.as_str())));
        }
        for priority in netfab_production::Priority::ALL {
            assert!(sql.contains(&format!("'{}'", priority.as_str())));
        }
        for t in netfab_inventory::MovementType::ALL {
            assert!(sql.contains(&format!("'{}'", t.as_str())));
        }
    }
}
