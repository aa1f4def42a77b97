//! Schema creation for the relational backend.
//!
//! Tables are created inside one transaction under an advisory lock so
//! concurrent controllers starting against the same database do not race
//! each other. Every statement is `IF NOT EXISTS`; `initialize` is safe
//! to call repeatedly.

use sqlx::{PgPool, Postgres, Transaction};

const SCHEMA_INIT_LOCK_ID: i64 = 0x474f_5254_4441_5441;

pub(crate) async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_INIT_LOCK_ID)
        .execute(&mut *tx)
        .await?;

    apply_identity_schema(&mut tx).await?;
    apply_bundle_schema(&mut tx).await?;
    apply_request_schema(&mut tx).await?;
    apply_schedule_schema(&mut tx).await?;
    apply_config_schema(&mut tx).await?;

    tx.commit().await
}

async fn apply_identity_schema(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            username      TEXT PRIMARY KEY,
            email         TEXT NOT NULL UNIQUE,
            full_name     TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL DEFAULT '',
            mappings      TEXT NOT NULL DEFAULT '{}'
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS groups (
            groupname TEXT PRIMARY KEY
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS groupusers (
            groupname TEXT NOT NULL,
            username  TEXT NOT NULL,
            PRIMARY KEY (groupname, username)
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS roles (
            name TEXT PRIMARY KEY
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS role_permissions (
            rolename   TEXT NOT NULL,
            bundlename TEXT NOT NULL,
            permission TEXT NOT NULL,
            PRIMARY KEY (rolename, bundlename, permission)
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS group_roles (
            groupname TEXT NOT NULL,
            rolename  TEXT NOT NULL,
            PRIMARY KEY (groupname, rolename)
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tokens (
            username    TEXT PRIMARY KEY,
            token       TEXT NOT NULL UNIQUE,
            valid_from  TIMESTAMPTZ NOT NULL,
            valid_until TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn apply_bundle_schema(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bundles (
            name                TEXT NOT NULL,
            version             TEXT NOT NULL,
            gort_bundle_version INT NOT NULL,
            author              TEXT NOT NULL DEFAULT '',
            homepage            TEXT NOT NULL DEFAULT '',
            description         TEXT NOT NULL,
            long_description    TEXT NOT NULL DEFAULT '',
            image               TEXT NOT NULL DEFAULT '',
            permissions         TEXT NOT NULL DEFAULT '[]',
            commands            TEXT NOT NULL DEFAULT '{}',
            installed_on        TIMESTAMPTZ,
            installed_by        TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (name, version)
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS enabled_bundle (
            name    TEXT PRIMARY KEY,
            version TEXT NOT NULL
        )",
    )
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn apply_request_schema(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS command_requests (
            request_id  BIGSERIAL PRIMARY KEY,
            entry       TEXT NOT NULL,
            adapter     TEXT NOT NULL DEFAULT '',
            channel_id  TEXT NOT NULL DEFAULT '',
            parameters  TEXT NOT NULL DEFAULT '[]',
            timestamp   TIMESTAMPTZ NOT NULL,
            user_id     TEXT NOT NULL DEFAULT '',
            user_email  TEXT NOT NULL DEFAULT '',
            user_name   TEXT NOT NULL DEFAULT '',
            status      TEXT NOT NULL DEFAULT 'pending',
            error       TEXT,
            exit_code   INT,
            output      TEXT,
            closed      BOOLEAN NOT NULL DEFAULT FALSE
        )",
    )
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn apply_schedule_schema(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schedules (
            schedule_id      BIGSERIAL PRIMARY KEY,
            cron             TEXT NOT NULL,
            command_original TEXT NOT NULL,
            adapter          TEXT NOT NULL DEFAULT '',
            channel_id       TEXT NOT NULL DEFAULT '',
            user_id          TEXT NOT NULL DEFAULT '',
            user_email       TEXT NOT NULL DEFAULT '',
            user_name        TEXT NOT NULL DEFAULT ''
        )",
    )
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn apply_config_schema(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS dynamic_configurations (
            bundle TEXT NOT NULL,
            layer  TEXT NOT NULL,
            owner  TEXT NOT NULL DEFAULT '',
            key    TEXT NOT NULL,
            value  TEXT NOT NULL,
            secret BOOLEAN NOT NULL DEFAULT FALSE,
            PRIMARY KEY (bundle, layer, owner, key)
        )",
    )
    .execute(&mut **tx)
    .await
    .map(|_| ())
}
