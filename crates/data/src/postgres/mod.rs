//! Relational persistence backend over Postgres.
//!
//! Queries are plain `sqlx::query` with positional binds; structured
//! fields (adapter mappings, bundle commands, request entries) are
//! serialized as JSON text columns. Multi-step contracts (token
//! regeneration, enable-flag flips, user cascades) run inside a single
//! transaction.

mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gort_domain::{
    Bundle, CommandEntry, CommandRequest, CommandResponseEnvelope, DynamicConfiguration, Error,
    Group, Permission, Result, Role, ScheduledCommand, Token, User, ADMIN_USERNAME,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::OnceCell;

use crate::{generate_token_value, DataAccess};

/// The Postgres [`DataAccess`] implementation.
pub struct PostgresDataAccess {
    pool: PgPool,
    schema_init: OnceCell<()>,
}

impl PostgresDataAccess {
    /// Connect a pool to `uri`. The schema is created on the first
    /// `initialize` call, not here.
    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await
            .map_err(|e| Error::DataInit(e.to_string()))?;
        Ok(Self {
            pool,
            schema_init: OnceCell::new(),
        })
    }

    /// Wrap an existing pool (used by tests).
    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_init: OnceCell::new(),
        }
    }

    async fn require_user(&self, username: &str) -> Result<()> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        if row.is_none() {
            return Err(Error::not_found("user", username));
        }
        Ok(())
    }

    async fn require_group(&self, name: &str) -> Result<()> {
        let row = sqlx::query("SELECT 1 FROM groups WHERE groupname = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        if row.is_none() {
            return Err(Error::not_found("group", name));
        }
        Ok(())
    }

    async fn require_role(&self, name: &str) -> Result<()> {
        let row = sqlx::query("SELECT 1 FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        if row.is_none() {
            return Err(Error::not_found("role", name));
        }
        Ok(())
    }
}

// ── Row decoding ──────────────────────────────────────────────────────

fn decode_user(row: &PgRow) -> Result<User> {
    let mappings: String = row.try_get("mappings").map_err(Error::store)?;
    Ok(User {
        username: row.try_get("username").map_err(Error::store)?,
        email: row.try_get("email").map_err(Error::store)?,
        full_name: row.try_get("full_name").map_err(Error::store)?,
        password_hash: row.try_get("password_hash").map_err(Error::store)?,
        mappings: serde_json::from_str(&mappings)?,
    })
}

fn decode_bundle(row: &PgRow, enabled_version: Option<&str>) -> Result<Bundle> {
    let permissions: String = row.try_get("permissions").map_err(Error::store)?;
    let commands: String = row.try_get("commands").map_err(Error::store)?;
    let version: String = row.try_get("version").map_err(Error::store)?;
    let gort_bundle_version: i32 = row.try_get("gort_bundle_version").map_err(Error::store)?;

    let mut bundle = Bundle {
        gort_bundle_version: gort_bundle_version as u32,
        name: row.try_get("name").map_err(Error::store)?,
        enabled: enabled_version == Some(version.as_str()),
        version,
        author: row.try_get("author").map_err(Error::store)?,
        homepage: row.try_get("homepage").map_err(Error::store)?,
        description: row.try_get("description").map_err(Error::store)?,
        long_description: row.try_get("long_description").map_err(Error::store)?,
        image: row.try_get("image").map_err(Error::store)?,
        permissions: serde_json::from_str(&permissions)?,
        commands: serde_json::from_str(&commands)?,
        installed_on: row.try_get("installed_on").map_err(Error::store)?,
        installed_by: row.try_get("installed_by").map_err(Error::store)?,
    };
    for (name, command) in bundle.commands.iter_mut() {
        command.name = name.clone();
    }
    Ok(bundle)
}

fn decode_token(row: &PgRow) -> Result<Token> {
    let valid_from: DateTime<Utc> = row.try_get("valid_from").map_err(Error::store)?;
    let valid_until: DateTime<Utc> = row.try_get("valid_until").map_err(Error::store)?;
    Ok(Token {
        token: row.try_get("token").map_err(Error::store)?,
        user: row.try_get("username").map_err(Error::store)?,
        valid_from,
        valid_until,
    })
}

fn decode_schedule(row: &PgRow) -> Result<ScheduledCommand> {
    Ok(ScheduledCommand {
        schedule_id: row.try_get("schedule_id").map_err(Error::store)?,
        cron: row.try_get("cron").map_err(Error::store)?,
        command: row.try_get("command_original").map_err(Error::store)?,
        adapter: row.try_get("adapter").map_err(Error::store)?,
        channel_id: row.try_get("channel_id").map_err(Error::store)?,
        user_id: row.try_get("user_id").map_err(Error::store)?,
        user_email: row.try_get("user_email").map_err(Error::store)?,
        user_name: row.try_get("user_name").map_err(Error::store)?,
    })
}

fn decode_config(row: &PgRow) -> Result<DynamicConfiguration> {
    let layer: String = row.try_get("layer").map_err(Error::store)?;
    Ok(DynamicConfiguration {
        layer: layer.parse()?,
        bundle: row.try_get("bundle").map_err(Error::store)?,
        owner: row.try_get("owner").map_err(Error::store)?,
        key: row.try_get("key").map_err(Error::store)?,
        value: row.try_get("value").map_err(Error::store)?,
        secret: row.try_get("secret").map_err(Error::store)?,
    })
}

#[async_trait]
impl DataAccess for PostgresDataAccess {
    async fn initialize(&self) -> Result<()> {
        self.schema_init
            .get_or_try_init(|| async { schema::ensure_schema(&self.pool).await })
            .await
            .map_err(|e| Error::DataInit(e.to_string()))?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    async fn user_create(&self, user: &User) -> Result<()> {
        if user.username.is_empty() {
            return Err(Error::EmptyValue("username"));
        }
        if self.user_exists(&user.username).await? {
            return Err(Error::already_exists("user", &user.username));
        }
        if !user.email.is_empty() {
            let clash = sqlx::query("SELECT 1 FROM users WHERE email = $1")
                .bind(&user.email)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::store)?;
            if clash.is_some() {
                return Err(Error::already_exists("user email", &user.email));
            }
        }
        let mappings = serde_json::to_string(&user.mappings)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO users (username, email, full_name, password_hash, mappings)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(mappings)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn user_get(&self, username: &str) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?
            .ok_or_else(|| Error::not_found("user", username))?;
        decode_user(&row)
    }

    async fn user_get_by_email(&self, email: &str) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?
            .ok_or_else(|| Error::not_found("user", email))?;
        decode_user(&row)
    }

    async fn user_list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;
        rows.iter().map(decode_user).collect()
    }

    async fn user_update(&self, user: &User) -> Result<()> {
        let existing = self.user_get(&user.username).await?;
        let password_hash = if user.password_hash.is_empty() {
            existing.password_hash
        } else {
            user.password_hash.clone()
        };
        let mappings = serde_json::to_string(&user.mappings)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        sqlx::query(
            "UPDATE users SET email = $2, full_name = $3, password_hash = $4, mappings = $5
             WHERE username = $1",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(password_hash)
        .bind(mappings)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn user_delete(&self, username: &str) -> Result<()> {
        if username == ADMIN_USERNAME {
            return Err(Error::AdminUndeletable);
        }
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        sqlx::query("DELETE FROM tokens WHERE username = $1")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        sqlx::query("DELETE FROM groupusers WHERE username = $1")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("user", username));
        }
        tx.commit().await.map_err(Error::store)
    }

    async fn user_exists(&self, username: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(row.is_some())
    }

    async fn user_authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let user = self.user_get(username).await?;
        Ok(bcrypt::verify(password, &user.password_hash).unwrap_or(false))
    }

    async fn user_group_list(&self, username: &str) -> Result<Vec<Group>> {
        self.require_user(username).await?;
        let rows = sqlx::query(
            "SELECT groupname FROM groupusers WHERE username = $1 ORDER BY groupname",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                Ok(Group {
                    name: row.try_get("groupname").map_err(Error::store)?,
                })
            })
            .collect()
    }

    async fn user_permission_list(&self, username: &str) -> Result<Vec<String>> {
        self.require_user(username).await?;
        let rows = sqlx::query(
            "SELECT DISTINCT rp.bundlename, rp.permission
             FROM groupusers gu
             JOIN group_roles gr ON gr.groupname = gu.groupname
             JOIN role_permissions rp ON rp.rolename = gr.rolename
             WHERE gu.username = $1",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;

        let mut permissions: Vec<String> = rows
            .iter()
            .map(|row| {
                let bundle: String = row.try_get("bundlename").map_err(Error::store)?;
                let permission: String = row.try_get("permission").map_err(Error::store)?;
                Ok(format!("{bundle}:{permission}"))
            })
            .collect::<Result<_>>()?;
        permissions.sort();
        Ok(permissions)
    }

    // ── Groups ────────────────────────────────────────────────────────

    async fn group_create(&self, group: &Group) -> Result<()> {
        if group.name.is_empty() {
            return Err(Error::EmptyValue("group name"));
        }
        let result = sqlx::query(
            "INSERT INTO groups (groupname) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(&group.name)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::already_exists("group", &group.name));
        }
        Ok(())
    }

    async fn group_get(&self, name: &str) -> Result<Group> {
        self.require_group(name).await?;
        Ok(Group { name: name.into() })
    }

    async fn group_list(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query("SELECT groupname FROM groups ORDER BY groupname")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                Ok(Group {
                    name: row.try_get("groupname").map_err(Error::store)?,
                })
            })
            .collect()
    }

    async fn group_delete(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        sqlx::query("DELETE FROM groupusers WHERE groupname = $1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        sqlx::query("DELETE FROM group_roles WHERE groupname = $1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        let result = sqlx::query("DELETE FROM groups WHERE groupname = $1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("group", name));
        }
        tx.commit().await.map_err(Error::store)
    }

    async fn group_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM groups WHERE groupname = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(row.is_some())
    }

    async fn group_user_add(&self, group: &str, username: &str) -> Result<()> {
        self.require_group(group).await?;
        self.require_user(username).await?;
        sqlx::query(
            "INSERT INTO groupusers (groupname, username) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(group)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn group_user_delete(&self, group: &str, username: &str) -> Result<()> {
        self.require_group(group).await?;
        sqlx::query("DELETE FROM groupusers WHERE groupname = $1 AND username = $2")
            .bind(group)
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn group_user_list(&self, group: &str) -> Result<Vec<User>> {
        self.require_group(group).await?;
        let rows = sqlx::query(
            "SELECT u.* FROM users u
             JOIN groupusers gu ON gu.username = u.username
             WHERE gu.groupname = $1
             ORDER BY u.username",
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter().map(decode_user).collect()
    }

    async fn group_role_add(&self, group: &str, role: &str) -> Result<()> {
        self.require_group(group).await?;
        self.require_role(role).await?;
        sqlx::query(
            "INSERT INTO group_roles (groupname, rolename) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(group)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn group_role_delete(&self, group: &str, role: &str) -> Result<()> {
        self.require_group(group).await?;
        self.require_role(role).await?;
        sqlx::query("DELETE FROM group_roles WHERE groupname = $1 AND rolename = $2")
            .bind(group)
            .bind(role)
            .execute(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn group_role_list(&self, group: &str) -> Result<Vec<Role>> {
        self.require_group(group).await?;
        let rows = sqlx::query(
            "SELECT rolename FROM group_roles WHERE groupname = $1 ORDER BY rolename",
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                Ok(Role {
                    name: row.try_get("rolename").map_err(Error::store)?,
                })
            })
            .collect()
    }

    // ── Roles ─────────────────────────────────────────────────────────

    async fn role_create(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::EmptyValue("role name"));
        }
        let result = sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::already_exists("role", name));
        }
        Ok(())
    }

    async fn role_get(&self, name: &str) -> Result<Role> {
        self.require_role(name).await?;
        Ok(Role { name: name.into() })
    }

    async fn role_list(&self) -> Result<Vec<Role>> {
        let rows = sqlx::query("SELECT name FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                Ok(Role {
                    name: row.try_get("name").map_err(Error::store)?,
                })
            })
            .collect()
    }

    async fn role_delete(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        sqlx::query("DELETE FROM group_roles WHERE rolename = $1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        sqlx::query("DELETE FROM role_permissions WHERE rolename = $1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        let result = sqlx::query("DELETE FROM roles WHERE name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("role", name));
        }
        tx.commit().await.map_err(Error::store)
    }

    async fn role_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(row.is_some())
    }

    async fn role_permission_add(&self, role: &str, bundle: &str, permission: &str) -> Result<()> {
        if permission.is_empty() {
            return Err(Error::EmptyValue("permission name"));
        }
        self.require_role(role).await?;
        sqlx::query(
            "INSERT INTO role_permissions (rolename, bundlename, permission)
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(role)
        .bind(bundle)
        .bind(permission)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn role_permission_delete(
        &self,
        role: &str,
        bundle: &str,
        permission: &str,
    ) -> Result<()> {
        self.require_role(role).await?;
        sqlx::query(
            "DELETE FROM role_permissions
             WHERE rolename = $1 AND bundlename = $2 AND permission = $3",
        )
        .bind(role)
        .bind(bundle)
        .bind(permission)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn role_permission_list(&self, role: &str) -> Result<Vec<Permission>> {
        self.require_role(role).await?;
        let rows = sqlx::query(
            "SELECT bundlename, permission FROM role_permissions
             WHERE rolename = $1 ORDER BY bundlename, permission",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                let bundle: String = row.try_get("bundlename").map_err(Error::store)?;
                let permission: String = row.try_get("permission").map_err(Error::store)?;
                Ok(Permission::new(bundle, permission))
            })
            .collect()
    }

    async fn role_group_list(&self, role: &str) -> Result<Vec<Group>> {
        self.require_role(role).await?;
        let rows = sqlx::query(
            "SELECT groupname FROM group_roles WHERE rolename = $1 ORDER BY groupname",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                Ok(Group {
                    name: row.try_get("groupname").map_err(Error::store)?,
                })
            })
            .collect()
    }

    // ── Bundles ───────────────────────────────────────────────────────

    async fn bundle_create(&self, bundle: &Bundle) -> Result<()> {
        bundle.validate()?;
        let existing = sqlx::query("SELECT 1 FROM bundles WHERE name = $1 AND version = $2")
            .bind(&bundle.name)
            .bind(&bundle.version)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        if existing.is_some() {
            return Err(Error::already_exists(
                "bundle",
                format!("{} {}", bundle.name, bundle.version),
            ));
        }

        let permissions = serde_json::to_string(&bundle.permissions)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        let commands = serde_json::to_string(&bundle.commands)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO bundles (name, version, gort_bundle_version, author, homepage,
                                  description, long_description, image, permissions,
                                  commands, installed_on, installed_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&bundle.name)
        .bind(&bundle.version)
        .bind(bundle.gort_bundle_version as i32)
        .bind(&bundle.author)
        .bind(&bundle.homepage)
        .bind(&bundle.description)
        .bind(&bundle.long_description)
        .bind(bundle.normalized_image())
        .bind(permissions)
        .bind(commands)
        .bind(bundle.installed_on.unwrap_or_else(Utc::now))
        .bind(&bundle.installed_by)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn bundle_get(&self, name: &str, version: &str) -> Result<Bundle> {
        let row = sqlx::query("SELECT * FROM bundles WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?
            .ok_or_else(|| Error::not_found("bundle", format!("{name} {version}")))?;
        let enabled = self.bundle_enabled_version(name).await?;
        decode_bundle(&row, (!enabled.is_empty()).then_some(enabled.as_str()))
    }

    async fn bundle_list(&self) -> Result<Vec<Bundle>> {
        let rows = sqlx::query(
            "SELECT b.*, e.version AS enabled_version
             FROM bundles b
             LEFT JOIN enabled_bundle e ON e.name = b.name
             ORDER BY b.name, b.version",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                let enabled: Option<String> =
                    row.try_get("enabled_version").map_err(Error::store)?;
                decode_bundle(row, enabled.as_deref())
            })
            .collect()
    }

    async fn bundle_versions(&self, name: &str) -> Result<Vec<Bundle>> {
        let rows = sqlx::query(
            "SELECT b.*, e.version AS enabled_version
             FROM bundles b
             LEFT JOIN enabled_bundle e ON e.name = b.name
             WHERE b.name = $1
             ORDER BY b.version",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter()
            .map(|row| {
                let enabled: Option<String> =
                    row.try_get("enabled_version").map_err(Error::store)?;
                decode_bundle(row, enabled.as_deref())
            })
            .collect()
    }

    async fn bundle_delete(&self, name: &str, version: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        let result = sqlx::query("DELETE FROM bundles WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("bundle", format!("{name} {version}")));
        }
        // Clears the marker when the enabled version goes away; nothing
        // else is enabled in its place.
        sqlx::query("DELETE FROM enabled_bundle WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        tx.commit().await.map_err(Error::store)
    }

    async fn bundle_enable(&self, name: &str, version: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        let exists = sqlx::query("SELECT 1 FROM bundles WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::store)?;
        if exists.is_none() {
            return Err(Error::not_found("bundle", format!("{name} {version}")));
        }
        sqlx::query(
            "INSERT INTO enabled_bundle (name, version) VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET version = EXCLUDED.version",
        )
        .bind(name)
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(Error::store)?;
        tx.commit().await.map_err(Error::store)
    }

    async fn bundle_disable(&self, name: &str, version: &str) -> Result<()> {
        sqlx::query("DELETE FROM enabled_bundle WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn bundle_enabled_version(&self, name: &str) -> Result<String> {
        let row = sqlx::query("SELECT version FROM enabled_bundle WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        match row {
            Some(row) => row.try_get("version").map_err(Error::store),
            None => Ok(String::new()),
        }
    }

    async fn find_command_entry(&self, bundle: &str, command: &str) -> Result<Vec<CommandEntry>> {
        let rows = sqlx::query(
            "SELECT b.*, e.version AS enabled_version
             FROM bundles b
             JOIN enabled_bundle e ON e.name = b.name AND e.version = b.version
             WHERE ($1 = '' OR b.name = $1)",
        )
        .bind(bundle)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;

        let mut entries = Vec::new();
        for row in &rows {
            let enabled: Option<String> = row.try_get("enabled_version").map_err(Error::store)?;
            let decoded = decode_bundle(row, enabled.as_deref())?;
            if let Some(cmd) = decoded.commands.get(command) {
                entries.push(CommandEntry {
                    command: cmd.clone(),
                    bundle: decoded.clone(),
                });
            }
        }
        Ok(entries)
    }

    // ── Tokens ────────────────────────────────────────────────────────

    async fn token_generate(&self, username: &str, duration: Duration) -> Result<Token> {
        self.require_user(username).await?;
        let token = Token::new(generate_token_value(), username.into(), duration);

        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        sqlx::query("DELETE FROM tokens WHERE username = $1")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        sqlx::query(
            "INSERT INTO tokens (username, token, valid_from, valid_until)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(username)
        .bind(&token.token)
        .bind(token.valid_from)
        .bind(token.valid_until)
        .execute(&mut *tx)
        .await
        .map_err(Error::store)?;
        tx.commit().await.map_err(Error::store)?;
        Ok(token)
    }

    async fn token_retrieve_by_user(&self, username: &str) -> Result<Token> {
        let row = sqlx::query("SELECT * FROM tokens WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?
            .ok_or_else(|| Error::not_found("token for user", username))?;
        decode_token(&row)
    }

    async fn token_retrieve_by_token(&self, value: &str) -> Result<Token> {
        let row = sqlx::query("SELECT * FROM tokens WHERE token = $1")
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?
            .ok_or(Error::Unauthorized)?;
        decode_token(&row)
    }

    async fn token_invalidate(&self, value: &str) -> Result<()> {
        sqlx::query("DELETE FROM tokens WHERE token = $1")
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn token_evaluate(&self, value: &str) -> Result<bool> {
        match self.token_retrieve_by_token(value).await {
            Ok(token) => Ok(!token.is_expired()),
            Err(Error::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ── Command requests ──────────────────────────────────────────────

    async fn request_begin(&self, request: &mut CommandRequest) -> Result<()> {
        if request.request_id != 0 {
            return Err(Error::already_exists(
                "request",
                request.request_id.to_string(),
            ));
        }
        let entry = serde_json::to_string(&request.entry)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        let parameters = serde_json::to_string(&request.parameters)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO command_requests
                 (entry, adapter, channel_id, parameters, timestamp,
                  user_id, user_email, user_name, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
             RETURNING request_id",
        )
        .bind(entry)
        .bind(&request.adapter)
        .bind(&request.channel_id)
        .bind(parameters)
        .bind(request.timestamp)
        .bind(&request.user_id)
        .bind(&request.user_email)
        .bind(&request.user_name)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::store)?;
        request.request_id = row.try_get("request_id").map_err(Error::store)?;
        Ok(())
    }

    async fn request_update(&self, request: &CommandRequest) -> Result<()> {
        let entry = serde_json::to_string(&request.entry)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        let parameters = serde_json::to_string(&request.parameters)
            .map_err(|e| Error::Marshal(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE command_requests
             SET entry = $2, parameters = $3, status = 'running'
             WHERE request_id = $1 AND NOT closed",
        )
        .bind(request.request_id)
        .bind(entry)
        .bind(parameters)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(
                "request",
                request.request_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn request_error(&self, request: &CommandRequest, message: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE command_requests SET error = $2 WHERE request_id = $1",
        )
        .bind(request.request_id)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(
                "request",
                request.request_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn request_close(&self, envelope: &CommandResponseEnvelope) -> Result<()> {
        let id = envelope.request.request_id;
        let status = if envelope.response.is_error {
            "failed"
        } else {
            "succeeded"
        };
        let result = sqlx::query(
            "UPDATE command_requests
             SET status = $2, exit_code = $3, output = $4, error = $5, closed = TRUE
             WHERE request_id = $1 AND NOT closed",
        )
        .bind(id)
        .bind(status)
        .bind(envelope.data.exit_code)
        .bind(&envelope.response.out)
        .bind(envelope.data.error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::Store(format!(
                "request {id} was never begun or is already closed"
            )));
        }
        Ok(())
    }

    // ── Schedules ─────────────────────────────────────────────────────

    async fn schedule_create(&self, schedule: &mut ScheduledCommand) -> Result<()> {
        let row = sqlx::query(
            "INSERT INTO schedules
                 (cron, command_original, adapter, channel_id, user_id, user_email, user_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING schedule_id",
        )
        .bind(&schedule.cron)
        .bind(&schedule.command)
        .bind(&schedule.adapter)
        .bind(&schedule.channel_id)
        .bind(&schedule.user_id)
        .bind(&schedule.user_email)
        .bind(&schedule.user_name)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::store)?;
        schedule.schedule_id = row.try_get("schedule_id").map_err(Error::store)?;
        Ok(())
    }

    async fn schedule_delete(&self, schedule_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await
            .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("schedule", schedule_id.to_string()));
        }
        Ok(())
    }

    async fn schedules_get(&self) -> Result<Vec<ScheduledCommand>> {
        let rows = sqlx::query("SELECT * FROM schedules ORDER BY schedule_id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;
        rows.iter().map(decode_schedule).collect()
    }

    // ── Dynamic configurations ────────────────────────────────────────

    async fn config_set(&self, config: &DynamicConfiguration) -> Result<()> {
        config.validate()?;
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        sqlx::query(
            "DELETE FROM dynamic_configurations
             WHERE bundle = $1 AND layer = $2 AND owner = $3 AND key = $4",
        )
        .bind(&config.bundle)
        .bind(config.layer.as_str())
        .bind(&config.owner)
        .bind(&config.key)
        .execute(&mut *tx)
        .await
        .map_err(Error::store)?;
        sqlx::query(
            "INSERT INTO dynamic_configurations (bundle, layer, owner, key, value, secret)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&config.bundle)
        .bind(config.layer.as_str())
        .bind(&config.owner)
        .bind(&config.key)
        .bind(&config.value)
        .bind(config.secret)
        .execute(&mut *tx)
        .await
        .map_err(Error::store)?;
        tx.commit().await.map_err(Error::store)
    }

    async fn config_delete(&self, layer: &str, bundle: &str, owner: &str, key: &str) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM dynamic_configurations
             WHERE bundle = $1 AND layer = $2 AND owner = $3 AND key = $4",
        )
        .bind(bundle)
        .bind(layer)
        .bind(owner)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(
                "config",
                format!("{bundle}/{layer}/{owner}/{key}"),
            ));
        }
        Ok(())
    }

    async fn config_list(
        &self,
        layer: &str,
        bundle: &str,
        owner: &str,
        key: &str,
    ) -> Result<Vec<DynamicConfiguration>> {
        if bundle.is_empty() {
            return Err(Error::EmptyValue("config bundle"));
        }
        let rows = sqlx::query(
            "SELECT * FROM dynamic_configurations
             WHERE ($1 = '*' OR bundle = $1)
               AND ($2 = '*' OR layer = $2)
               AND ($3 = '*' OR owner = $3)
               AND ($4 = '*' OR key = $4)
             ORDER BY bundle, layer, owner, key",
        )
        .bind(bundle)
        .bind(layer)
        .bind(owner)
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter().map(decode_config).collect()
    }
}
