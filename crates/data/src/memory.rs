//! Process-local persistence backend.
//!
//! Everything lives in a handful of flat maps and linking sets behind a
//! single `RwLock`; group/role/user relationships are traversed with
//! plain set operations. State is lost on restart, which is exactly
//! what tests and single-node evaluation want.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Duration;
use gort_domain::{
    Bundle, CommandEntry, CommandRequest, CommandResponseEnvelope, DynamicConfiguration, Error,
    Group, Permission, Result, Role, ScheduledCommand, Token, User, ADMIN_USERNAME,
};
use tokio::sync::RwLock;

use crate::{generate_token_value, DataAccess};

/// A command request row plus its lifecycle bookkeeping.
#[derive(Clone, Debug)]
struct RequestRow {
    request: CommandRequest,
    error: Option<String>,
    envelope: Option<CommandResponseEnvelope>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    groups: HashSet<String>,
    roles: BTreeSet<String>,
    /// (group, username)
    group_users: HashSet<(String, String)>,
    /// (group, role)
    group_roles: HashSet<(String, String)>,
    /// (role, bundle, permission)
    role_permissions: HashSet<(String, String, String)>,
    /// (name, version) → bundle
    bundles: HashMap<(String, String), Bundle>,
    /// bundle name → enabled version
    enabled: HashMap<String, String>,
    tokens_by_value: HashMap<String, Token>,
    /// username → token value
    tokens_by_user: HashMap<String, String>,
    requests: HashMap<i64, RequestRow>,
    next_request_id: i64,
    schedules: HashMap<i64, ScheduledCommand>,
    next_schedule_id: i64,
    /// (layer, bundle, owner, key) → config
    configs: HashMap<(String, String, String, String), DynamicConfiguration>,
}

/// The in-memory [`DataAccess`] implementation.
pub struct MemoryDataAccess {
    tables: RwLock<Tables>,
}

impl MemoryDataAccess {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryDataAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl Tables {
    fn user(&self, username: &str) -> Result<&User> {
        self.users
            .get(username)
            .ok_or_else(|| Error::not_found("user", username))
    }

    fn require_group(&self, name: &str) -> Result<()> {
        if self.groups.contains(name) {
            Ok(())
        } else {
            Err(Error::not_found("group", name))
        }
    }

    fn require_role(&self, name: &str) -> Result<()> {
        if self.roles.contains(name) {
            Ok(())
        } else {
            Err(Error::not_found("role", name))
        }
    }

    /// Flattened `bundle:permission` strings for a user, sorted.
    fn permission_strings(&self, username: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        for (group, member) in &self.group_users {
            if member != username {
                continue;
            }
            for (g, role) in &self.group_roles {
                if g != group {
                    continue;
                }
                for (r, bundle, permission) in &self.role_permissions {
                    if r == role {
                        out.insert(format!("{bundle}:{permission}"));
                    }
                }
            }
        }
        out.into_iter().collect()
    }
}

#[async_trait]
impl DataAccess for MemoryDataAccess {
    async fn initialize(&self) -> Result<()> {
        // Nothing to create; repeat calls are fine.
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    async fn user_create(&self, user: &User) -> Result<()> {
        if user.username.is_empty() {
            return Err(Error::EmptyValue("username"));
        }
        let mut t = self.tables.write().await;
        if t.users.contains_key(&user.username) {
            return Err(Error::already_exists("user", &user.username));
        }
        if !user.email.is_empty() && t.users.values().any(|u| u.email == user.email) {
            return Err(Error::already_exists("user email", &user.email));
        }
        t.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn user_get(&self, username: &str) -> Result<User> {
        let t = self.tables.read().await;
        t.user(username).cloned()
    }

    async fn user_get_by_email(&self, email: &str) -> Result<User> {
        let t = self.tables.read().await;
        t.users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| Error::not_found("user", email))
    }

    async fn user_list(&self) -> Result<Vec<User>> {
        let t = self.tables.read().await;
        let mut users: Vec<User> = t.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn user_update(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write().await;
        let existing = t
            .users
            .get_mut(&user.username)
            .ok_or_else(|| Error::not_found("user", &user.username))?;
        let mut updated = user.clone();
        if updated.password_hash.is_empty() {
            updated.password_hash = existing.password_hash.clone();
        }
        *existing = updated;
        Ok(())
    }

    async fn user_delete(&self, username: &str) -> Result<()> {
        if username == ADMIN_USERNAME {
            return Err(Error::AdminUndeletable);
        }
        let mut t = self.tables.write().await;
        if t.users.remove(username).is_none() {
            return Err(Error::not_found("user", username));
        }
        if let Some(value) = t.tokens_by_user.remove(username) {
            t.tokens_by_value.remove(&value);
        }
        t.group_users.retain(|(_, member)| member != username);
        Ok(())
    }

    async fn user_exists(&self, username: &str) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.users.contains_key(username))
    }

    async fn user_authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let t = self.tables.read().await;
        let user = t.user(username)?;
        Ok(bcrypt::verify(password, &user.password_hash).unwrap_or(false))
    }

    async fn user_group_list(&self, username: &str) -> Result<Vec<Group>> {
        let t = self.tables.read().await;
        t.user(username)?;
        let mut names: Vec<&String> = t
            .group_users
            .iter()
            .filter(|(_, member)| member == username)
            .map(|(group, _)| group)
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| Group { name: name.clone() })
            .collect())
    }

    async fn user_permission_list(&self, username: &str) -> Result<Vec<String>> {
        let t = self.tables.read().await;
        t.user(username)?;
        Ok(t.permission_strings(username))
    }

    // ── Groups ────────────────────────────────────────────────────────

    async fn group_create(&self, group: &Group) -> Result<()> {
        if group.name.is_empty() {
            return Err(Error::EmptyValue("group name"));
        }
        let mut t = self.tables.write().await;
        if !t.groups.insert(group.name.clone()) {
            return Err(Error::already_exists("group", &group.name));
        }
        Ok(())
    }

    async fn group_get(&self, name: &str) -> Result<Group> {
        let t = self.tables.read().await;
        t.require_group(name)?;
        Ok(Group { name: name.into() })
    }

    async fn group_list(&self) -> Result<Vec<Group>> {
        let t = self.tables.read().await;
        let mut names: Vec<&String> = t.groups.iter().collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| Group { name: name.clone() })
            .collect())
    }

    async fn group_delete(&self, name: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.groups.remove(name) {
            return Err(Error::not_found("group", name));
        }
        t.group_users.retain(|(group, _)| group != name);
        t.group_roles.retain(|(group, _)| group != name);
        Ok(())
    }

    async fn group_exists(&self, name: &str) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.groups.contains(name))
    }

    async fn group_user_add(&self, group: &str, username: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        t.require_group(group)?;
        t.user(username)?;
        t.group_users.insert((group.into(), username.into()));
        Ok(())
    }

    async fn group_user_delete(&self, group: &str, username: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        t.require_group(group)?;
        t.group_users.remove(&(group.into(), username.into()));
        Ok(())
    }

    async fn group_user_list(&self, group: &str) -> Result<Vec<User>> {
        let t = self.tables.read().await;
        t.require_group(group)?;
        let mut users: Vec<User> = t
            .group_users
            .iter()
            .filter(|(g, _)| g == group)
            .filter_map(|(_, member)| t.users.get(member).cloned())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn group_role_add(&self, group: &str, role: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        t.require_group(group)?;
        t.require_role(role)?;
        t.group_roles.insert((group.into(), role.into()));
        Ok(())
    }

    async fn group_role_delete(&self, group: &str, role: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        t.require_group(group)?;
        t.require_role(role)?;
        t.group_roles.remove(&(group.into(), role.into()));
        Ok(())
    }

    async fn group_role_list(&self, group: &str) -> Result<Vec<Role>> {
        let t = self.tables.read().await;
        t.require_group(group)?;
        let mut names: Vec<&String> = t
            .group_roles
            .iter()
            .filter(|(g, _)| g == group)
            .map(|(_, role)| role)
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| Role { name: name.clone() })
            .collect())
    }

    // ── Roles ─────────────────────────────────────────────────────────

    async fn role_create(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::EmptyValue("role name"));
        }
        let mut t = self.tables.write().await;
        if !t.roles.insert(name.into()) {
            return Err(Error::already_exists("role", name));
        }
        Ok(())
    }

    async fn role_get(&self, name: &str) -> Result<Role> {
        let t = self.tables.read().await;
        t.require_role(name)?;
        Ok(Role { name: name.into() })
    }

    async fn role_list(&self) -> Result<Vec<Role>> {
        let t = self.tables.read().await;
        Ok(t.roles
            .iter()
            .map(|name| Role { name: name.clone() })
            .collect())
    }

    async fn role_delete(&self, name: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.roles.remove(name) {
            return Err(Error::not_found("role", name));
        }
        t.group_roles.retain(|(_, role)| role != name);
        t.role_permissions.retain(|(role, _, _)| role != name);
        Ok(())
    }

    async fn role_exists(&self, name: &str) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.roles.contains(name))
    }

    async fn role_permission_add(&self, role: &str, bundle: &str, permission: &str) -> Result<()> {
        if permission.is_empty() {
            return Err(Error::EmptyValue("permission name"));
        }
        let mut t = self.tables.write().await;
        t.require_role(role)?;
        t.role_permissions
            .insert((role.into(), bundle.into(), permission.into()));
        Ok(())
    }

    async fn role_permission_delete(
        &self,
        role: &str,
        bundle: &str,
        permission: &str,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        t.require_role(role)?;
        t.role_permissions
            .remove(&(role.into(), bundle.into(), permission.into()));
        Ok(())
    }

    async fn role_permission_list(&self, role: &str) -> Result<Vec<Permission>> {
        let t = self.tables.read().await;
        t.require_role(role)?;
        let mut permissions: Vec<Permission> = t
            .role_permissions
            .iter()
            .filter(|(r, _, _)| r == role)
            .map(|(_, bundle, permission)| Permission::new(bundle, permission))
            .collect();
        permissions.sort();
        Ok(permissions)
    }

    async fn role_group_list(&self, role: &str) -> Result<Vec<Group>> {
        let t = self.tables.read().await;
        t.require_role(role)?;
        let mut names: Vec<&String> = t
            .group_roles
            .iter()
            .filter(|(_, r)| r == role)
            .map(|(group, _)| group)
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| Group { name: name.clone() })
            .collect())
    }

    // ── Bundles ───────────────────────────────────────────────────────

    async fn bundle_create(&self, bundle: &Bundle) -> Result<()> {
        bundle.validate()?;
        let mut t = self.tables.write().await;
        let key = (bundle.name.clone(), bundle.version.clone());
        if t.bundles.contains_key(&key) {
            return Err(Error::already_exists(
                "bundle",
                format!("{} {}", bundle.name, bundle.version),
            ));
        }
        let mut stored = bundle.clone();
        stored.image = stored.normalized_image();
        stored.enabled = false;
        t.bundles.insert(key, stored);
        Ok(())
    }

    async fn bundle_get(&self, name: &str, version: &str) -> Result<Bundle> {
        let t = self.tables.read().await;
        let mut bundle = t
            .bundles
            .get(&(name.into(), version.into()))
            .cloned()
            .ok_or_else(|| Error::not_found("bundle", format!("{name} {version}")))?;
        bundle.enabled = t.enabled.get(name).map(String::as_str) == Some(version);
        Ok(bundle)
    }

    async fn bundle_list(&self) -> Result<Vec<Bundle>> {
        let t = self.tables.read().await;
        let mut bundles: Vec<Bundle> = t
            .bundles
            .values()
            .map(|b| {
                let mut b = b.clone();
                b.enabled = t.enabled.get(&b.name).map(String::as_str) == Some(b.version.as_str());
                b
            })
            .collect();
        bundles.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        Ok(bundles)
    }

    async fn bundle_versions(&self, name: &str) -> Result<Vec<Bundle>> {
        let all = self.bundle_list().await?;
        Ok(all.into_iter().filter(|b| b.name == name).collect())
    }

    async fn bundle_delete(&self, name: &str, version: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.bundles.remove(&(name.into(), version.into())).is_none() {
            return Err(Error::not_found("bundle", format!("{name} {version}")));
        }
        // Deleting the enabled version clears the marker; no other
        // version is implicitly enabled in its place.
        if t.enabled.get(name).map(String::as_str) == Some(version) {
            t.enabled.remove(name);
        }
        Ok(())
    }

    async fn bundle_enable(&self, name: &str, version: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.bundles.contains_key(&(name.into(), version.into())) {
            return Err(Error::not_found("bundle", format!("{name} {version}")));
        }
        t.enabled.insert(name.into(), version.into());
        Ok(())
    }

    async fn bundle_disable(&self, name: &str, version: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.enabled.get(name).map(String::as_str) == Some(version) {
            t.enabled.remove(name);
        }
        Ok(())
    }

    async fn bundle_enabled_version(&self, name: &str) -> Result<String> {
        let t = self.tables.read().await;
        Ok(t.enabled.get(name).cloned().unwrap_or_default())
    }

    async fn find_command_entry(&self, bundle: &str, command: &str) -> Result<Vec<CommandEntry>> {
        let t = self.tables.read().await;
        let mut entries = Vec::new();
        for (name, version) in &t.enabled {
            if !bundle.is_empty() && bundle != name {
                continue;
            }
            let Some(b) = t.bundles.get(&(name.clone(), version.clone())) else {
                continue;
            };
            if let Some(cmd) = b.commands.get(command) {
                let mut b = b.clone();
                b.enabled = true;
                entries.push(CommandEntry {
                    bundle: b,
                    command: cmd.clone(),
                });
            }
        }
        Ok(entries)
    }

    // ── Tokens ────────────────────────────────────────────────────────

    async fn token_generate(&self, username: &str, duration: Duration) -> Result<Token> {
        let mut t = self.tables.write().await;
        t.user(username)?;
        if let Some(old) = t.tokens_by_user.remove(username) {
            t.tokens_by_value.remove(&old);
        }
        let token = Token::new(generate_token_value(), username.into(), duration);
        t.tokens_by_user
            .insert(username.into(), token.token.clone());
        t.tokens_by_value.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn token_retrieve_by_user(&self, username: &str) -> Result<Token> {
        let t = self.tables.read().await;
        t.tokens_by_user
            .get(username)
            .and_then(|value| t.tokens_by_value.get(value))
            .cloned()
            .ok_or_else(|| Error::not_found("token for user", username))
    }

    async fn token_retrieve_by_token(&self, value: &str) -> Result<Token> {
        let t = self.tables.read().await;
        t.tokens_by_value
            .get(value)
            .cloned()
            .ok_or(Error::Unauthorized)
    }

    async fn token_invalidate(&self, value: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(token) = t.tokens_by_value.remove(value) {
            t.tokens_by_user.remove(&token.user);
        }
        Ok(())
    }

    async fn token_evaluate(&self, value: &str) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.tokens_by_value
            .get(value)
            .map(|token| !token.is_expired())
            .unwrap_or(false))
    }

    // ── Command requests ──────────────────────────────────────────────

    async fn request_begin(&self, request: &mut CommandRequest) -> Result<()> {
        if request.request_id != 0 {
            return Err(Error::already_exists(
                "request",
                request.request_id.to_string(),
            ));
        }
        let mut t = self.tables.write().await;
        t.next_request_id += 1;
        request.request_id = t.next_request_id;
        t.requests.insert(
            request.request_id,
            RequestRow {
                request: request.clone(),
                error: None,
                envelope: None,
            },
        );
        Ok(())
    }

    async fn request_update(&self, request: &CommandRequest) -> Result<()> {
        let mut t = self.tables.write().await;
        let row = t
            .requests
            .get_mut(&request.request_id)
            .ok_or_else(|| Error::not_found("request", request.request_id.to_string()))?;
        if row.envelope.is_some() {
            return Err(Error::Store(format!(
                "request {} is already closed",
                request.request_id
            )));
        }
        row.request = request.clone();
        Ok(())
    }

    async fn request_error(&self, request: &CommandRequest, message: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        let row = t
            .requests
            .get_mut(&request.request_id)
            .ok_or_else(|| Error::not_found("request", request.request_id.to_string()))?;
        row.error = Some(message.into());
        Ok(())
    }

    async fn request_close(&self, envelope: &CommandResponseEnvelope) -> Result<()> {
        let id = envelope.request.request_id;
        let mut t = self.tables.write().await;
        let row = t
            .requests
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("request", id.to_string()))?;
        if row.envelope.is_some() {
            return Err(Error::Store(format!("request {id} is already closed")));
        }
        row.request = envelope.request.clone();
        row.envelope = Some(envelope.clone());
        Ok(())
    }

    // ── Schedules ─────────────────────────────────────────────────────

    async fn schedule_create(&self, schedule: &mut ScheduledCommand) -> Result<()> {
        let mut t = self.tables.write().await;
        t.next_schedule_id += 1;
        schedule.schedule_id = t.next_schedule_id;
        t.schedules.insert(schedule.schedule_id, schedule.clone());
        Ok(())
    }

    async fn schedule_delete(&self, schedule_id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        t.schedules
            .remove(&schedule_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("schedule", schedule_id.to_string()))
    }

    async fn schedules_get(&self) -> Result<Vec<ScheduledCommand>> {
        let t = self.tables.read().await;
        let mut schedules: Vec<ScheduledCommand> = t.schedules.values().cloned().collect();
        schedules.sort_by_key(|s| s.schedule_id);
        Ok(schedules)
    }

    // ── Dynamic configurations ────────────────────────────────────────

    async fn config_set(&self, config: &DynamicConfiguration) -> Result<()> {
        config.validate()?;
        let key = (
            config.layer.as_str().to_owned(),
            config.bundle.clone(),
            config.owner.clone(),
            config.key.clone(),
        );
        let mut t = self.tables.write().await;
        t.configs.remove(&key);
        t.configs.insert(key, config.clone());
        Ok(())
    }

    async fn config_delete(&self, layer: &str, bundle: &str, owner: &str, key: &str) -> Result<()> {
        let full = (layer.to_owned(), bundle.to_owned(), owner.to_owned(), key.to_owned());
        let mut t = self.tables.write().await;
        t.configs
            .remove(&full)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("config", format!("{bundle}/{layer}/{owner}/{key}")))
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
        let matches = |pattern: &str, value: &str| pattern == "*" || pattern == value;
        let t = self.tables.read().await;
        let mut out: Vec<DynamicConfiguration> = t
            .configs
            .iter()
            .filter(|((l, b, o, k), _)| {
                matches(layer, l) && matches(bundle, b) && matches(owner, o) && matches(key, k)
            })
            .map(|(_, config)| config.clone())
            .collect();
        out.sort_by(|a, b| {
            (&a.bundle, a.layer, &a.owner, &a.key).cmp(&(&b.bundle, b.layer, &b.owner, &b.key))
        });
        Ok(out)
    }
}
