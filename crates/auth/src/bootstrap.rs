//! First-run provisioning.
//!
//! The first user created through this path is privileged: it becomes
//! (or is renamed to) `admin`, receives the admin group and role with
//! the full set of `manage_*` permissions, and the default bundle is
//! installed and enabled. Any later attempt fails with a conflict.

use gort_data::DataAccess;
use gort_domain::{
    Bundle, Error, Group, Result, User, ADMIN_GROUP, ADMIN_PERMISSIONS, ADMIN_ROLE,
    ADMIN_USERNAME, DEFAULT_BUNDLE_NAME,
};

use crate::passwords::{generate_password, hash_password};

/// Manifest of the built-in `gort` bundle, embedded at compile time.
pub const DEFAULT_BUNDLE_YAML: &str = include_str!("default_bundle.yml");

/// What bootstrap hands back to the caller. `password` is only set when
/// bootstrap had to generate one — it is the single chance to read it.
#[derive(Clone, Debug)]
pub struct BootstrappedUser {
    pub user: User,
    pub generated_password: Option<String>,
}

/// Provision the first user plus the admin group/role/permissions and
/// the default bundle.
///
/// Blank fields are filled in: the username defaults to `admin`, the
/// password to a generated 32-character secret.
pub async fn bootstrap(da: &dyn DataAccess, requested: &User, password: &str) -> Result<BootstrappedUser> {
    if !da.user_list().await?.is_empty() {
        return Err(Error::already_exists("bootstrap user", ADMIN_USERNAME));
    }

    let username = if requested.username.is_empty() {
        ADMIN_USERNAME.to_owned()
    } else {
        requested.username.clone()
    };
    let email = if requested.email.is_empty() {
        format!("{username}@localhost")
    } else {
        requested.email.clone()
    };
    let full_name = if requested.full_name.is_empty() {
        "Gort Administrator".to_owned()
    } else {
        requested.full_name.clone()
    };

    let generated_password = password.is_empty().then(generate_password);
    let effective_password = generated_password.as_deref().unwrap_or(password);

    let user = User {
        username: username.clone(),
        email,
        full_name,
        password_hash: hash_password(effective_password)?,
        mappings: requested.mappings.clone(),
    };
    da.user_create(&user).await?;

    da.group_create(&Group {
        name: ADMIN_GROUP.into(),
    })
    .await?;
    da.role_create(ADMIN_ROLE).await?;
    for permission in ADMIN_PERMISSIONS {
        da.role_permission_add(ADMIN_ROLE, DEFAULT_BUNDLE_NAME, permission)
            .await?;
    }
    da.group_user_add(ADMIN_GROUP, &username).await?;
    da.group_role_add(ADMIN_GROUP, ADMIN_ROLE).await?;

    install_default_bundle(da).await?;

    tracing::info!(user = %username, "bootstrap complete");
    Ok(BootstrappedUser {
        user,
        generated_password,
    })
}

/// Install and enable the embedded default bundle. Skips installation
/// when the version is already present (bootstrap retries after a
/// partial failure).
pub async fn install_default_bundle(da: &dyn DataAccess) -> Result<()> {
    let bundle = Bundle::from_yaml(DEFAULT_BUNDLE_YAML)?;
    match da.bundle_create(&bundle).await {
        Ok(()) | Err(Error::AlreadyExists { .. }) => {}
        Err(e) => return Err(e),
    }
    da.bundle_enable(&bundle.name, &bundle.version).await
}
