//! Backend-agnostic behavioral suite.
//!
//! Every scenario takes `&dyn DataAccess` so the same assertions run
//! against the in-memory and Postgres backends; a backend passes the
//! suite or it is not a valid implementation. Entity names are unique
//! per scenario so the suite can run against a shared database.

use std::collections::HashMap;

use chrono::Duration;
use gort_domain::{
    Bundle, BundleCommand, CommandRequest, CommandResponseEnvelope, ConfigLayer,
    DynamicConfiguration, Error, Group, ScheduledCommand, User,
};

use crate::DataAccess;

/// Run every scenario in sequence.
pub async fn run_all(da: &dyn DataAccess) {
    da.initialize().await.expect("initialize");
    da.initialize().await.expect("initialize is idempotent");

    users_round_trip(da).await;
    user_authentication(da).await;
    token_lifecycle(da).await;
    group_role_symmetry(da).await;
    permission_flattening(da).await;
    bundle_validation(da).await;
    bundle_enable_two(da).await;
    command_entry_lookup(da).await;
    request_lifecycle(da).await;
    schedule_round_trip(da).await;
    config_round_trip(da).await;
}

fn user(username: &str) -> User {
    User {
        username: username.into(),
        email: format!("{username}@example.com"),
        full_name: format!("{username} test"),
        password_hash: String::new(),
        mappings: HashMap::new(),
    }
}

fn bundle(name: &str, version: &str) -> Bundle {
    let mut commands = HashMap::new();
    commands.insert(
        "echo".to_owned(),
        BundleCommand {
            name: "echo".into(),
            description: "echo".into(),
            executable: vec!["/bin/echo".into()],
            rules: vec![format!("must have {name}:can_echo")],
            ..BundleCommand::default()
        },
    );
    Bundle {
        gort_bundle_version: 1,
        name: name.into(),
        version: version.into(),
        description: "conformance fixture".into(),
        image: "ubuntu".into(),
        permissions: vec!["can_echo".into()],
        commands,
        ..Bundle::default()
    }
}

pub async fn users_round_trip(da: &dyn DataAccess) {
    let blank = User::default();
    assert!(matches!(
        da.user_create(&blank).await,
        Err(Error::EmptyValue(_))
    ));

    let mut u = user("conf-user");
    u.password_hash = bcrypt::hash("first-password", 4).unwrap();
    da.user_create(&u).await.expect("create");
    assert!(matches!(
        da.user_create(&u).await,
        Err(Error::AlreadyExists { .. })
    ));
    assert!(da.user_exists("conf-user").await.unwrap());

    let fetched = da.user_get("conf-user").await.unwrap();
    assert_eq!(fetched.email, "conf-user@example.com");
    let by_email = da.user_get_by_email("conf-user@example.com").await.unwrap();
    assert_eq!(by_email.username, "conf-user");

    // An empty incoming hash preserves the stored one.
    let mut update = fetched.clone();
    update.full_name = "Updated Name".into();
    update.password_hash = String::new();
    da.user_update(&update).await.unwrap();
    let after = da.user_get("conf-user").await.unwrap();
    assert_eq!(after.full_name, "Updated Name");
    assert!(da
        .user_authenticate("conf-user", "first-password")
        .await
        .unwrap());

    assert!(matches!(
        da.user_delete("admin").await,
        Err(Error::AdminUndeletable)
    ));

    // Delete cascades the user's token and memberships.
    da.group_create(&Group {
        name: "conf-user-group".into(),
    })
    .await
    .unwrap();
    da.group_user_add("conf-user-group", "conf-user").await.unwrap();
    let token = da
        .token_generate("conf-user", Duration::minutes(5))
        .await
        .unwrap();
    da.user_delete("conf-user").await.unwrap();
    assert!(matches!(
        da.user_get("conf-user").await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        da.token_retrieve_by_token(&token.token).await,
        Err(Error::Unauthorized)
    ));
    assert!(da
        .group_user_list("conf-user-group")
        .await
        .unwrap()
        .is_empty());
}

pub async fn user_authentication(da: &dyn DataAccess) {
    let mut u = user("conf-auth");
    u.password_hash = bcrypt::hash("correct horse", 4).unwrap();
    da.user_create(&u).await.unwrap();

    assert!(da.user_authenticate("conf-auth", "correct horse").await.unwrap());
    assert!(!da.user_authenticate("conf-auth", "wrong").await.unwrap());
    // Non-existence is a typed error, not `false`.
    assert!(matches!(
        da.user_authenticate("conf-nobody", "x").await,
        Err(Error::NotFound { .. })
    ));
}

pub async fn token_lifecycle(da: &dyn DataAccess) {
    da.user_create(&user("conf-token")).await.unwrap();

    let first = da
        .token_generate("conf-token", Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(first.user, "conf-token");
    assert!(!first.is_expired());
    assert!(da.token_evaluate(&first.token).await.unwrap());

    // Re-issuing strictly invalidates the previous token.
    let second = da
        .token_generate("conf-token", Duration::minutes(10))
        .await
        .unwrap();
    assert_ne!(first.token, second.token);
    assert!(matches!(
        da.token_retrieve_by_token(&first.token).await,
        Err(Error::Unauthorized)
    ));
    let current = da.token_retrieve_by_user("conf-token").await.unwrap();
    assert_eq!(current.token, second.token);

    da.token_invalidate(&second.token).await.unwrap();
    assert!(!da.token_evaluate(&second.token).await.unwrap());
    assert!(da.token_retrieve_by_user("conf-token").await.is_err());

    assert!(matches!(
        da.token_generate("conf-token-missing", Duration::minutes(1)).await,
        Err(Error::NotFound { .. })
    ));
}

pub async fn group_role_symmetry(da: &dyn DataAccess) {
    da.group_create(&Group {
        name: "conf-sym-group".into(),
    })
    .await
    .unwrap();
    da.role_create("conf-sym-role-a").await.unwrap();
    da.role_create("conf-sym-role-b").await.unwrap();

    da.group_role_add("conf-sym-group", "conf-sym-role-a")
        .await
        .unwrap();
    let before: Vec<String> = da
        .group_role_list("conf-sym-group")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();

    // Adding then deleting a role leaves the list unchanged.
    da.group_role_add("conf-sym-group", "conf-sym-role-b")
        .await
        .unwrap();
    da.group_role_delete("conf-sym-group", "conf-sym-role-b")
        .await
        .unwrap();
    let after: Vec<String> = da
        .group_role_list("conf-sym-group")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(before, after);

    // Both endpoints must exist.
    assert!(da.group_role_add("conf-sym-group", "conf-no-role").await.is_err());
    assert!(da.group_role_add("conf-no-group", "conf-sym-role-a").await.is_err());
}

pub async fn permission_flattening(da: &dyn DataAccess) {
    da.user_create(&user("conf-perm")).await.unwrap();
    for group in ["conf-perm-g1", "conf-perm-g2"] {
        da.group_create(&Group { name: group.into() }).await.unwrap();
        da.group_user_add(group, "conf-perm").await.unwrap();
    }
    da.role_create("conf-perm-r1").await.unwrap();
    da.role_create("conf-perm-r2").await.unwrap();
    da.group_role_add("conf-perm-g1", "conf-perm-r1").await.unwrap();
    da.group_role_add("conf-perm-g2", "conf-perm-r2").await.unwrap();

    da.role_permission_add("conf-perm-r1", "alpha", "read").await.unwrap();
    da.role_permission_add("conf-perm-r1", "beta", "write").await.unwrap();
    // Duplicate grant through the second role must deduplicate.
    da.role_permission_add("conf-perm-r2", "alpha", "read").await.unwrap();
    da.role_permission_add("conf-perm-r2", "zeta", "admin").await.unwrap();

    let permissions = da.user_permission_list("conf-perm").await.unwrap();
    assert_eq!(
        permissions,
        vec!["alpha:read", "beta:write", "zeta:admin"],
        "flattened, deduplicated, sorted"
    );

    // Removing a disjoint permission does not perturb the others.
    da.role_permission_delete("conf-perm-r2", "zeta", "admin")
        .await
        .unwrap();
    let permissions = da.user_permission_list("conf-perm").await.unwrap();
    assert_eq!(permissions, vec!["alpha:read", "beta:write"]);
}

pub async fn bundle_validation(da: &dyn DataAccess) {
    let mut missing_version = bundle("conf-val", "");
    missing_version.version = String::new();
    assert!(matches!(
        da.bundle_create(&missing_version).await,
        Err(Error::EmptyValue(_))
    ));

    let mut zero_manifest = bundle("conf-val", "0.1.0");
    zero_manifest.gort_bundle_version = 0;
    assert!(da.bundle_create(&zero_manifest).await.is_err());

    let mut no_description = bundle("conf-val", "0.1.0");
    no_description.description = String::new();
    assert!(da.bundle_create(&no_description).await.is_err());

    // A bare image gains :latest; an explicit tag is preserved.
    da.bundle_create(&bundle("conf-val", "0.1.0")).await.unwrap();
    let stored = da.bundle_get("conf-val", "0.1.0").await.unwrap();
    assert_eq!(stored.image, "ubuntu:latest");
    assert!(matches!(
        da.bundle_create(&bundle("conf-val", "0.1.0")).await,
        Err(Error::AlreadyExists { .. })
    ));

    let mut tagged = bundle("conf-val", "0.2.0");
    tagged.image = "ubuntu:20.04".into();
    da.bundle_create(&tagged).await.unwrap();
    assert_eq!(
        da.bundle_get("conf-val", "0.2.0").await.unwrap().image,
        "ubuntu:20.04"
    );

    let mut imageless = bundle("conf-val", "0.3.0");
    imageless.image = String::new();
    da.bundle_create(&imageless).await.unwrap();
    assert_eq!(da.bundle_get("conf-val", "0.3.0").await.unwrap().image, "");
}

pub async fn bundle_enable_two(da: &dyn DataAccess) {
    da.bundle_create(&bundle("test-enable-2", "0.0.1")).await.unwrap();
    da.bundle_create(&bundle("test-enable-2", "0.0.2")).await.unwrap();
    assert_eq!(da.bundle_enabled_version("test-enable-2").await.unwrap(), "");

    da.bundle_enable("test-enable-2", "0.0.1").await.unwrap();
    assert_eq!(
        da.bundle_enabled_version("test-enable-2").await.unwrap(),
        "0.0.1"
    );

    // Enabling v2 atomically flips the flag off v1.
    da.bundle_enable("test-enable-2", "0.0.2").await.unwrap();
    assert_eq!(
        da.bundle_enabled_version("test-enable-2").await.unwrap(),
        "0.0.2"
    );
    let versions = da.bundle_versions("test-enable-2").await.unwrap();
    assert_eq!(versions.iter().filter(|b| b.enabled).count(), 1);

    // Deleting the disabled version leaves v2 enabled.
    da.bundle_delete("test-enable-2", "0.0.1").await.unwrap();
    assert_eq!(
        da.bundle_enabled_version("test-enable-2").await.unwrap(),
        "0.0.2"
    );

    // Deleting the enabled version does not re-enable anything.
    da.bundle_create(&bundle("test-enable-2", "0.0.3")).await.unwrap();
    da.bundle_delete("test-enable-2", "0.0.2").await.unwrap();
    assert_eq!(da.bundle_enabled_version("test-enable-2").await.unwrap(), "");
}

pub async fn command_entry_lookup(da: &dyn DataAccess) {
    da.bundle_create(&bundle("conf-lookup", "1.0.0")).await.unwrap();

    // Disabled bundles never resolve.
    assert!(da
        .find_command_entry("conf-lookup", "echo")
        .await
        .unwrap()
        .is_empty());

    da.bundle_enable("conf-lookup", "1.0.0").await.unwrap();
    let entries = da.find_command_entry("conf-lookup", "echo").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].bundle.name, "conf-lookup");
    assert_eq!(entries[0].command.name, "echo");
    assert!(entries[0].bundle.enabled);

    // Unqualified search covers all enabled bundles; a miss is an empty
    // vec, not an error.
    let unqualified = da.find_command_entry("", "echo").await.unwrap();
    assert!(unqualified.iter().any(|e| e.bundle.name == "conf-lookup"));
    assert!(da
        .find_command_entry("conf-lookup", "no-such-command")
        .await
        .unwrap()
        .is_empty());

    da.bundle_delete("conf-lookup", "1.0.0").await.unwrap();
}

pub async fn request_lifecycle(da: &dyn DataAccess) {
    da.bundle_create(&bundle("conf-req", "1.0.0")).await.unwrap();
    da.bundle_enable("conf-req", "1.0.0").await.unwrap();
    let entry = da
        .find_command_entry("conf-req", "echo")
        .await
        .unwrap()
        .remove(0);

    let mut request = CommandRequest {
        entry,
        adapter: "slack".into(),
        channel_id: "C123".into(),
        parameters: vec!["hello".into()],
        timestamp: chrono::Utc::now(),
        user_id: "U1".into(),
        user_email: "u1@example.com".into(),
        user_name: "u1".into(),
        ..CommandRequest::default()
    };

    da.request_begin(&mut request).await.unwrap();
    assert_ne!(request.request_id, 0, "begin assigns a fresh id");
    let first_id = request.request_id;

    // A second begin on the same struct errors.
    assert!(da.request_begin(&mut request).await.is_err());

    da.request_update(&request).await.unwrap();
    da.request_error(&request, "transient warning").await.unwrap();

    let envelope =
        CommandResponseEnvelope::with_output(request.clone(), "hello\n".into(), 0, 42);
    da.request_close(&envelope).await.unwrap();

    // Updates after close are errors.
    assert!(da.request_update(&request).await.is_err());
    assert!(da.request_close(&envelope).await.is_err());

    // Fresh requests receive new, increasing ids.
    let mut next = request.clone();
    next.request_id = 0;
    da.request_begin(&mut next).await.unwrap();
    assert!(next.request_id > first_id);

    // Closing a request that was never begun is an error.
    let mut orphan = request.clone();
    orphan.request_id = next.request_id + 10_000;
    let orphan_envelope = CommandResponseEnvelope::with_error(orphan, "nope");
    assert!(da.request_close(&orphan_envelope).await.is_err());
}

pub async fn schedule_round_trip(da: &dyn DataAccess) {
    let mut schedule = ScheduledCommand {
        cron: "@every 1m".into(),
        command: "conf-req:echo scheduled".into(),
        adapter: "slack".into(),
        channel_id: "C9".into(),
        user_id: "U1".into(),
        user_email: "u1@example.com".into(),
        user_name: "u1".into(),
        ..ScheduledCommand::default()
    };
    da.schedule_create(&mut schedule).await.unwrap();
    assert_ne!(schedule.schedule_id, 0);

    let all = da.schedules_get().await.unwrap();
    assert!(all.iter().any(|s| s.schedule_id == schedule.schedule_id));

    da.schedule_delete(schedule.schedule_id).await.unwrap();
    assert!(da.schedule_delete(schedule.schedule_id).await.is_err());
    let all = da.schedules_get().await.unwrap();
    assert!(!all.iter().any(|s| s.schedule_id == schedule.schedule_id));
}

pub async fn config_round_trip(da: &dyn DataAccess) {
    let config = DynamicConfiguration {
        layer: ConfigLayer::Bundle,
        bundle: "conf-cfg".into(),
        owner: String::new(),
        key: "API_HOST".into(),
        value: "one".into(),
        secret: false,
    };
    da.config_set(&config).await.unwrap();

    // Set is delete-then-create: the value is overwritten.
    let mut overwrite = config.clone();
    overwrite.value = "two".into();
    da.config_set(&overwrite).await.unwrap();
    let listed = da
        .config_list("bundle", "conf-cfg", "", "API_HOST")
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].value, "two");

    // Reserved prefix is rejected on write.
    let mut reserved = config.clone();
    reserved.key = "GORT_SECRET".into();
    assert!(matches!(
        da.config_set(&reserved).await,
        Err(Error::ReservedConfigKey(_))
    ));

    // Wildcards on layer, owner and key.
    let user_layer = DynamicConfiguration {
        layer: ConfigLayer::User,
        bundle: "conf-cfg".into(),
        owner: "jsmith".into(),
        key: "API_HOST".into(),
        value: "three".into(),
        secret: true,
    };
    da.config_set(&user_layer).await.unwrap();
    let all = da.config_list("*", "conf-cfg", "*", "*").await.unwrap();
    assert_eq!(all.len(), 2);

    assert!(da.config_list("*", "", "*", "*").await.is_err());

    da.config_delete("user", "conf-cfg", "jsmith", "API_HOST")
        .await
        .unwrap();
    assert!(da
        .config_delete("user", "conf-cfg", "jsmith", "API_HOST")
        .await
        .is_err());
    let remaining = da.config_list("*", "conf-cfg", "*", "*").await.unwrap();
    assert_eq!(remaining.len(), 1);
}
