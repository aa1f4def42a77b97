use std::collections::HashMap;

use chrono::Duration;
use gort_auth::{authorize_command, bootstrap, hash_password};
use gort_command::{InferOptions, ParsedCommand};
use gort_data::{DataAccess, MemoryDataAccess};
use gort_domain::{
    Bundle, BundleCommand, Error, Group, User, ADMIN_GROUP, ADMIN_PERMISSIONS, ADMIN_ROLE,
    DEFAULT_BUNDLE_NAME,
};

fn blank_user() -> User {
    User::default()
}

#[tokio::test]
async fn bootstrap_provisions_admin_and_default_bundle() {
    let da = MemoryDataAccess::new();

    let result = bootstrap(&da, &blank_user(), "").await.unwrap();
    assert_eq!(result.user.username, "admin");
    let password = result.generated_password.expect("generated password");
    assert_eq!(password.len(), 32);
    assert!(da.user_authenticate("admin", &password).await.unwrap());

    // Admin group and role exist and are linked.
    da.group_get(ADMIN_GROUP).await.unwrap();
    da.role_get(ADMIN_ROLE).await.unwrap();
    let roles = da.group_role_list(ADMIN_GROUP).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, ADMIN_ROLE);

    // The admin role carries the five manage_* permissions.
    let permissions = da.user_permission_list("admin").await.unwrap();
    let expected: Vec<String> = ADMIN_PERMISSIONS
        .iter()
        .map(|p| format!("{DEFAULT_BUNDLE_NAME}:{p}"))
        .collect();
    assert_eq!(permissions, expected);

    // The default bundle is installed and enabled.
    let enabled = da
        .bundle_enabled_version(DEFAULT_BUNDLE_NAME)
        .await
        .unwrap();
    assert!(!enabled.is_empty());
    assert!(!da
        .find_command_entry(DEFAULT_BUNDLE_NAME, "whoami")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn second_bootstrap_conflicts() {
    let da = MemoryDataAccess::new();
    bootstrap(&da, &blank_user(), "").await.unwrap();
    assert!(matches!(
        bootstrap(&da, &blank_user(), "").await,
        Err(Error::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn bootstrap_honors_provided_identity() {
    let da = MemoryDataAccess::new();
    let requested = User {
        username: "root".into(),
        email: "root@example.com".into(),
        full_name: "Root".into(),
        mappings: HashMap::new(),
        password_hash: String::new(),
    };
    let result = bootstrap(&da, &requested, "hunter2hunter2").await.unwrap();
    assert_eq!(result.user.username, "root");
    assert!(result.generated_password.is_none());
    assert!(da.user_authenticate("root", "hunter2hunter2").await.unwrap());
    // The chosen name is still placed in the admin group.
    let members = da.group_user_list(ADMIN_GROUP).await.unwrap();
    assert_eq!(members[0].username, "root");
}

#[tokio::test]
async fn token_expiry_follows_duration() {
    let da = MemoryDataAccess::new();
    bootstrap(&da, &blank_user(), "").await.unwrap();

    let token = da
        .token_generate("admin", Duration::seconds(1))
        .await
        .unwrap();
    assert!(!token.is_expired());
    assert!(da.token_evaluate(&token.token).await.unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
    let token = da.token_retrieve_by_user("admin").await.unwrap();
    assert!(token.is_expired());
    assert!(!da.token_evaluate(&token.token).await.unwrap());
}

/// The guarded-deploy scenario, end to end through the engine.
#[tokio::test]
async fn guarded_deploy_rule_evaluation() {
    let da = MemoryDataAccess::new();

    let mut jsmith = User {
        username: "jsmith".into(),
        email: "jsmith@example.com".into(),
        ..User::default()
    };
    jsmith.password_hash = hash_password("password123!").unwrap();
    da.user_create(&jsmith).await.unwrap();
    da.group_create(&Group {
        name: "deployers".into(),
    })
    .await
    .unwrap();
    da.group_user_add("deployers", "jsmith").await.unwrap();
    da.role_create("deployer").await.unwrap();
    da.group_role_add("deployers", "deployer").await.unwrap();

    let mut commands = HashMap::new();
    commands.insert(
        "deploy".to_owned(),
        BundleCommand {
            name: "deploy".into(),
            description: "deploy a service".into(),
            executable: vec!["/usr/local/bin/deploy".into()],
            rules: vec![
                "with arg[0] == \"production\" must have deploy:production_deploy".into(),
            ],
            ..BundleCommand::default()
        },
    );
    let bundle = Bundle {
        gort_bundle_version: 1,
        name: "deploy".into(),
        version: "1.0.0".into(),
        description: "deployment commands".into(),
        image: "deploy-tools".into(),
        permissions: vec!["production_deploy".into()],
        commands,
        ..Bundle::default()
    };
    da.bundle_create(&bundle).await.unwrap();
    da.bundle_enable("deploy", "1.0.0").await.unwrap();

    let entry = da
        .find_command_entry("deploy", "deploy")
        .await
        .unwrap()
        .remove(0);

    let production = ParsedCommand::from_input("deploy production", InferOptions::default())
        .unwrap()
        .parameters;
    let staging = ParsedCommand::from_input("deploy staging", InferOptions::default())
        .unwrap()
        .parameters;

    // Without the permission: production denied, staging allowed.
    assert!(matches!(
        authorize_command(&da, "jsmith", &entry, &production).await,
        Err(Error::PermissionDenied)
    ));
    authorize_command(&da, "jsmith", &entry, &staging)
        .await
        .unwrap();

    // Grant the permission: production is now allowed.
    da.role_permission_add("deployer", "deploy", "production_deploy")
        .await
        .unwrap();
    authorize_command(&da, "jsmith", &entry, &production)
        .await
        .unwrap();
}

/// Commands with no rules at all deny by default.
#[tokio::test]
async fn ruleless_command_denies_by_default() {
    let da = MemoryDataAccess::new();
    bootstrap(&da, &blank_user(), "").await.unwrap();

    let mut commands = HashMap::new();
    commands.insert(
        "run".to_owned(),
        BundleCommand {
            name: "run".into(),
            description: "no rules".into(),
            executable: vec!["/bin/true".into()],
            ..BundleCommand::default()
        },
    );
    let bundle = Bundle {
        gort_bundle_version: 1,
        name: "bare".into(),
        version: "0.1.0".into(),
        description: "fixture".into(),
        commands,
        ..Bundle::default()
    };
    da.bundle_create(&bundle).await.unwrap();
    da.bundle_enable("bare", "0.1.0").await.unwrap();
    let entry = da.find_command_entry("bare", "run").await.unwrap().remove(0);

    // Even the fully-privileged admin is denied.
    assert!(matches!(
        authorize_command(&da, "admin", &entry, &[]).await,
        Err(Error::PermissionDenied)
    ));
}
