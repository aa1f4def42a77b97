//! Per-invocation environment assembly.
//!
//! Dynamic configuration layers merge in the fixed order bundle → room
//! → group → user, later layers overriding earlier ones; the invoker's
//! groups contribute in sorted name order. Controller-provided `GORT_*`
//! variables are layered last — user keys can never collide with them
//! because the reserved prefix is rejected on write.

use std::collections::HashMap;

use gort_data::DataAccess;
use gort_domain::{CommandRequest, DynamicConfiguration, Result};

/// Build the environment a command workload is launched with.
pub async fn layered_environment(
    da: &dyn DataAccess,
    request: &CommandRequest,
) -> Result<HashMap<String, String>> {
    let bundle = &request.entry.bundle.name;
    let mut env = HashMap::new();

    merge(&mut env, da.config_list("bundle", bundle, "*", "*").await?);
    merge(
        &mut env,
        da.config_list("room", bundle, &request.channel_id, "*").await?,
    );
    for group in da.user_group_list(&request.user_name).await? {
        merge(
            &mut env,
            da.config_list("group", bundle, &group.name, "*").await?,
        );
    }
    merge(
        &mut env,
        da.config_list("user", bundle, &request.user_name, "*").await?,
    );

    env.insert("GORT_BUNDLE".into(), request.entry.bundle.name.clone());
    env.insert(
        "GORT_BUNDLE_VERSION".into(),
        request.entry.bundle.version.clone(),
    );
    env.insert("GORT_COMMAND".into(), request.entry.command.name.clone());
    env.insert("GORT_ADAPTER".into(), request.adapter.clone());
    env.insert("GORT_ROOM".into(), request.channel_id.clone());
    env.insert("GORT_INVOKER_USERNAME".into(), request.user_name.clone());
    env.insert("GORT_INVOKER_EMAIL".into(), request.user_email.clone());

    Ok(env)
}

/// Secret values pass through to the workload unredacted; only response
/// surfaces mask them.
fn merge(env: &mut HashMap<String, String>, configs: Vec<DynamicConfiguration>) {
    for config in configs {
        env.insert(config.key, config.value);
    }
}
