//! End-to-end lifecycle scenario through the plugin service

use vellum_core::plugins::{Manifest, NewPlugin, PluginService, PluginStatus};
use vellum_core::storage::Database;
use vellum_core::Error;

async fn service_with(manifest: Manifest) -> PluginService {
    let db = Database::in_memory()
        .await
        .expect("Failed to create in-memory database");
    PluginService::new(db.pool().clone(), manifest)
}

/// Install A and B (B depends on A by name), then walk the full
/// activate/deactivate ordering constraints.
#[tokio::test]
async fn dependency_ordering_scenario() {
    let service = service_with(Manifest { entries: vec![] }).await;

    let a = service
        .install(NewPlugin::new("a", "Plugin A"))
        .await
        .unwrap();
    let b = service
        .install(NewPlugin::new("b", "Plugin B").with_dependencies(vec!["a".to_string()]))
        .await
        .unwrap();

    // B cannot activate while a is inactive
    let err = service.activate(&b.id, None).await.unwrap_err();
    match err {
        Error::DependencyUnmet { dependency, .. } => assert_eq!(dependency, "a"),
        other => panic!("expected DependencyUnmet, got {:?}", other),
    }

    // Once A is active, B activates
    service.activate(&a.id, None).await.unwrap();
    service.activate(&b.id, None).await.unwrap();

    // A cannot deactivate while B depends on it
    let err = service.deactivate(&a.id, None).await.unwrap_err();
    match err {
        Error::DependentsActive { dependents, .. } => {
            assert_eq!(dependents, vec!["Plugin B".to_string()]);
        }
        other => panic!("expected DependentsActive, got {:?}", other),
    }

    // Deactivating B unblocks A
    service.deactivate(&b.id, None).await.unwrap();
    service.deactivate(&a.id, None).await.unwrap();

    let a = service.get_plugin(&a.id).await.unwrap().unwrap();
    assert_eq!(a.status, PluginStatus::Inactive);
}

#[tokio::test]
async fn bootstrap_then_admin_operations() {
    let service = service_with(Manifest::builtin()).await;

    assert!(service.is_bootstrap_needed().await.unwrap());
    let report = service.bootstrap_core_plugins().await;
    assert!(report.failed.is_empty());
    assert!(!service.is_bootstrap_needed().await.unwrap());

    // Core plugins are active, demo content is not
    let auth = service
        .get_plugin_by_name("core-auth")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(auth.status, PluginStatus::Active);
    let faq = service
        .get_plugin_by_name("starter-faq")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(faq.status, PluginStatus::Inactive);

    // Core plugins cannot be uninstalled, active or not
    let err = service.uninstall(&auth.id, Some("admin")).await.unwrap_err();
    assert!(matches!(err, Error::CoreProtected(_)));

    // The demo plugin can be activated and removed
    service.activate(&faq.id, Some("admin")).await.unwrap();
    service.uninstall(&faq.id, Some("admin")).await.unwrap();
    assert!(service.get_plugin(&faq.id).await.unwrap().is_none());

    // A second reconciliation pass reinstalls the manifest entry
    service.bootstrap_core_plugins().await;
    assert!(service
        .get_plugin_by_name("starter-faq")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn hook_registration_and_dispatch_order() {
    let service = service_with(Manifest { entries: vec![] }).await;

    let plugin = service
        .install(NewPlugin::new("starter-seo", "SEO"))
        .await
        .unwrap();

    service
        .register_hook(&plugin.id, "page:render", "inject_meta", Some(30))
        .await
        .unwrap();
    service
        .register_hook(&plugin.id, "page:render", "canonical_url", Some(10))
        .await
        .unwrap();
    service
        .register_hook(&plugin.id, "page:render", "sitemap_ping", Some(20))
        .await
        .unwrap();

    let order: Vec<i64> = service
        .plugin_hooks(&plugin.id)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.priority)
        .collect();
    assert_eq!(order, vec![10, 20, 30]);
}

#[tokio::test]
async fn audit_trail_records_the_whole_story() {
    let service = service_with(Manifest { entries: vec![] }).await;

    let plugin = service
        .install(NewPlugin::new("starter-forms", "Forms"))
        .await
        .unwrap();
    service.activate(&plugin.id, Some("alex")).await.unwrap();
    service
        .update_settings(&plugin.id, serde_json::json!({"captcha": true}), Some("alex"))
        .await
        .unwrap();
    service
        .set_error(&plugin.id, "webhook handler panicked", None)
        .await
        .unwrap();

    let actions: Vec<String> = service
        .recent_activity(&plugin.id, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();

    assert_eq!(
        actions,
        vec!["error", "settings_updated", "activated", "installed"]
    );

    // Error state is visible on the record and cleared by reactivation
    let errored = service.get_plugin(&plugin.id).await.unwrap().unwrap();
    assert_eq!(errored.status, PluginStatus::Error);
    assert_eq!(
        errored.error_message.as_deref(),
        Some("webhook handler panicked")
    );

    service.activate(&plugin.id, Some("alex")).await.unwrap();
    let recovered = service.get_plugin(&plugin.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, PluginStatus::Active);
    assert!(recovered.error_message.is_none());
}
