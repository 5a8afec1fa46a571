use dbnav_core::{
    ConnectionGroup, ConnectionGroupStore, JsonFileSettingsStore, NavError, TreeNode,
    TreeSessionCoordinator, GROUP_NODE_TYPE,
};
use dbnav_test_support::FakeMetadataService;
use dbnav_test_support::fixtures::{group, memory_group_store, profile, seeded_group_store};
use std::sync::Arc;
use uuid::Uuid;

fn labels(nodes: &[TreeNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.label.as_str()).collect()
}

fn coordinator_over(groups: ConnectionGroupStore) -> TreeSessionCoordinator {
    TreeSessionCoordinator::new(FakeMetadataService::new().as_service_arc(), groups)
}

#[tokio::test]
async fn first_groups_get_sequential_order() {
    let (store, _) = memory_group_store();

    store.save_group(group("g1", "Prod")).await.unwrap();
    store.save_group(group("g2", "Staging")).await.unwrap();

    let groups = store.list_groups().await.unwrap();
    let ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["g1", "g2"]);
    assert_eq!(groups[0].display_order, Some(0));
    assert_eq!(groups[1].display_order, Some(1));
}

#[tokio::test]
async fn saved_group_round_trips() {
    let (store, _) = memory_group_store();
    let prod = group("g1", "Prod")
        .with_description("production servers")
        .with_color("#FF8800")
        .with_display_order(3)
        .with_connection(profile("db1"));

    store.save_group(prod.clone()).await.unwrap();

    assert_eq!(store.get_group("g1").await.unwrap(), Some(prod));
    assert_eq!(store.get_group("missing").await.unwrap(), None);
}

#[tokio::test]
async fn ordering_survives_mixed_saves_and_deletes() {
    let (store, _) = seeded_group_store(&[
        group("a", "A").with_display_order(2),
        group("b", "B"),
        group("c", "C").with_display_order(0),
    ]);

    store.save_group(group("d", "D")).await.unwrap();
    store.delete_group("a").await.unwrap();
    store.save_group(group("e", "E").with_display_order(-1)).await.unwrap();

    let groups = store.list_groups().await.unwrap();
    let ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["e", "b", "c", "d"]);
    for pair in groups.windows(2) {
        assert!(pair[0].sort_order() <= pair[1].sort_order());
    }
}

#[tokio::test]
async fn matching_profile_replaces_member() {
    let (store, _) = memory_group_store();
    store
        .save_group(group("g1", "Prod").with_connection(profile("db1")))
        .await
        .unwrap();

    store
        .add_connection_to_group("g1", profile("db1").with_name("Primary"))
        .await
        .unwrap();

    let g1 = store.get_group("g1").await.unwrap().unwrap();
    assert_eq!(g1.connections.len(), 1);
    assert_eq!(g1.connections[0].profile_name.as_deref(), Some("Primary"));
}

#[tokio::test]
async fn groups_persist_in_settings_file() {
    let path = std::env::temp_dir().join(format!("dbnav_settings_{}.json", Uuid::new_v4()));
    let settings = Arc::new(JsonFileSettingsStore::from_path(&path));
    let store = ConnectionGroupStore::new(settings);
    store.save_group(group("g1", "Prod")).await.unwrap();

    let reopened = ConnectionGroupStore::new(Arc::new(JsonFileSettingsStore::from_path(&path)));
    let groups = reopened.list_groups().await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Prod");
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn roots_list_groups_before_ungrouped_connections() {
    let (store, _) = seeded_group_store(&[
        group("g2", "Staging").with_display_order(1),
        group("g1", "Prod")
            .with_display_order(0)
            .with_connection(profile("db1")),
    ]);
    let coordinator = coordinator_over(store);
    coordinator.add_disconnected_node(profile("db9")).await.unwrap();

    let roots = coordinator.get_children(None).await.unwrap();

    assert_eq!(labels(&roots), vec!["Prod", "Staging", "db9, master (sa)"]);
    assert_eq!(roots[0].node_type(), GROUP_NODE_TYPE);

    let prod = coordinator.get_children(Some(roots[0].id)).await.unwrap();
    assert_eq!(labels(&prod), vec!["db1, master (sa)"]);
    assert!(coordinator.get_children(Some(roots[1].id)).await.unwrap().is_empty());
}

#[tokio::test]
async fn move_connection_between_root_and_group() {
    let (store, _) = memory_group_store();
    let coordinator = coordinator_over(store);
    coordinator.save_group(group("g1", "Prod")).await.unwrap();
    let node = coordinator.add_disconnected_node(profile("db1")).await.unwrap();

    coordinator
        .move_connection_to_group(&profile("db1"), Some("g1"))
        .await
        .unwrap();

    let roots = coordinator.get_children(None).await.unwrap();
    assert_eq!(labels(&roots), vec!["Prod"]);
    let members = coordinator.get_children(Some(roots[0].id)).await.unwrap();
    assert_eq!(members[0].id, node);
    assert_eq!(coordinator.parent(node).unwrap().id, roots[0].id);

    coordinator.move_connection_to_group(&profile("db1"), None).await.unwrap();

    let roots = coordinator.get_children(None).await.unwrap();
    assert_eq!(labels(&roots), vec!["Prod", "db1, master (sa)"]);
    assert_eq!(roots[1].id, node);
    assert!(coordinator.groups().group_for_profile(&profile("db1")).await.unwrap().is_none());
}

#[tokio::test]
async fn move_to_unknown_group_fails() {
    let (store, _) = memory_group_store();
    let coordinator = coordinator_over(store);

    let result = coordinator
        .move_connection_to_group(&profile("db1"), Some("nope"))
        .await;

    assert!(matches!(result, Err(NavError::NotFound(_))));
}

#[tokio::test]
async fn deleting_group_ungroups_its_connections() {
    let (store, _) = memory_group_store();
    let coordinator = coordinator_over(store);
    coordinator
        .save_group(group("g1", "Prod").with_connection(profile("db1")))
        .await
        .unwrap();
    let roots = coordinator.get_children(None).await.unwrap();
    let member = coordinator.get_children(Some(roots[0].id)).await.unwrap()[0].id;

    coordinator.delete_group("g1").await.unwrap();

    let roots = coordinator.get_children(None).await.unwrap();
    assert_eq!(labels(&roots), vec!["db1, master (sa)"]);
    assert_eq!(roots[0].id, member);
    assert!(coordinator.node(member).unwrap().parent.is_none());
}

#[tokio::test]
async fn removing_grouped_connection_leaves_the_group() {
    let (store, _) = memory_group_store();
    let coordinator = coordinator_over(store);
    coordinator
        .save_group(
            group("g1", "Prod")
                .with_connection(profile("db1"))
                .with_connection(profile("db2")),
        )
        .await
        .unwrap();
    let roots = coordinator.get_children(None).await.unwrap();
    let members = coordinator.get_children(Some(roots[0].id)).await.unwrap();

    coordinator.remove(members[0].id).await.unwrap();

    let g1: ConnectionGroup = coordinator.groups().get_group("g1").await.unwrap().unwrap();
    assert_eq!(g1.connections, vec![profile("db2")]);
    let members = coordinator.get_children(Some(roots[0].id)).await.unwrap();
    assert_eq!(labels(&members), vec!["db2, master (sa)"]);
}

#[tokio::test]
async fn group_edits_update_existing_node() {
    let (store, _) = memory_group_store();
    let coordinator = coordinator_over(store);
    coordinator.save_group(group("g1", "Prod")).await.unwrap();
    let before = coordinator.get_children(None).await.unwrap()[0].id;

    coordinator
        .save_group(group("g1", "Production").with_color("#00AA00"))
        .await
        .unwrap();

    let roots = coordinator.get_children(None).await.unwrap();
    assert_eq!(roots[0].id, before);
    assert_eq!(roots[0].label, "Production");
}

#[tokio::test]
async fn profile_dropped_from_one_group_stays_only_in_the_other() {
    let (store, _) = memory_group_store();
    let coordinator = coordinator_over(store);
    coordinator
        .save_group(group("g2", "Dev").with_connection(profile("db1")))
        .await
        .unwrap();
    coordinator
        .save_group(group("g1", "Prod").with_connection(profile("db1")))
        .await
        .unwrap();
    assert_eq!(coordinator.root_node_connections().len(), 2);

    coordinator.save_group(group("g2", "Dev")).await.unwrap();

    let roots = coordinator.get_children(None).await.unwrap();
    assert!(roots.iter().all(TreeNode::is_group));
    assert_eq!(coordinator.root_node_connections(), vec![profile("db1")]);

    let prod = roots.iter().find(|r| r.label == "Prod").unwrap();
    let members = coordinator.get_children(Some(prod.id)).await.unwrap();
    assert_eq!(labels(&members), vec!["db1, master (sa)"]);
}

#[tokio::test]
async fn removing_connection_filed_in_two_groups_removes_both_nodes() {
    let (store, _) = memory_group_store();
    let coordinator = coordinator_over(store);
    coordinator
        .save_group(group("g1", "Prod").with_connection(profile("db1")))
        .await
        .unwrap();
    coordinator
        .save_group(group("g2", "Dev").with_connection(profile("db1")))
        .await
        .unwrap();
    let roots = coordinator.get_children(None).await.unwrap();
    let prod = roots.iter().find(|r| r.label == "Prod").unwrap().id;
    let member = coordinator.get_children(Some(prod)).await.unwrap()[0].id;

    coordinator.remove(member).await.unwrap();

    let roots = coordinator.get_children(None).await.unwrap();
    assert_eq!(roots.len(), 2);
    assert!(roots.iter().all(TreeNode::is_group));
    assert!(coordinator.root_node_connections().is_empty());
    for root in &roots {
        assert!(coordinator.get_children(Some(root.id)).await.unwrap().is_empty());
    }
}
