use dbnav_core::{NavError, NodeId, TreeNode, TreeNodeKind, TreeSessionCoordinator};
use std::io::Write;

/// Prints the subtree under `root`, expanding nodes down to `max_depth`.
///
/// Subtrees whose expansion was cancelled are printed without children.
/// Returns the number of printed nodes.
pub async fn print_tree<W: Write>(
    coordinator: &TreeSessionCoordinator,
    root: NodeId,
    max_depth: usize,
    out: &mut W,
) -> Result<usize, NavError> {
    let root = coordinator
        .node(root)
        .ok_or_else(|| NavError::not_found(root.to_string()))?;

    let mut stack = vec![(root, 0usize)];
    let mut printed = 0;

    while let Some((node, depth)) = stack.pop() {
        writeln!(out, "{}{}", "  ".repeat(depth), describe(&node))?;
        printed += 1;

        if depth >= max_depth || node.is_leaf() {
            continue;
        }

        let children = match coordinator.expand(node.id).await {
            Ok(children) => children,
            Err(NavError::Cancelled) => continue,
            Err(e) => return Err(e),
        };

        for child in children.into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }

    Ok(printed)
}

fn describe(node: &TreeNode) -> String {
    match &node.kind {
        TreeNodeKind::Error { message, .. } => format!("{} ({})", node.label, message),
        TreeNodeKind::Object { .. } => format!("{} [{}]", node.label, node.node_type()),
        TreeNodeKind::Group { .. } | TreeNodeKind::Connection { .. } => node.label.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbnav_core::{ExpandComplete, SessionCreated};
    use dbnav_test_support::FakeMetadataService;
    use dbnav_test_support::fixtures::{column, folder, memory_group_store, profile, server_root};
    use std::sync::Arc;

    #[tokio::test]
    async fn prints_expanded_levels_with_indentation() {
        let service = FakeMetadataService::new();
        let (groups, _) = memory_group_store();
        let coordinator = Arc::new(TreeSessionCoordinator::new(
            service.clone().as_service_arc(),
            groups,
        ));

        let connect = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.connect(profile("db1")).await }
        });
        let sessions = service.wait_for_session_requests(1).await;
        let session_id = sessions[0].session_id.clone();
        coordinator.on_session_created(SessionCreated::succeeded(&session_id, Some(server_root("db1"))));
        let node = connect.await.unwrap().unwrap().node;

        let print = tokio::spawn({
            let coordinator = coordinator.clone();
            async move {
                let mut out = Vec::new();
                print_tree(&coordinator, node, 2, &mut out).await.map(|n| (n, out))
            }
        });

        service.wait_for_expand_requests(1).await;
        coordinator.on_expand_complete(ExpandComplete::succeeded(
            &session_id,
            "db1",
            vec![folder("db1/Tables", "Tables"), column("db1/version", "version")],
        ));
        service.wait_for_expand_requests(2).await;
        coordinator.on_expand_complete(ExpandComplete::failed(&session_id, "db1/Tables", "denied"));

        let (printed, out) = print.await.unwrap().unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(printed, 4);
        assert_eq!(
            text,
            "db1, master (sa)\n  Tables [Folder]\n    Error loading; refresh to try again (denied)\n  version [Column]\n"
        );
    }
}
