use cloudfs_adapter::store::{LinkType, NodeLinkStore};
use cloudfs_adapter::tree::{NodeStatus, Operation};
use cloudfs_adapter::types::NodeId;
use proptest::prelude::*;
use std::collections::HashSet;

use crate::common::Harness;

#[derive(Debug, Clone)]
enum Step {
    Copy(usize, usize),
    Sync(usize),
    Touch(usize),
    Delete(usize),
    DeleteDir(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..8usize, 0..8usize).prop_map(|(s, d)| Step::Copy(s, d)),
        2 => (0..8usize).prop_map(Step::Sync),
        2 => (0..8usize).prop_map(Step::Touch),
        1 => (0..8usize).prop_map(Step::Delete),
        1 => (0..2usize).prop_map(Step::DeleteDir),
    ]
}

fn apply(h: &Harness, files: &[NodeId], dirs: &[NodeId], step: &Step) {
    match *step {
        Step::Copy(s, d) => {
            let _ = h.handler.add(files[s], files[d]);
        }
        Step::Sync(i) => {
            let _ = h.tree.lock().execute(Operation::ModifyStatus {
                id: files[i],
                insert: NodeStatus::SYNCED,
                remove: NodeStatus::DIRTY_CONTENT,
            });
        }
        Step::Touch(i) => {
            let mut tree = h.tree.lock();
            let Some(node) = tree.get(files[i]) else {
                return;
            };
            let version = node.model.content_version + 1;
            let model = node
                .model
                .clone()
                .with_content_version(version)
                .with_status_removed(NodeStatus::SYNCED)
                .with_status_added(NodeStatus::DIRTY_CONTENT);
            let _ = tree.update(files[i], model);
        }
        Step::Delete(i) => {
            let _ = h.tree.lock().delete(files[i]);
        }
        Step::DeleteDir(i) => {
            let _ = h.tree.lock().delete(dirs[i]);
        }
    }
}

fn check_invariants(h: &Harness) -> Result<(), TestCaseError> {
    let tree = h.tree.lock();
    let links = h.links.list().unwrap();

    let sources: HashSet<NodeId> = links.iter().map(|l| l.source_id).collect();
    let destinations: HashSet<NodeId> = links.iter().map(|l| l.destination_id).collect();
    prop_assert_eq!(sources.len(), links.len(), "duplicate outgoing link");
    prop_assert_eq!(destinations.len(), links.len(), "duplicate incoming link");
    prop_assert!(
        sources.is_disjoint(&destinations),
        "copy chain deeper than one link"
    );

    for link in &links {
        let source = tree.get(link.source_id);
        let destination = tree.get(link.destination_id);
        prop_assert!(source.is_some(), "dangling source {}", link.source_id);
        prop_assert!(destination.is_some(), "dangling destination {}", link.destination_id);
        prop_assert!(source.unwrap().model.status.is_copy_source());
        prop_assert!(destination.unwrap().model.status.is_copy_destination());
    }

    for node in tree.iter() {
        let status = node.model.status;
        if status.is_copy_destination() {
            prop_assert!(!status.is_synced(), "node {} is both copied-to and synced", node.id);
            let incoming = h.links.get_incoming(LinkType::Copy, node.id).unwrap();
            prop_assert!(incoming.is_some(), "node {} flagged without link", node.id);
        }
        if status.is_copy_source() {
            let outgoing = h.links.get_outgoing(LinkType::Copy, node.id).unwrap();
            prop_assert!(outgoing.is_some(), "source {} flagged without link", node.id);
        }
    }

    for id in h.dirty.ids() {
        prop_assert!(tree.contains(id), "dirty node {} missing from tree", id);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn links_stay_consistent_under_random_operations(steps in prop::collection::vec(step(), 1..40)) {
        let h = Harness::new();
        let dirs = [h.add_dir(h.top, "left"), h.add_dir(h.top, "right")];
        let files: Vec<NodeId> = (0..8)
            .map(|i| h.add_file(dirs[i % 2], &format!("f{}", i), 10, 1))
            .collect();

        for step in &steps {
            apply(&h, &files, &dirs, step);
            check_invariants(&h)?;
        }
    }
}
