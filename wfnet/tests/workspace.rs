use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wfnet::{
    net::{CheckState, Marking, Net, NetChange, Position},
    DiagnosticKind, NetId, PetriError, ValidationReport, Workspace, WorkspaceConfig,
    WorkspaceEvent,
};

const WAIT: Duration = Duration::from_secs(5);

/// start ──► t1 ──► end
fn sequence_net() -> Net {
    let mut net = Net::new();
    net.add_place("start", "Start", Marking::Marked, Position::new(0, 0)).unwrap();
    net.add_transition("t1", "Work", Position::new(50, 0)).unwrap();
    net.add_place("end", "End", Marking::Empty, Position::new(100, 0)).unwrap();
    net.add_arc("a1", "start", "t1").unwrap();
    net.add_arc("a2", "t1", "end").unwrap();
    net
}

async fn next_report(
    rx: &mut broadcast::Receiver<WorkspaceEvent>,
    net_id: NetId,
    valid: bool,
) -> std::sync::Arc<ValidationReport> {
    timeout(WAIT, async {
        loop {
            match rx.recv().await.unwrap() {
                WorkspaceEvent::Validated(id, report) if id == net_id && report.is_valid() == valid => {
                    return report
                }
                _ => continue,
            }
        }
    })
    .await
    .expect("no matching validation result")
}

#[tokio::test]
async fn opened_net_is_validated() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(sequence_net()).await.unwrap();

    let report = next_report(&mut rx, net_id, true).await;
    assert_eq!(report.start.as_ref().map(|id| id.as_str()), Some("start"));
    assert_eq!(report.end.as_ref().map(|id| id.as_str()), Some("end"));
    assert_eq!(report.firings, 1);
    assert_eq!(workspace.state(net_id).await.unwrap(), CheckState::Valid);
    workspace.shutdown().await;
}

#[tokio::test]
async fn structural_edit_triggers_revalidation() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(sequence_net()).await.unwrap();

    workspace
        .edit(net_id, |net| net.add_place("orphan", "", Marking::Empty, Position::default()))
        .await
        .unwrap();
    let report = next_report(&mut rx, net_id, false).await;
    assert!(!report.diagnostics.is_empty());
    assert_eq!(workspace.state(net_id).await.unwrap(), CheckState::Invalid);

    workspace.edit(net_id, |net| net.remove_element("orphan")).await.unwrap();
    next_report(&mut rx, net_id, true).await;
    assert_eq!(workspace.state(net_id).await.unwrap(), CheckState::Valid);
    workspace.shutdown().await;
}

#[tokio::test]
async fn attribute_edit_keeps_validation_result() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(sequence_net()).await.unwrap();
    next_report(&mut rx, net_id, true).await;

    workspace.edit(net_id, |net| net.rename("t1", "Review")).await.unwrap();
    workspace.edit(net_id, |net| net.move_node("t1", Position::new(60, 10))).await.unwrap();
    assert_eq!(workspace.state(net_id).await.unwrap(), CheckState::Valid);
    let net = workspace.snapshot(net_id).await.unwrap();
    assert_eq!(net.node("t1").unwrap().name(), "Review");
    workspace.shutdown().await;
}

#[tokio::test]
async fn firing_publishes_token_changes() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(sequence_net()).await.unwrap();

    let outcome = workspace.fire(net_id, "t1").await.unwrap().unwrap();
    assert_eq!(outcome.emptied.len(), 1);
    assert_eq!(outcome.marked.len(), 1);
    let net = workspace.snapshot(net_id).await.unwrap();
    assert_eq!(net.place("start").unwrap().marking(), Marking::Empty);
    assert_eq!(net.place("end").unwrap().marking(), Marking::Marked);

    let fired = timeout(WAIT, async {
        loop {
            if let WorkspaceEvent::Changed(id, event) = rx.recv().await.unwrap() {
                if id == net_id && event.changes.contains(&NetChange::TransitionFired("t1".into())) {
                    return event;
                }
            }
        }
    })
    .await
    .unwrap();
    assert!(fired.changes.contains(&NetChange::TokenAdded("end".into())));

    assert_eq!(workspace.fire(net_id, "t1").await.unwrap(), None);
    let res = workspace.fire(net_id, "missing").await;
    assert!(matches!(res, Err(PetriError::NotFound(_))));
    workspace.shutdown().await;
}

#[tokio::test]
async fn undo_and_redo_edits() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let net_id = workspace.open(sequence_net()).await.unwrap();
    assert!(!workspace.undo(net_id).await.unwrap());

    workspace.edit(net_id, |net| net.remove_element("t1")).await.unwrap();
    let net = workspace.snapshot(net_id).await.unwrap();
    assert!(!net.contains("t1") && !net.contains("a1") && !net.contains("a2"));

    assert!(workspace.undo(net_id).await.unwrap());
    let net = workspace.snapshot(net_id).await.unwrap();
    assert!(net.contains("t1") && net.contains("a1") && net.contains("a2"));
    assert_eq!(net.successors("start").unwrap().len(), 1);

    assert!(workspace.redo(net_id).await.unwrap());
    assert!(!workspace.snapshot(net_id).await.unwrap().contains("t1"));
    assert!(!workspace.redo(net_id).await.unwrap());
    workspace.shutdown().await;
}

#[tokio::test]
async fn failed_edit_is_not_recorded() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let net_id = workspace.open(sequence_net()).await.unwrap();

    let res = workspace.edit(net_id, |net| net.add_arc("a3", "start", "end")).await;
    assert!(matches!(res, Err(PetriError::InvalidConnection { .. })));
    let res = workspace.edit(net_id, |net| net.add_arc("a1", "t1", "end")).await;
    assert!(matches!(res, Err(PetriError::DuplicateId(_))));
    assert!(!workspace.undo(net_id).await.unwrap());
    assert_eq!(workspace.snapshot(net_id).await.unwrap().len(), 5);
    workspace.shutdown().await;
}

#[tokio::test]
async fn partly_applied_edit_is_rolled_back() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(sequence_net()).await.unwrap();

    workspace
        .edit(net_id, |net| net.add_place("p1", "", Marking::Empty, Position::default()))
        .await
        .unwrap();
    let res = workspace
        .edit(net_id, |net| {
            net.add_place("p2", "", Marking::Empty, Position::default())?;
            net.add_arc("bad", "p1", "p2")
        })
        .await;
    assert!(matches!(res, Err(PetriError::InvalidConnection { .. })));
    let net = workspace.snapshot(net_id).await.unwrap();
    assert!(net.contains("p1"));
    assert!(!net.contains("p2"));

    // the failed edit left no history entry, undo reverts the last successful edit
    assert!(workspace.undo(net_id).await.unwrap());
    let net = workspace.snapshot(net_id).await.unwrap();
    assert!(!net.contains("p1") && !net.contains("p2"));
    assert_eq!(net.len(), 5);

    // no change event ever mentioned p2
    while let Ok(event) = rx.try_recv() {
        if let WorkspaceEvent::Changed(_, event) = event {
            assert!(!event.changes.iter().any(|change| matches!(
                change,
                NetChange::PlaceAdded(id, ..) if id.as_str() == "p2"
            )));
        }
    }
    workspace.shutdown().await;
}

/// A sequence s -> t0 -> p1 -> t1 -> ... -> end. The transitions are added back to front, so the
/// simulation fires a single transition per round and validation takes a while.
fn slow_sequence(length: usize) -> Net {
    let place = |idx: usize| match idx {
        0 => "s".to_string(),
        idx if idx == length => "end".to_string(),
        idx => format!("p{idx}"),
    };
    let mut net = Net::new();
    for idx in (0..=length).rev() {
        net.add_place(place(idx), "", Marking::Empty, Position::default()).unwrap();
    }
    for idx in (0..length).rev() {
        net.add_transition(format!("t{idx}"), "", Position::default()).unwrap();
    }
    for idx in 0..length {
        let tr = format!("t{idx}");
        net.add_arc(format!("in{idx}"), &place(idx), &tr).unwrap();
        net.add_arc(format!("out{idx}"), &tr, &place(idx + 1)).unwrap();
    }
    net
}

async fn wait_until_checking(workspace: &Workspace, net_id: NetId) {
    timeout(WAIT, async {
        while workspace.state(net_id).await.unwrap() != CheckState::Checking {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("validation did not start");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edit_during_validation_discards_stale_result() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(slow_sequence(400)).await.unwrap();
    wait_until_checking(&workspace, net_id).await;

    workspace
        .edit(net_id, |net| net.add_place("orphan", "", Marking::Empty, Position::default()))
        .await
        .unwrap();
    let latest = workspace.snapshot(net_id).await.unwrap().revision();

    // the first result published is the one for the edited net
    let report = timeout(WAIT, async {
        loop {
            if let WorkspaceEvent::Validated(id, report) = rx.recv().await.unwrap() {
                assert_eq!(id, net_id);
                return report;
            }
        }
    })
    .await
    .expect("no validation result");
    assert!(!report.is_valid());
    assert!(report.of_kind(DiagnosticKind::MultipleStartPlaces).count() > 0);
    assert_eq!(workspace.state(net_id).await.unwrap(), CheckState::Invalid);
    assert_eq!(workspace.snapshot(net_id).await.unwrap().revision(), latest);

    // and it stays the only one
    let late = timeout(Duration::from_millis(300), async {
        loop {
            if let WorkspaceEvent::Validated(..) = rx.recv().await.unwrap() {
                return;
            }
        }
    })
    .await;
    assert!(late.is_err(), "stale validation result published");
    workspace.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_abandons_running_validation() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net = slow_sequence(400);
    let status = net.status();
    let net_id = workspace.open(net).await.unwrap();
    wait_until_checking(&workspace, net_id).await;

    let net = workspace.close(net_id).await.unwrap();
    assert_eq!(net.len(), 401 + 400 + 800);

    let mut closed = false;
    let res = timeout(Duration::from_millis(500), async {
        loop {
            match rx.recv().await.unwrap() {
                WorkspaceEvent::Closed(id) if id == net_id => closed = true,
                WorkspaceEvent::Validated(id, _) if id == net_id => return,
                _ => {}
            }
        }
    })
    .await;
    assert!(closed);
    assert!(res.is_err(), "validation result published for a closed net");
    assert_eq!(status.state(), CheckState::Unchecked);

    // the worker is free for the next net
    let mut rx = workspace.subscribe();
    let other = workspace.open(sequence_net()).await.unwrap();
    next_report(&mut rx, other, true).await;
    workspace.shutdown().await;
}

#[tokio::test]
async fn closed_net_gets_no_more_results() {
    let workspace = Workspace::start(WorkspaceConfig::default(), CancellationToken::new());
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(sequence_net()).await.unwrap();
    let net = workspace.close(net_id).await.unwrap();
    assert_eq!(net.len(), 5);

    timeout(WAIT, async {
        loop {
            if let WorkspaceEvent::Closed(id) = rx.recv().await.unwrap() {
                assert_eq!(id, net_id);
                break;
            }
        }
    })
    .await
    .unwrap();
    // any validation still in flight must be dropped
    let late = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(late.is_err(), "unexpected event after close: {:?}", late);

    assert!(matches!(workspace.state(net_id).await, Err(PetriError::UnknownNet(_))));
    assert!(matches!(workspace.close(net_id).await, Err(PetriError::UnknownNet(_))));
    assert!(workspace.net_ids().await.is_empty());
    workspace.shutdown().await;
}
