/// Benchmark for validating workflow nets of growing size
///
/// Uses a chain of N parallel blocks:
///
///                   ┌─► p-a ──► ta ──► q-a ──┐
///   p(i) ──► split ──┤                        ├─► join ──► p(i+1)
///                   └─► p-b ──► tb ──► q-b ──┘
///
/// Each block adds 5 places, 4 transitions and 10 arcs. The structural checks and the simulation
/// both grow linearly with N.
use std::time::Duration;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use wfnet::net::{Marking, Net, Position};
use wfnet::{Validator, Workspace, WorkspaceConfig, WorkspaceEvent};

fn parallel_chain(size: u64) -> Net {
    let mut net = Net::new();
    net.add_place("p0", "", Marking::Marked, Position::default()).unwrap();
    for i in 0..size {
        let x = (i * 100) as i32;
        let entry = format!("p{i}");
        let exit = format!("p{}", i + 1);
        let split = format!("split{i}");
        let join = format!("join{i}");
        net.add_transition(split.as_str(), "", Position::new(x + 10, 0)).unwrap();
        net.add_transition(join.as_str(), "", Position::new(x + 90, 0)).unwrap();
        net.add_place(exit.as_str(), "", Marking::Empty, Position::new(x + 100, 0)).unwrap();
        net.add_arc(format!("a{i}-in"), &entry, &split).unwrap();
        net.add_arc(format!("a{i}-out"), &join, &exit).unwrap();
        for branch in ["a", "b"] {
            let pre = format!("p{i}-{branch}");
            let post = format!("q{i}-{branch}");
            let tr = format!("t{i}-{branch}");
            net.add_place(pre.as_str(), "", Marking::Empty, Position::new(x + 30, 0)).unwrap();
            net.add_transition(tr.as_str(), "", Position::new(x + 50, 0)).unwrap();
            net.add_place(post.as_str(), "", Marking::Empty, Position::new(x + 70, 0)).unwrap();
            net.add_arc(format!("a{i}-{branch}1"), &split, &pre).unwrap();
            net.add_arc(format!("a{i}-{branch}2"), &pre, &tr).unwrap();
            net.add_arc(format!("a{i}-{branch}3"), &tr, &post).unwrap();
            net.add_arc(format!("a{i}-{branch}4"), &post, &join).unwrap();
        }
    }
    net
}

fn benchmark_validation(c: &mut Criterion) {
    // uncomment for debugging issues:
    // tracing_subscriber::fmt()
    //     .compact()
    //     .with_env_filter(tracing_subscriber::EnvFilter::try_new("info,wfnet=debug").unwrap())
    //     .init();

    let validator = Validator::default();
    let mut group = c.benchmark_group("validation");
    for &size in [1, 4, 16, 64, 256].iter() {
        let net = parallel_chain(size);
        assert!(validator.validate(&net).is_valid(), "Benchmark net must be sound.");
        group.throughput(Throughput::Elements(net.len() as u64));
        group.measurement_time(Duration::from_secs(10));
        group.bench_with_input(BenchmarkId::new("validate", size), &net, |b, net| {
            b.iter(|| validator.validate(net));
        });
    }
    group.finish();
}

/// Time from opening a net in the workspace until its validation result is published.
async fn run_workspace(workspace: &Workspace, net: &Net) {
    let mut rx = workspace.subscribe();
    let net_id = workspace.open(net.clone()).await.expect("Failed to open net");
    loop {
        match rx.recv().await.expect("Event channel closed") {
            WorkspaceEvent::Validated(id, _) if id == net_id => break,
            _ => continue,
        }
    }
    workspace.close(net_id).await.expect("Failed to close net");
}

fn benchmark_workspace(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create tokio runtime");
    let workspace = rt.block_on(async {
        Workspace::start(WorkspaceConfig::default(), CancellationToken::new())
    });
    let mut group = c.benchmark_group("workspace");
    for &size in [1, 16, 256].iter() {
        let net = parallel_chain(size);
        group.throughput(Throughput::Elements(net.len() as u64));
        group.bench_with_input(BenchmarkId::new("open-validate", size), &net, |b, net| {
            b.to_async(&rt).iter(|| run_workspace(&workspace, net));
        });
    }
    group.finish();
    rt.block_on(workspace.shutdown());
}

criterion_group!(benches, benchmark_validation, benchmark_workspace);
criterion_main!(benches);
