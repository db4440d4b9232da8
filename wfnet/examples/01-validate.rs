use std::time::Duration;

use tokio::{signal, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wfnet::{
    error::Result as PetriResult,
    net::{Marking, Net, Position},
    pnml, Workspace, WorkspaceConfigBuilder, WorkspaceEvent,
};

/// Order handling workflow:
///
///            ┌─► pack ──► packed ──┐
///  received ─┤                     ├─► ship ──► done
///            └─► bill ──► billed ──┘
fn order_net() -> PetriResult<Net> {
    let mut net = Net::new();
    net.add_place("received", "Order received", Marking::Marked, Position::new(0, 100))?;
    net.add_transition("split", "Accept", Position::new(100, 100))?;
    net.add_place("to-pack", "", Marking::Empty, Position::new(200, 50))?;
    net.add_place("to-bill", "", Marking::Empty, Position::new(200, 150))?;
    net.add_transition("pack", "Pack", Position::new(300, 50))?;
    net.add_transition("bill", "Bill", Position::new(300, 150))?;
    net.add_place("packed", "", Marking::Empty, Position::new(400, 50))?;
    net.add_place("billed", "", Marking::Empty, Position::new(400, 150))?;
    net.add_transition("ship", "Ship", Position::new(500, 100))?;
    net.add_place("done", "Done", Marking::Empty, Position::new(600, 100))?;
    for (id, source, target) in [
        ("a1", "received", "split"),
        ("a2", "split", "to-pack"),
        ("a3", "split", "to-bill"),
        ("a4", "to-pack", "pack"),
        ("a5", "to-bill", "bill"),
        ("a6", "pack", "packed"),
        ("a7", "bill", "billed"),
        ("a8", "packed", "ship"),
        ("a9", "billed", "ship"),
        ("a10", "ship", "done"),
    ] {
        net.add_arc(id, source, target)?;
    }
    Ok(net)
}

#[tracing::instrument(level = "info")]
async fn run() -> PetriResult<()> {
    // listen to shutdown events
    let shutdown_token = CancellationToken::new();
    let shutdown_token_clone = shutdown_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => {
                warn!("Shutting down. Ctrl+C pressed (or corresponding signal sent).")
            },
            _ = shutdown_token_clone.cancelled() => {},
        }
        shutdown_token_clone.cancel();
    });

    // round trip through PNML
    let path = std::env::temp_dir().join("wfnet-01-validate.pnml");
    pnml::write_file(&order_net()?, &path)?;
    let loaded = pnml::read_file(&path)?;
    if !loaded.accepted() {
        error!("Could not load {}: {:?}", path.display(), loaded.warnings);
        return Ok(());
    }

    let config = WorkspaceConfigBuilder::default().history_depth(10_usize).build()?;
    let workspace = Workspace::start(config, shutdown_token.clone());
    let mut events = workspace.subscribe();
    let net_id = workspace.open(loaded.net).await?;

    // wait for the first validation result
    let validated = timeout(Duration::from_secs(5), async {
        while let Ok(event) = events.recv().await {
            if let WorkspaceEvent::Validated(id, report) = event {
                if id == net_id {
                    return Some(report);
                }
            }
        }
        None
    })
    .await;
    match validated {
        Ok(Some(report)) => {
            info!("Workflow net valid: {}", report.is_valid());
            for diagnostic in &report.diagnostics {
                warn!("{}", diagnostic);
            }
        }
        _ => warn!("No validation result received."),
    }

    // play the token game
    loop {
        if shutdown_token.is_cancelled() {
            break;
        }
        let enabled = workspace.refresh(net_id).await?;
        let Some(transition) = enabled.first() else {
            break;
        };
        if let Some(outcome) = workspace.fire(net_id, transition.as_str()).await? {
            info!("Fired {}, marked {:?}", outcome.transition, outcome.marked);
        }
    }

    let net = workspace.close(net_id).await?;
    let marked: Vec<_> =
        net.places().filter(|pl| pl.as_place().is_some_and(|p| p.marking().is_marked())).collect();
    info!("Final marking: {:?}", marked.iter().map(|pl| pl.id().as_str()).collect::<Vec<_>>());

    // introduce a second start place and validate again
    let mut broken = net;
    broken.add_place("stray", "", Marking::Empty, Position::new(0, 200))?;
    broken.add_arc("a11", "stray", "ship")?;
    let report = wfnet::Validator::default().validate(&broken);
    for diagnostic in &report.diagnostics {
        warn!("{}", diagnostic);
    }

    workspace.shutdown().await;
    shutdown_token.cancel();
    Ok(())
}

#[tokio::main]
async fn main() -> PetriResult<()> {
    // set up logging
    tracing_subscriber::fmt()
        .with_span_events(
            tracing_subscriber::fmt::format::FmtSpan::CLOSE
                | tracing_subscriber::fmt::format::FmtSpan::NEW,
        )
        .compact()
        .with_env_filter(EnvFilter::try_new("info,wfnet=debug").unwrap())
        .init();

    return run().await;
}
