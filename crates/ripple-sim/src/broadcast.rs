use std::time::Instant;

use ripple_core::{short_id, ColourState, MemoryMesh};

use crate::events::{emit, EventSendFailed, EventStarted, EventSummary};
use crate::mesh::{spawn_nodes, SimSettings};

/// Build a star around one hub and send `colour` from the hub to every leaf.
pub async fn run(
    settings: &SimSettings,
    leaves: usize,
    colour: ColourState,
    start: Instant,
) -> anyhow::Result<()> {
    let port = settings.config.port();
    if settings.json {
        emit(&EventStarted::new("broadcast", leaves + 1, port));
    } else {
        eprintln!("Broadcast mode → hub + {leaves} leaves, colour {colour}");
    }

    let mesh = MemoryMesh::new();
    let mut nodes = spawn_nodes(&mesh, leaves + 1, settings).await?;
    let hub_id = nodes[0].id;
    for leaf in &nodes[1..] {
        mesh.link(hub_id, leaf.id);
    }

    let hub = &mut nodes[0];
    hub.wait_for_peers(leaves, settings.timeout).await?;
    hub.handle.set_colour(colour).await?;

    let send_start = Instant::now();
    let report = hub.handle.send_to_all().await?;
    for (peer, error) in report.failures() {
        if settings.json {
            emit(&EventSendFailed {
                event: "send_failed",
                target: peer,
                error: error.to_string(),
            });
        } else {
            eprintln!("  send to {} failed: {error}", short_id(&peer));
        }
    }
    let sent = report.sent();

    let mut painted = 0;
    for node in nodes.iter_mut().skip(1) {
        if !sent.contains(&node.id) {
            continue;
        }
        match node.record_hop(colour, false, settings, send_start).await {
            Ok(hop) => {
                painted += 1;
                hop.print(settings.json);
            }
            Err(e) => eprintln!("  {e}"),
        }
    }

    let summary = EventSummary {
        event: "summary",
        mode: "broadcast".into(),
        colour,
        painted,
        expected: leaves,
        send_failures: report.failures().len(),
        elapsed_s: start.elapsed().as_secs_f64(),
    };
    if settings.json {
        emit(&summary);
    } else {
        println!();
        println!(
            "{}/{} leaves repainted, {} send failures, {:.3}s",
            summary.painted, summary.expected, summary.send_failures, summary.elapsed_s
        );
    }

    for node in &nodes {
        node.handle.shutdown().await;
    }
    Ok(())
}
