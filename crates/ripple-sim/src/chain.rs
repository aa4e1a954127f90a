use std::time::Instant;

use ripple_core::{short_id, ColourState, MemoryMesh};

use crate::events::{emit, EventStarted, EventSummary};
use crate::mesh::{spawn_nodes, SimSettings};

/// Build a line of `count` nodes, send `colour` from the first to the last
/// and report every hop on the way.
pub async fn run(
    settings: &SimSettings,
    count: usize,
    colour: ColourState,
    start: Instant,
) -> anyhow::Result<()> {
    let port = settings.config.port();
    if settings.json {
        emit(&EventStarted::new("chain", count, port));
    } else {
        eprintln!("Chain mode → {count} nodes, colour {colour}");
    }

    let mesh = MemoryMesh::new();
    let mut nodes = spawn_nodes(&mesh, count, settings).await?;
    for pair in nodes.windows(2) {
        mesh.link(pair[0].id, pair[1].id);
    }

    let target = nodes[count - 1].id;
    let sender = &mut nodes[0];
    sender.wait_for_peers(count - 1, settings.timeout).await?;
    sender.handle.select(target)?;
    sender.handle.set_colour(colour).await?;

    let send_start = Instant::now();
    let first_hop = sender.handle.send_to_selected().await?;
    if !settings.json {
        println!(
            "  #0 {} → {colour}, sent to {} via {}",
            short_id(&sender.id),
            short_id(&target),
            short_id(&first_hop)
        );
    }

    let mut painted = 0;
    for node in nodes.iter_mut().skip(1) {
        let relay = node.id != target;
        match node.record_hop(colour, relay, settings, send_start).await {
            Ok(hop) => {
                painted += 1;
                hop.print(settings.json);
            }
            Err(e) => {
                eprintln!("  {e}");
                break;
            }
        }
    }

    let summary = EventSummary {
        event: "summary",
        mode: "chain".into(),
        colour,
        painted,
        expected: count - 1,
        send_failures: 0,
        elapsed_s: start.elapsed().as_secs_f64(),
    };
    if settings.json {
        emit(&summary);
    } else {
        println!();
        println!(
            "{}/{} hops repainted in {:.3}s",
            summary.painted, summary.expected, summary.elapsed_s
        );
    }

    for node in &nodes {
        node.handle.shutdown().await;
    }
    if painted < count - 1 {
        anyhow::bail!("message did not reach the end of the chain");
    }
    Ok(())
}
