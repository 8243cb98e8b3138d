use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use distributed_grid::cache::Cache;
use distributed_grid::cache::handlers::{
    handle_command, handle_delta, handle_get, handle_put, handle_put_if_absent, handle_remove,
};
use distributed_grid::config::GridConfig;
use distributed_grid::container::{DataContainer, LockManager};
use distributed_grid::distribution::handlers::{
    handle_locality, handle_locate, handle_rehash_status,
};
use distributed_grid::distribution::state_transfer::StateTransferTask;
use distributed_grid::distribution::{DistributionManager, TopologyManager};
use distributed_grid::membership::service::MembershipService;
use distributed_grid::notifications::ListenerRegistry;
use distributed_grid::remoting::http::HttpTransport;
use distributed_grid::remoting::protocol::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = GridConfig::from_args(&args)?;

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("Starting node on {}", config.bind_addr);
    if config.is_founder() {
        tracing::info!("Starting as seed node (founder)");
    } else {
        tracing::info!("Seed nodes: {:?}", config.seed_nodes);
    }

    // 1. Membership (UDP gossip):
    let http_addr = config.http_addr();
    let membership =
        MembershipService::new(config.bind_addr, http_addr, config.seed_nodes.clone()).await?;
    let local = membership.local_address();
    tracing::info!("Node address: {}", local);

    // 2. Ownership and routing:
    let topology = Arc::new(TopologyManager::new(
        local,
        config.num_owners,
        config.num_segments,
        config.is_founder(),
    )?);
    let transport = HttpTransport::new(membership.clone());
    let dm = Arc::new(DistributionManager::new(
        topology.clone(),
        transport.clone(),
        config.sync_repl_timeout(),
        config.l1_lifespan_ms,
    ));

    // 3. Local data and the cache:
    let container = Arc::new(DataContainer::new(config.num_segments));
    let locks = Arc::new(LockManager::new(config.lock_acquisition_timeout()));
    let cache = Cache::new(
        dm.clone(),
        container.clone(),
        locks,
        ListenerRegistry::new(),
        config.l1_enabled,
    );

    // 4. State transfer on view changes, periodic cleanup:
    let state_transfer = StateTransferTask::new(
        topology,
        transport,
        container,
        config.sync_repl_timeout(),
    );
    tokio::spawn(state_transfer.run(membership.subscribe()));
    cache.clone().spawn_maintenance(config.maintenance_interval());

    // 5. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_PUT, post(handle_put))
        .route(ENDPOINT_PUT_IF_ABSENT, post(handle_put_if_absent))
        .route(ENDPOINT_DELTA, post(handle_delta))
        .route(ENDPOINT_REMOVE, post(handle_remove))
        .route(&format!("{}/:key", ENDPOINT_GET), get(handle_get))
        .route(ENDPOINT_COMMAND, post(handle_command))
        .route(&format!("{}/:key", ENDPOINT_ADMIN_LOCALITY), get(handle_locality))
        .route(&format!("{}/:key", ENDPOINT_ADMIN_LOCATE), get(handle_locate))
        .route(ENDPOINT_ADMIN_REHASH, get(handle_rehash_status))
        .layer(Extension(cache))
        .layer(Extension(dm.clone()));

    // 6. Spawn membership service:
    let service_clone = membership.clone();
    tokio::spawn(async move {
        service_clone.start().await;
    });

    // 7. Spawn stats reporter:
    let stats_service = membership.clone();
    let stats_dm = dm.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let alive = stats_service.get_alive_members();
            tracing::info!(
                "Cluster stats: {} alive nodes, topology {} (rehashing: {})",
                alive.len(),
                stats_dm.topology_id(),
                stats_dm.is_rehash_in_progress()
            );
            for node in alive {
                tracing::info!(
                    "  - {} gossip={} http={} (inc={})",
                    node.address,
                    node.gossip_addr,
                    node.http_addr,
                    node.incarnation
                );
            }
        }
    });

    // 8. Start HTTP server:
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
