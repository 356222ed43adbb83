//! `sensorlink run`: the agent itself.

use std::sync::Arc;

use tracing::info;

use sensorlink_api::RestClient;
use sensorlink_config::FileRegistry;
use sensorlink_core::Agent;

use super::{SensorView, sensor_row};
use crate::cli::{GlobalOpts, RunArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let transport = config::transport(&cfg)?;
    let api = Arc::new(RestClient::new(&transport)?);

    let workers = sensorlink_config::all_worker_prefs(&cfg)?;
    let registry = Arc::new(
        FileRegistry::open(sensorlink_config::registry_path(&cfg))?.with_workers(workers),
    );

    let mut agent_config = sensorlink_config::to_agent_config(&cfg)?;
    if let Some(ref dir) = args.scripts_dir {
        agent_config.scripts_dir = Some(dir.clone());
    }
    if args.no_scripts {
        agent_config.scripts_dir = None;
    }
    if args.no_external_ip {
        agent_config.external_ip = None;
    }
    info!(server = %agent_config.server_url, "starting agent");

    let agent = Agent::new(agent_config, api, registry);
    let workers = agent.default_workers().await;
    let started = agent.start(workers).await;

    if args.once {
        let sent = agent.refresh().await;
        agent.shutdown().await;
        info!(started, sent, "snapshot sent");
        print_tracked(&agent, global);
        return Ok(());
    }

    if started == 0 {
        tracing::warn!("no workers running; waiting for interrupt anyway");
    }
    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    agent.shutdown().await;
    Ok(())
}

fn print_tracked(agent: &Agent, global: &GlobalOpts) {
    let tracker = agent.tracker();
    let views: Vec<SensorView> = tracker
        .sensor_list()
        .iter()
        .filter_map(|id| tracker.get(id).ok())
        .map(|e| SensorView::from(e.as_ref()))
        .collect();

    let out = output::render_list(&global.output, &views, sensor_row, |v| v.id.clone());
    output::print_output(&out, global.quiet);
}
