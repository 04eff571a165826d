use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::Api;
use kube::runtime::{watcher, Controller};
use rollout_operator::config::Config;
use rollout_operator::delay::DelayGate;
use rollout_operator::gateway::ClusterGateway;
use rollout_operator::watcher::{error_policy, reconcile, ReconcileContext};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::parse().validate() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(config.json_logs);

    info!(
        namespace = config.target_namespace,
        name = config.target_stateful_set,
        delay_seconds = config.delay_seconds,
        "starting rollout-operator"
    );

    let client = kube::Client::try_default().await?;
    let gateway = ClusterGateway::new(client.clone(), config.target_namespace.clone(), config.target_stateful_set.clone());

    let delay_gate = DelayGate::new(gateway.clone(), config.delay_seconds, config.countdown_interval());
    tokio::spawn(delay_gate.run());

    let sts_api: Api<StatefulSet> = Api::namespaced(client, &config.target_namespace);
    let ctx = Arc::new(ReconcileContext { gateway, config: config.clone() });

    let wc = watcher::Config::default().fields(&format!("metadata.name={}", config.target_stateful_set));

    Controller::new(sts_api, wc)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, _)) => info!(name = obj_ref.name, "reconciled"),
                Err(e) => error!(error = %e, "reconcile loop reported an error"),
            }
        })
        .await;

    info!("rollout-operator shutting down");
    Ok(())
}

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
