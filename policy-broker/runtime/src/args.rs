use crate::{
    admin::Admin,
    cf::{self, CfCatalog, CfPolicyStore, CfResolver, ClientConfig},
    index::{Names, NamesMetrics},
    log::LogFormat,
    reconcile::{Broker, Converger, ReconcileMetrics, Scheduler, State},
};
use anyhow::Result;
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::watch,
    time::{self, Duration, MissedTickBehavior},
};
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "policy-broker",
    about = "Keeps platform network policies in line with service bindings"
)]
pub struct Args {
    #[clap(long, default_value = "policy_broker=info,warn", env = "POLICY_BROKER_LOG")]
    log_level: String,

    #[clap(long, default_value = "plain", env = "POLICY_BROKER_LOG_FORMAT")]
    log_format: LogFormat,

    /// The cloud controller API URL.
    #[clap(long, env = "CF_API_URL")]
    api_url: String,

    /// The UAA URL. Discovered from the API when unset.
    #[clap(long, env = "UAA_URL")]
    uaa_url: Option<String>,

    #[clap(long, env = "CLIENT_ID")]
    client_id: String,

    #[clap(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    #[clap(long, env = "SKIP_SSL_VALIDATION")]
    skip_tls_validation: bool,

    #[clap(long, default_value = "0.0.0.0:9990")]
    admin_addr: SocketAddr,

    #[clap(
        long,
        default_value = "60",
        env = "RECONCILE_INTERVAL_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    reconcile_interval_secs: u64,

    #[clap(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    name_cache_ttl_secs: u64,

    #[clap(long, default_value = "10", env = "HTTP_TIMEOUT")]
    http_timeout_secs: u64,

    #[clap(long, default_value = "30000")]
    write_timeout_ms: u64,

    /// The most policies sent to the policy server at once; at most 500.
    #[clap(long, default_value = "500")]
    chunk_size: usize,

    /// How long a new instance's labels are held back.
    #[clap(long, default_value = "3000")]
    label_delay_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            api_url,
            uaa_url,
            client_id,
            client_secret,
            skip_tls_validation,
            admin_addr,
            reconcile_interval_secs,
            name_cache_ttl_secs,
            http_timeout_secs,
            write_timeout_ms,
            chunk_size,
            label_delay_ms,
        } = self;

        log_format.try_init(&log_level)?;

        let mut config = ClientConfig {
            api_url,
            uaa_url: uaa_url.unwrap_or_default(),
            client_id,
            client_secret,
            skip_tls_validation,
            timeout: Duration::from_secs(http_timeout_secs),
        };
        if config.uaa_url.is_empty() {
            config.uaa_url = cf::discover_uaa_url(&config.http_client()?, &config.api_url).await?;
        }
        let client = cf::Client::new(&config)?;

        let mut prom = <Registry>::default();
        let reconcile_metrics =
            ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        let names_metrics = NamesMetrics::register(prom.sub_registry_with_prefix("names"));

        let ttl = Duration::from_secs(name_cache_ttl_secs);
        let names = Arc::new(Names::new(
            Arc::new(CfResolver::new(client.clone())),
            ttl,
            names_metrics,
        ));
        let converger = Converger::new(
            Arc::new(CfPolicyStore::new(client.clone())),
            reconcile_metrics.clone(),
        )
        .with_chunk_size(chunk_size)
        .with_write_timeout(Duration::from_millis(write_timeout_ms));
        let broker = Broker::new(Arc::new(CfCatalog::new(client)), converger, names.clone())
            .with_label_delay(Duration::from_millis(label_delay_ms));

        let (drain_tx, drain_rx) = drain::channel();

        let scheduler = Scheduler::new(
            Arc::new(broker),
            Duration::from_secs(reconcile_interval_secs),
            reconcile_metrics,
        );
        let (ready_tx, ready_rx) = watch::channel(false);
        tokio::spawn(ready_after_first_cycle(scheduler.state(), ready_tx));
        tokio::spawn(
            scheduler
                .run(drain_rx.clone())
                .instrument(info_span!("scheduler")),
        );

        tokio::spawn(sweep(names, ttl, drain_rx.clone()).instrument(info_span!("names")));

        let admin = Admin::new(prom, ready_rx);
        tokio::spawn(
            async move {
                if let Err(error) = admin.serve(admin_addr, drain_rx).await {
                    error!(%error, "Admin server failed");
                }
            }
            .instrument(info_span!("admin", port = %admin_addr.port())),
        );

        // Block on the shutdown signal, then wait for an in-flight cycle to
        // finish.
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Received SIGINT; shutting down");
            }
            _ = sigterm.recv() => info!("Received SIGTERM; shutting down"),
        }
        drain_tx.drain().await;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Marks the process ready once a reconciliation cycle has completed.
async fn ready_after_first_cycle(mut state: watch::Receiver<State>, ready: watch::Sender<bool>) {
    if state.changed().await.is_err() {
        return;
    }
    if state.wait_for(|s| *s == State::Idle).await.is_ok() {
        info!("Ready");
        ready.send_replace(true);
    }
}

/// Evicts expired names every `ttl` until `drain` is signaled.
async fn sweep(names: Arc<Names>, ttl: Duration, drain: drain::Watch) {
    let mut ticks = time::interval(ttl);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin! {
        let shutdown = drain.signaled();
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            _ = ticks.tick() => {
                let evicted = names.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, "Swept expired names");
                }
            }
        }
    }
}
