use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use kubreed_core::cluster::{BoxedCluster, InMemoryCluster, KubeCluster, Kubeconfig};
use kubreed_core::observability;
use kubreed_core::reconcile::{ReconcileReport, Target};
use kubreed_core::{
    DesiredState, ReconcileError, Reconciler, TopologyRecord, TopologyStore, WorkloadConfig,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Image of the workload process used when `--image` is not given.
///
/// The image must run the `kubreed-http` binary of the same release, which
/// reads its settings from the JSON payload the reconciler injects.
pub const DEFAULT_IMAGE: &str = concat!("kubreed-http:", env!("CARGO_PKG_VERSION"));

/// Crates logged at full verbosity unless `RUST_LOG` says otherwise.
const VERBOSE_CRATES: &[&str] = &["kubreed_cli", "kubreed_core"];

/// Cluster name of the topology document written by dry runs.
const DRY_RUN_CLUSTER: &str = "dry-run";

/// Breed a mesh of synthetic workloads in a cluster.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// number of namespaces to create
    #[argh(option, short = 'n', default = "1")]
    pub namespaces: usize,

    /// name of an existing namespace to update instead of creating new ones
    #[argh(option, short = 'm')]
    pub namespace_name: Option<String>,

    /// number of deployments and services per namespace
    #[argh(option, short = 'd', default = "5")]
    pub deployments: usize,

    /// number of pods per deployment
    #[argh(option, short = 'p', default = "3")]
    pub pods: u32,

    /// number of APIs served by each pod
    #[argh(option, short = 'a', default = "10")]
    pub apis: usize,

    /// percentage of requests carrying PII
    #[argh(option, default = "1")]
    pub pii_percent: usize,

    /// percentage of requests carrying attack patterns
    #[argh(option, default = "1")]
    pub attack_percent: usize,

    /// percentage of requests carrying user payloads
    #[argh(option, default = "1")]
    pub user_percent: usize,

    /// outgoing requests per second of each pod
    #[argh(option, short = 'r', default = "1")]
    pub rps: usize,

    /// number of services each pod sends requests to
    #[argh(option, short = 'b', default = "3")]
    pub branching: usize,

    /// maximum response time of each API call, e.g. `2s` or `150ms`
    #[argh(option, short = 'l', default = "default_latency()")]
    pub latency: humantime::Duration,

    /// image running the `kubreed-http` binary of this release
    #[argh(option, short = 'i', default = "DEFAULT_IMAGE.to_owned()")]
    pub image: String,

    /// path to the kubeconfig file, defaults to `$HOME/.kube/config`
    #[argh(option)]
    pub kubeconfig: Option<PathBuf>,

    /// directory holding the recorded topologies
    #[argh(option, default = "PathBuf::from(\".\")")]
    pub state_dir: PathBuf,

    /// reconcile an in-memory cluster instead of a real one
    #[argh(switch)]
    pub dry_run: bool,

    /// seed for the traffic graph, random if omitted
    #[argh(option)]
    pub seed: Option<u64>,

    /// abort if the run takes longer than this, e.g. `5m`
    #[argh(option)]
    pub deadline: Option<humantime::Duration>,
}

fn default_latency() -> humantime::Duration {
    Duration::from_secs(2).into()
}

impl Args {
    /// The state every reconciled namespace is driven towards.
    pub fn desired_state(&self) -> DesiredState {
        DesiredState {
            workloads: self.deployments,
            replicas: self.pods,
            branching: self.branching,
            image: self.image.clone(),
            config: WorkloadConfig {
                api_count: self.apis,
                rps: self.rps,
                pii_percent: self.pii_percent,
                attack_percent: self.attack_percent,
                user_percent: self.user_percent,
                response_time: self.latency.into(),
                remote_services: Vec::new(),
            },
        }
    }

    /// Which namespaces to operate on.
    pub fn target(&self) -> Target {
        match &self.namespace_name {
            Some(namespace) => Target::Update {
                namespace: namespace.clone(),
            },
            None => Target::Create {
                namespaces: self.namespaces,
            },
        }
    }

    /// Rejects option combinations that do not need a cluster to be refuted.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.namespace_name.is_none() && self.namespaces < 1 {
            return Err(ReconcileError::Validation(
                "at least 1 namespace must be created".to_owned(),
            ));
        }
        if self.dry_run && self.namespace_name.is_some() {
            return Err(ReconcileError::Validation(
                "dry runs start from an empty cluster and cannot update a namespace".to_owned(),
            ));
        }
        self.desired_state().validate()
    }

    fn kubeconfig_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Ok(path.clone());
        }
        let home =
            std::env::var_os("HOME").context("`--kubeconfig` not given and `HOME` is unset")?;
        Ok(PathBuf::from(home).join(".kube").join("config"))
    }

    fn rng(&self) -> SmallRng {
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        }
    }
}

/// Connects to the cluster and names the topology document after it.
fn connect(args: &Args) -> Result<(BoxedCluster, String)> {
    if args.dry_run {
        tracing::info!("dry run, using an in-memory cluster");
        return Ok((Box::new(InMemoryCluster::new()), DRY_RUN_CLUSTER.to_owned()));
    }

    let path = args.kubeconfig_path()?;
    let kubeconfig = Kubeconfig::load(&path).context("reading kubeconfig failed")?;
    let cluster = KubeCluster::from_kubeconfig(&kubeconfig)
        .context("connecting to kubernetes API server failed")?;
    let name = kubeconfig.cluster_name().to_owned();
    tracing::info!(cluster = %name, "connected to cluster");

    Ok((Box::new(cluster), name))
}

/// Executes the reconciliation described by `args` and returns the recorded topologies.
pub async fn run(args: &Args) -> Result<Vec<TopologyRecord>> {
    args.validate()?;

    let (cluster, cluster_name) = connect(args)?;
    let store = TopologyStore::new(&args.state_dir, &cluster_name);
    let mut reconciler = Reconciler::new(cluster, args.rng());

    let desired = args.desired_state();
    let target = args.target();
    let pass = reconciler.run(&store, &target, &desired);

    let reports = match args.deadline {
        Some(deadline) => {
            let deadline = Duration::from(deadline);
            tokio::time::timeout(deadline, pass)
                .await
                .map_err(|_| ReconcileError::DeadlineExceeded(deadline))??
        }
        None => pass.await?,
    };

    for report in &reports {
        log_report(report);
    }

    let records = store
        .load()
        .await
        .with_context(|| format!("reading back `{}` failed", store.path().display()))?;
    Ok(records)
}

fn log_report(report: &ReconcileReport) {
    tracing::info!(
        namespace = %report.namespace,
        phase = %report.phase,
        created = report.created.len(),
        deleted = report.deleted.len(),
        updated = report.updated.len(),
        regenerated = report.regenerated,
        "namespace reconciled"
    );
}

/// Parses the command line, runs the reconciliation and prints the topology.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    observability::init_tracing(VERBOSE_CRATES);
    tracing::debug!(?args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;

    let records = runtime.block_on(run(&args))?;
    let traffic_data = TopologyRecord::serialize_all(&records)?;
    println!("trafficData is:\n*****\n{traffic_data}\n*****");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["kubreed"], args).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.target(), Target::Create { namespaces: 1 });

        let desired = args.desired_state();
        assert_eq!(desired.workloads, 5);
        assert_eq!(desired.replicas, 3);
        assert_eq!(desired.branching, 3);
        assert_eq!(desired.image, DEFAULT_IMAGE);
        assert_eq!(desired.config.api_count, 10);
        assert_eq!(desired.config.rps, 1);
        assert_eq!(desired.config.response_time, Duration::from_secs(2));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn update_mode_by_name() {
        let args = parse(&["-m", "kubreed-0123", "-d", "8", "-l", "150ms"]);
        assert_eq!(
            args.target(),
            Target::Update {
                namespace: "kubreed-0123".into()
            }
        );
        assert_eq!(args.desired_state().workloads, 8);
        assert_eq!(
            args.desired_state().config.response_time,
            Duration::from_millis(150)
        );
    }

    #[test]
    fn rejects_invalid_settings() {
        for argv in [
            &["-n", "0"][..],
            &["-p", "0"],
            &["-a", "0"],
            &["--pii-percent", "0"],
            &["--pii-percent", "50", "--attack-percent", "50"],
            &["-r", "0"],
            &["-b", "0"],
            &["-l", "0s"],
            &["--dry-run", "-m", "kubreed-0123"],
        ] {
            let err = parse(argv).validate().unwrap_err();
            assert!(matches!(err, ReconcileError::Validation(_)), "{argv:?}");
        }
    }

    #[test]
    fn rejects_percentages_that_overflow() {
        let max = usize::MAX.to_string();
        for argv in [
            &["--pii-percent", max.as_str()][..],
            &["--attack-percent", max.as_str(), "--user-percent", max.as_str()],
        ] {
            let err = parse(argv).validate().unwrap_err();
            assert!(matches!(err, ReconcileError::Validation(_)), "{argv:?}");
        }
    }

    #[test]
    fn kubeconfig_override() {
        let args = parse(&["--kubeconfig", "/tmp/kubeconfig"]);
        assert_eq!(
            args.kubeconfig_path().unwrap(),
            PathBuf::from("/tmp/kubeconfig")
        );
    }
}
