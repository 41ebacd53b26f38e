use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use podsec::{
    candidates, check_policies, run_admission, ClusterState, PluginKind, RootConfig, RootError,
};
use podsec_core::{Operation, Pod};
use podsec_policy::{Decision, NoopAuditSink};

/// podsec: pod security-context admission
///
/// Decides which security context every container of a pod may run with,
/// against the policies its service account is allowed to use.
#[derive(Parser, Debug)]
#[command(name = "podsec", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cluster state JSON (policies, service accounts, namespaces, volumes)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run admission on a pod and print the decision and resulting pod
    Admit {
        /// Pod JSON file
        #[arg(long)]
        pod: PathBuf,

        /// Namespace the request targets
        #[arg(short, long)]
        namespace: String,

        /// Request operation
        #[arg(long, default_value = "create")]
        operation: Operation,

        /// Override the configured plugin
        #[arg(long, value_enum)]
        plugin: Option<PluginKind>,
    },

    /// List the policies a service account may use, in evaluation order
    Candidates {
        #[arg(short, long)]
        namespace: String,

        #[arg(long)]
        service_account: String,
    },

    /// Validate the shape of every policy in the cluster state
    CheckPolicies,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("podsec=debug,podsec_policy=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podsec=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RootConfig, RootError> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

fn load_state(flag: Option<&PathBuf>, config: &RootConfig) -> Result<ClusterState, RootError> {
    let path = flag.or(config.cluster_state.as_ref()).ok_or_else(|| {
        RootError::Config("no cluster state given; pass --state or set cluster_state".into())
    })?;
    ClusterState::load(path)
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Returns the process exit code: 0 on admit or success, 2 on a denial or
/// invalid policies.
fn run(cli: Cli) -> Result<i32, RootError> {
    let config = load_config(cli.config.as_ref())?;
    let state = load_state(cli.state.as_ref(), &config)?;

    match cli.command {
        Commands::Admit {
            pod,
            namespace,
            operation,
            plugin,
        } => cmd_admit(&config, &state, &pod, &namespace, operation, plugin),
        Commands::Candidates {
            namespace,
            service_account,
        } => cmd_candidates(&state, &namespace, &service_account),
        Commands::CheckPolicies => cmd_check_policies(&state),
    }
}

fn cmd_admit(
    config: &RootConfig,
    state: &ClusterState,
    pod_path: &Path,
    namespace: &str,
    operation: Operation,
    plugin: Option<PluginKind>,
) -> Result<i32, RootError> {
    let pod: Pod = serde_json::from_str(&std::fs::read_to_string(pod_path)?)?;

    let mut admission = config.admission.clone();
    if let Some(kind) = plugin {
        admission.plugin = kind;
    }

    info!(pod = %pod.name, namespace, %operation, "running admission");
    let report = run_admission(state, &admission, &NoopAuditSink, pod, namespace, operation)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(match report.decision {
        Decision::Admit(_) => 0,
        Decision::Deny(_) => 2,
    })
}

fn cmd_candidates(
    state: &ClusterState,
    namespace: &str,
    service_account: &str,
) -> Result<i32, RootError> {
    let names = candidates(state, namespace, service_account)?;
    if names.is_empty() {
        println!("No policy is available to {}/{}.", namespace, service_account);
    }
    for name in names {
        println!("{}", name);
    }
    Ok(0)
}

fn cmd_check_policies(state: &ClusterState) -> Result<i32, RootError> {
    match check_policies(state) {
        Ok(count) => {
            println!("{} policies OK.", count);
            Ok(0)
        }
        Err(errors) => {
            for e in &errors {
                println!("{}", e);
            }
            Ok(2)
        }
    }
}
