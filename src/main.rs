//! caib CLI
//!
//! Entry point for the `caib` command-line tool.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use caib::artifact::download_completed_build;
use caib::config::{CliOverrides, ClientConfig};
use caib::error::{CaibError, Result};
use caib::host::{Kubectl, KubectlExec, KubectlStore, ResourceStore, StoreError};
use caib::lifecycle::{run_build, BuildParams, DEFAULT_BUILDER_IMAGE};
use caib::report::{write_build_details, write_build_table};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "caib")]
#[command(about = "Cloud automotive image builder client", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Namespace of the ImageBuild resources
    #[arg(long, short = 'n', global = true)]
    namespace: Option<String>,

    /// Path to the kubeconfig file (default: kubectl discovery)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Path to client config file (default: ~/.config/caib/config.toml)
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Disable transfer progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an ImageBuild from a manifest, uploading referenced local files
    Build {
        /// Name for the ImageBuild
        #[arg(long)]
        name: String,

        /// Path to manifest YAML file for the build
        #[arg(long)]
        manifest: PathBuf,

        /// Distribution to build
        #[arg(long, default_value = "cs9")]
        distro: String,

        /// Target platform
        #[arg(long, default_value = "qemu")]
        target: String,

        /// Architecture (amd64, arm64)
        #[arg(long, default_value = "arm64")]
        arch: String,

        /// Export format (image, qcow2)
        #[arg(long, default_value = "image")]
        export_format: String,

        /// Build mode
        #[arg(long, default_value = "image")]
        mode: String,

        /// Builder container image
        #[arg(long, default_value = DEFAULT_BUILDER_IMAGE)]
        osbuild_image: String,

        /// Storage class for the build volume
        #[arg(long, default_value = "")]
        storage_class: String,

        /// Timeout in minutes when waiting for build completion
        #[arg(long)]
        timeout: Option<u64>,

        /// Wait for the build to complete
        #[arg(long, short = 'w')]
        wait: bool,

        /// Download the artifact when the build completes
        #[arg(long, short = 'd')]
        download: bool,

        /// Directory to save artifacts
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Download the artifact of a completed ImageBuild
    Download {
        /// Name of the ImageBuild
        #[arg(long)]
        name: String,

        /// Directory to save artifacts
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// List ImageBuilds
    List,

    /// Show details of an ImageBuild
    Show {
        /// Name of the ImageBuild
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        if let Some(last) = e.last_observed() {
            eprintln!("last status: {} - {}", last.phase(), last.status.message);
        }
        process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut overrides = CliOverrides {
        namespace: cli.global.namespace.clone(),
        kubeconfig: cli.global.kubeconfig.clone(),
        context: cli.global.context.clone(),
        quiet: cli.global.quiet,
        ..CliOverrides::default()
    };
    match &cli.command {
        Commands::Build { timeout, output_dir, .. } => {
            overrides.build_timeout_minutes = *timeout;
            overrides.output_dir = output_dir.clone();
        }
        Commands::Download { output_dir, .. } => {
            overrides.output_dir = output_dir.clone();
        }
        Commands::List | Commands::Show { .. } => {}
    }

    let config = ClientConfig::load(cli.global.config_file.as_deref(), &overrides)?;
    let kubectl = Kubectl::new(config.kubectl.clone());
    let store = KubectlStore::new(kubectl.clone());
    let exec = KubectlExec::new(kubectl);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Build {
            name,
            manifest,
            distro,
            target,
            arch,
            export_format,
            mode,
            osbuild_image,
            storage_class,
            wait,
            download,
            ..
        } => {
            let params = BuildParams {
                distro,
                target,
                architecture: arch,
                export_format,
                mode,
                builder_image: osbuild_image,
                storage_class,
                wait,
                download,
                ..BuildParams::new(name, manifest)
            };
            if let Some(build) = run_build(&store, &exec, &config, &params, &mut out)? {
                info!(build = build.name(), "build completed successfully");
            }
            Ok(())
        }
        Commands::Download { name, .. } => {
            let path = download_completed_build(&store, &exec, &config, &name, &mut out)?;
            writeln!(out, "Artifact downloaded to {}", path.display()).map_err(stdout_error)
        }
        Commands::List => {
            let builds = store.list_builds(&config.namespace)?;
            write_build_table(&mut out, &config.namespace, &builds).map_err(stdout_error)
        }
        Commands::Show { name } => {
            let build = store
                .get_build(&config.namespace, &name)?
                .ok_or_else(|| StoreError::NotFound {
                    kind: "ImageBuild",
                    name: name.clone(),
                })?;
            write_build_details(&mut out, &build).map_err(stdout_error)
        }
    }
}

fn stdout_error(e: io::Error) -> CaibError {
    CaibError::io("error writing output", e)
}
