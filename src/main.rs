use anyhow::Result;
use clap::Parser;
use pdkm::commands::{self, BuildArgs, FetchArgs, PushArgs, config::{Config, ConfigOptions}};
use pdkm::error::PdkError;
use pdkm::progress::default_reporter;
use std::path::PathBuf;
use std::process::ExitCode;

/// pdkm - PDK version manager
///
/// Download, build and switch between versions of open-source process design kits.
///
/// Set VOLARE_GH_TOKEN or GITHUB_TOKEN to authenticate against GitHub. This
/// avoids rate limits and is required for `push`.
///
/// Examples:
///   pdkm enable 0fe599b2afb6708d281543108caf8310912f54af
///   pdkm --pdk gf180mcu ls-remote
#[derive(Parser, Debug)]
#[command(author, version = env!("PDKM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding installed PDKs (also via PDK_ROOT; defaults to ~/.volare)
    #[arg(long = "pdk-root", value_name = "PATH", global = true)]
    pub pdk_root: Option<PathBuf>,

    /// PDK family (also via PDK_FAMILY; defaults to sky130)
    #[arg(long = "pdk", value_name = "FAMILY", global = true)]
    pub pdk: Option<String>,

    /// Owner of the release repository (also via VOLARE_REPO_OWNER)
    #[arg(long = "owner", value_name = "OWNER", global = true)]
    pub owner: Option<String>,

    /// Name of the release repository (also via VOLARE_REPO_NAME)
    #[arg(long = "repository", value_name = "NAME", global = true)]
    pub repository: Option<String>,

    /// GitHub API URL (defaults to https://api.github.com)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Number of concurrent jobs
    #[arg(long = "jobs", short = 'j', value_name = "N", global = true)]
    pub jobs: Option<usize>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the enabled version
    Output,

    /// Print the directory of a version (the enabled one by default)
    Path(PathArgs),

    /// List installed versions
    Ls,

    /// List versions available for download
    #[command(name = "ls-remote")]
    LsRemote,

    /// Download a version without enabling it
    Fetch(EnableArgs),

    /// Enable a version, downloading it first if needed
    Enable(EnableArgs),

    /// Disable the enabled version
    Disable,

    /// Delete an installed version
    Rm(VersionArgs),

    /// Delete every installed version except the enabled one
    Prune(PruneArgs),

    /// Build a version from source
    Build(BuildCommandArgs),

    /// Publish an installed version as a release
    Push(PushCommandArgs),
}

#[derive(clap::Args, Debug)]
pub struct VersionArgs {
    /// Version (open_pdks commit); read from tool_metadata.yml if omitted
    #[arg(value_name = "VERSION")]
    pub version: Option<String>,

    /// Explicit tool_metadata.yml to read the version from
    #[arg(long = "metadata-file", value_name = "PATH")]
    pub metadata_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct PathArgs {
    #[arg(value_name = "VERSION")]
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct LibraryArgs {
    /// Libraries to include; "all" or "default" are accepted (repeatable)
    #[arg(
        long = "include-libraries",
        short = 'l',
        value_name = "LIBRARY",
        value_delimiter = ','
    )]
    pub libraries: Option<Vec<String>>,
}

#[derive(clap::Args, Debug)]
pub struct BuilderArgs {
    /// Shell command that builds the PDK inside the source checkout
    #[arg(long = "build-command", env = "PDKM_BUILD_COMMAND", value_name = "COMMAND")]
    pub build_command: Option<String>,

    /// Use an existing source checkout instead of cloning
    #[arg(long = "use-repo-at", value_name = "PATH")]
    pub use_repo_at: Option<PathBuf>,

    /// Delete the build directory once the build is installed
    #[arg(long = "clear-build-artifacts")]
    pub clear_build_artifacts: bool,
}

#[derive(clap::Args, Debug)]
pub struct EnableArgs {
    #[command(flatten)]
    pub version: VersionArgs,

    #[command(flatten)]
    pub libraries: LibraryArgs,

    /// Build the version if no release exists
    #[arg(long = "build")]
    pub build: bool,

    /// Publish the version after building it
    #[arg(long = "push", requires = "build")]
    pub push: bool,

    #[command(flatten)]
    pub builder: BuilderArgs,
}

#[derive(clap::Args, Debug)]
pub struct PruneArgs {
    /// Do not ask for confirmation
    #[arg(long = "yes", short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct BuildCommandArgs {
    #[command(flatten)]
    pub version: VersionArgs,

    #[command(flatten)]
    pub libraries: LibraryArgs,

    #[command(flatten)]
    pub builder: BuilderArgs,
}

#[derive(clap::Args, Debug)]
pub struct PushCommandArgs {
    #[command(flatten)]
    pub version: VersionArgs,

    #[command(flatten)]
    pub libraries: LibraryArgs,

    /// Mark the release as a pre-release
    #[arg(long = "pre")]
    pub prerelease: bool,
}

impl From<EnableArgs> for FetchArgs {
    fn from(args: EnableArgs) -> Self {
        FetchArgs {
            version: args.version.version,
            metadata_file: args.version.metadata_file,
            libraries: args.libraries.libraries,
            build: args.build,
            push: args.push,
            build_command: args.builder.build_command,
            use_repo_at: args.builder.use_repo_at,
            clear_build_artifacts: args.builder.clear_build_artifacts,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if PdkError::is_interrupted(&e) => ExitCode::from(130),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let runtime = pdkm::runtime::RealRuntime;
    let config = Config::new(
        &runtime,
        ConfigOptions {
            pdk_root: cli.pdk_root,
            pdk: cli.pdk,
            owner: cli.owner,
            repository: cli.repository,
            api_url: cli.api_url,
            jobs: cli.jobs,
        },
    )?;
    let reporter = default_reporter();

    match cli.command {
        Commands::Output => commands::output(&runtime, &config)?,
        Commands::Path(args) => commands::path(&runtime, &config, args.version)?,
        Commands::Ls => commands::ls(&runtime, &config, reporter.as_ref()).await?,
        Commands::LsRemote => commands::ls_remote(&runtime, &config).await?,
        Commands::Fetch(args) => commands::fetch(&runtime, &config, reporter, args.into()).await?,
        Commands::Enable(args) => commands::enable(&runtime, &config, reporter, args.into()).await?,
        Commands::Disable => commands::disable(&runtime, &config, reporter.as_ref())?,
        Commands::Rm(args) => commands::rm(
            &runtime,
            &config,
            reporter.as_ref(),
            args.version,
            args.metadata_file.as_deref(),
        )?,
        Commands::Prune(args) => commands::prune(&runtime, &config, reporter.as_ref(), args.yes)?,
        Commands::Build(args) => {
            commands::build(
                &runtime,
                &config,
                reporter,
                BuildArgs {
                    version: args.version.version,
                    metadata_file: args.version.metadata_file,
                    libraries: args.libraries.libraries,
                    build_command: args.builder.build_command,
                    use_repo_at: args.builder.use_repo_at,
                    clear_build_artifacts: args.builder.clear_build_artifacts,
                },
            )
            .await?
        }
        Commands::Push(args) => {
            commands::push(
                &runtime,
                &config,
                reporter,
                PushArgs {
                    version: args.version.version,
                    metadata_file: args.version.metadata_file,
                    libraries: args.libraries.libraries,
                    prerelease: args.prerelease,
                },
            )
            .await?
        }
    }
    Ok(())
}
