//! Command-line entrypoint that resolves one environment of the Base Layer
//! Capital application and synthesizes its deployment manifest.
use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use colored::Colorize;
use deploy::{
    aws,
    collaborator::{AwsCollaborators, StaticCollaborators},
    config::{self, RawInputs, Settings},
    stack::{self, Resolved},
    synth::Synth,
    Deployment, Error,
};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the verbosity level
    #[clap(short, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    /// Name of the environment, eg `dev` or `feature-7`.
    #[clap(long, env = "ENV_NAME", global = true)]
    env_name: Option<String>,

    /// Type of the environment, one of dev, staging or prd.
    #[clap(long, env = "ENV_TYPE", global = true)]
    env_type: Option<String>,

    #[clap(long, env = "AWS_ACCOUNT_ID", global = true)]
    account_id: Option<String>,

    #[clap(long, env = "AWS_REGION", global = true)]
    region: Option<String>,

    /// Named profile used to deploy.
    #[clap(long, env = "AWS_PROFILE", global = true)]
    profile: Option<String>,

    /// Path to a TOML settings file. Defaults apply when omitted.
    #[clap(long, global = true)]
    settings: Option<PathBuf>,

    /// Answer lookups from the settings file instead of querying AWS.
    #[clap(long, global = true)]
    offline: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved environment context.
    Context,
    /// Print the provisioning plan.
    Plan,
    /// Write the deployment manifest.
    Synth {
        #[clap(long, default_value = "cdk.out")]
        out_dir: PathBuf,
    },
}

impl Cli {
    fn inputs(&self) -> RawInputs {
        RawInputs {
            env_name: self.env_name.clone(),
            env_type: self.env_type.clone(),
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            credential: self.profile.clone(),
        }
    }

    fn settings(&self) -> Result<Settings, Error> {
        match &self.settings {
            Some(path) => Settings::from_file(path),
            None => Ok(Settings::default()),
        }
    }
}

async fn compose(
    cli: &Cli,
    settings: &Settings,
    out_dir: PathBuf,
) -> Result<(Resolved, Deployment<Synth>), Error> {
    let inputs = cli.inputs();
    // Fail on bad inputs before loading any credentials
    let ctx = config::resolve(&inputs, settings)?;
    if cli.offline {
        let collaborators = StaticCollaborators {
            hosted_zone_id: settings.hosted_zone_id.clone(),
        };
        stack::compose(&inputs, settings, &collaborators, out_dir).await
    } else {
        let cfg = aws::load_config(&ctx.region, &ctx.credential).await;
        let collaborators = AwsCollaborators::new(cfg);
        stack::compose(&inputs, settings, &collaborators, out_dir).await
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let settings = cli.settings()?;
    match &cli.command {
        Command::Context => {
            let ctx = config::resolve(&cli.inputs(), &settings)?;
            let json = serde_json::to_string_pretty(&ctx).map_err(|source| Error::Serialize {
                name: "context".to_owned(),
                source,
            })?;
            println!("{json}");
        }
        Command::Plan => {
            let (resolved, mut deployment) = compose(&cli, &settings, PathBuf::from("cdk.out")).await?;
            let plan = deployment.plan()?;
            println!(
                "{} '{}' ({}), {} descriptors",
                "environment".bold(),
                resolved.ctx.name,
                resolved.ctx.env_type,
                plan.len()
            );
            print!("{plan}");
        }
        Command::Synth { out_dir } => {
            let (resolved, mut deployment) = compose(&cli, &settings, out_dir.clone()).await?;
            let plan = deployment.plan()?;
            log::info!("plan:\n{plan}");
            let manifest = deployment.apply(plan).await?;
            println!(
                "{} {} descriptors of '{}' into {}",
                "synthesized".green().bold(),
                manifest.entries.len(),
                resolved.ctx.name,
                out_dir.display()
            );
        }
    }
    Ok(())
}

#[::tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("deploy", level)
        .filter_module("infra", level)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
