//! ucem - URL classifier exceptions manager
//!
//! Manages the `url-classifier-exceptions` Remote Settings collection and
//! the Bugzilla site reports that feed it.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use ucem_core::config::{
    BUCKET, BUGZILLA_REST_LOCATION, COLLECTION, DEFAULT_COMPONENT, DEFAULT_PRODUCT,
};
use ucem_core::{BugList, Tier};
use ucem_sync::lifecycle::{self, FIXED_RESOLUTION};
use ucem_sync::{
    Auth, BugAction, BugQuery, BugTracker, BugzillaClient, BugzillaConfig, DerivationRun,
    PublishedSnapshotClient, Reconciler, RemoteSettingsClient, Removal,
};

mod console;
mod display;
mod input;

use console::ConsolePrompt;
use input::ClosePreset;

/// Manage URL classifier exceptions on Remote Settings
#[derive(Parser, Debug)]
#[command(name = "ucem")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Which Remote Settings server to talk to.
#[derive(Args, Debug)]
struct ServerArgs {
    /// Server tier (dev, stage or prod)
    #[arg(long)]
    server: Tier,

    /// Override the tier's server URL
    #[arg(long)]
    server_location: Option<String>,

    /// `user:password`, a bearer token, or a full `Bearer …` header value
    #[arg(long, env = "REMOTE_SETTINGS_AUTH", hide_env_values = true)]
    auth: Option<String>,
}

impl ServerArgs {
    fn client(&self) -> RemoteSettingsClient {
        let location = self
            .server_location
            .as_deref()
            .unwrap_or(self.server.server_location());
        RemoteSettingsClient::new(
            location,
            self.auth.as_deref().map(Auth::from_token),
            BUCKET,
            COLLECTION,
        )
    }
}

#[derive(Args, Debug)]
struct BugzillaArgs {
    /// Bugzilla REST API root
    #[arg(long, default_value = BUGZILLA_REST_LOCATION)]
    bugzilla_url: String,

    /// Bugzilla API key, required to modify bugs
    #[arg(long, env = "BZ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl BugzillaArgs {
    fn client(&self) -> BugzillaClient {
        BugzillaClient::new(BugzillaConfig {
            base_url: self.bugzilla_url.clone(),
            api_key: self.api_key.clone(),
        })
    }
}

/// Bugs to act on: one id or a file of ids.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct BugTarget {
    /// A single bug id
    #[arg(long)]
    bug_id: Option<u64>,

    /// File with one bug id per line
    #[arg(long)]
    bug_ids_file: Option<PathBuf>,
}

impl BugTarget {
    fn bug_ids(&self) -> Result<Vec<u64>> {
        match (&self.bug_id, &self.bug_ids_file) {
            (Some(id), _) => Ok(vec![*id]),
            (None, Some(path)) => input::read_bug_ids(path),
            (None, None) => bail!("either --bug-id or --bug-ids-file is required"),
        }
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct CloseComment {
    /// Closing comment
    #[arg(long)]
    message: Option<String>,

    /// Use a canned closing comment
    #[arg(long, value_enum)]
    preset: Option<ClosePreset>,
}

impl CloseComment {
    fn text(&self) -> String {
        match (&self.message, self.preset) {
            (Some(message), _) => message.clone(),
            (None, Some(preset)) => preset.message().to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all exceptions
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        server: ServerArgs,

        /// Print a JSON array only
        #[arg(long)]
        json: bool,
    },

    /// Add or update exceptions from a JSON file
    Add {
        /// JSON array of exceptions
        json_file: PathBuf,

        #[command(flatten)]
        server: ServerArgs,

        /// Skip confirmation prompts
        #[arg(long)]
        force: bool,
    },

    /// Remove exceptions by id, or all of them
    Remove {
        /// Exception ids
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        exception_ids: Vec<String>,

        /// Remove every exception
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        server: ServerArgs,

        /// Skip confirmation prompts
        #[arg(long)]
        force: bool,
    },

    /// Dump open site-report bugs as JSON
    BzInfo {
        #[arg(long, default_value = DEFAULT_PRODUCT)]
        product: String,

        #[arg(long, default_value = DEFAULT_COMPONENT)]
        component: String,

        #[command(flatten)]
        bugzilla: BugzillaArgs,
    },

    /// Close bugs with a comment
    BzClose {
        #[command(flatten)]
        target: BugTarget,

        #[arg(long, default_value = FIXED_RESOLUTION)]
        resolution: String,

        #[command(flatten)]
        comment: CloseComment,

        /// Print what would be sent without touching the bugs
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        bugzilla: BugzillaArgs,
    },

    /// Request info from someone on bugs
    BzNi {
        #[command(flatten)]
        target: BugTarget,

        #[arg(long)]
        message: String,

        /// Bugzilla login to needinfo
        #[arg(long)]
        requestee: String,

        /// Print what would be sent without touching the bugs
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        bugzilla: BugzillaArgs,
    },

    /// Derive exceptions from diagnosed bugs, deploy them, and close out
    /// bugs whose exceptions are live
    Auto {
        #[command(flatten)]
        server: ServerArgs,

        #[command(flatten)]
        bugzilla: BugzillaArgs,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompts
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    run(cli.command).await
}

async fn run(command: Commands) -> Result<()> {
    let prompt = ConsolePrompt;

    match command {
        Commands::List { server, json } => {
            let client = server.client();
            let rules = ucem_sync::store::list_rules(&client)
                .await
                .with_context(|| format!("listing exceptions on {}", client.collection_url()))?;
            if json {
                println!("{}", display::rules_json(&rules)?);
            } else {
                println!("{}", display::rule_listing(&rules)?);
            }
        }

        Commands::Add {
            json_file,
            server,
            force,
        } => {
            let desired = input::load_rules_file(&json_file)?;
            let client = server.client();
            let outcome = Reconciler::new(&client, &prompt, server.server)
                .reconcile_and_apply(desired, force)
                .await
                .context("applying exceptions")?;
            println!("{}", display::apply_outcome(&outcome));
        }

        Commands::Remove {
            exception_ids,
            all,
            server,
            force,
        } => {
            let removal = if all {
                Removal::All
            } else {
                Removal::Ids(exception_ids)
            };
            let target = display::removal_target(&removal);
            let client = server.client();
            let outcome = Reconciler::new(&client, &prompt, server.server)
                .remove_rules(removal, force)
                .await
                .context("removing exceptions")?;
            println!("{}", display::remove_outcome(&outcome, &target));
        }

        Commands::BzInfo {
            product,
            component,
            bugzilla,
        } => {
            let bugs = bugzilla
                .client()
                .query_bugs(&BugQuery::open_bugs(product, component))
                .await
                .context("querying Bugzilla")?;
            let value = serde_json::to_value(BugList { bugs })?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }

        Commands::BzClose {
            target,
            resolution,
            comment,
            dry_run,
            bugzilla,
        } => {
            let comment = comment.text();
            let actions = target
                .bug_ids()?
                .into_iter()
                .map(|bug_id| BugAction::Close {
                    bug_id,
                    resolution: resolution.clone(),
                    comment: comment.clone(),
                })
                .collect();
            send_all(&bugzilla.client(), &prompt, actions, dry_run).await?;
        }

        Commands::BzNi {
            target,
            message,
            requestee,
            dry_run,
            bugzilla,
        } => {
            let actions = target
                .bug_ids()?
                .into_iter()
                .map(|bug_id| BugAction::NeedInfo {
                    bug_id,
                    requestee: requestee.clone(),
                    comment: message.clone(),
                })
                .collect();
            send_all(&bugzilla.client(), &prompt, actions, dry_run).await?;
        }

        Commands::Auto {
            server,
            bugzilla,
            dry_run,
            force,
        } => {
            let store = server.client();
            let snapshots = PublishedSnapshotClient::new();
            let tracker = bugzilla.client();
            let report = DerivationRun::new(&store, &snapshots, &tracker, &prompt, server.server)
                .run(dry_run, force)
                .await
                .context("automatic exception run")?;
            println!("{}", display::derivation_report(&report));
            let clean = report.is_clean();
            if let Some(e) = report.apply_error {
                return Err(anyhow::Error::new(e).context("writing derived exceptions"));
            }
            if !clean {
                bail!("some bug updates failed");
            }
        }
    }

    Ok(())
}

/// Perform each action in turn; a failing bug is logged and the rest still run.
async fn send_all(
    tracker: &dyn BugTracker,
    prompt: &ConsolePrompt,
    actions: Vec<BugAction>,
    dry_run: bool,
) -> Result<()> {
    let mut failed = 0usize;
    for action in &actions {
        if let Err(e) = lifecycle::perform(tracker, prompt, action, dry_run).await {
            error!(bug_id = action.bug_id(), error = %e, "bug update failed");
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} bug update(s) failed", actions.len());
    }
    Ok(())
}
