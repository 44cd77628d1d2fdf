//! # SAF Site CLI (`saf`)
//!
//! The `saf` binary manages the SAF site's content catalog in Pocketbase or
//! a local SQLite database.
//!
//! ## Usage
//!
//! ```bash
//! saf --config ./config/saf.toml [--json | --quiet] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `saf init` | Create the SQLite database and schema |
//! | `saf content list\|show\|add\|update` | Manage content records |
//! | `saf table list\|show\|add\|update\|delete` | Raw CRUD on any table |
//! | `saf db status\|lookups\|validate\|audit` | Inspect and check the store |
//!
//! Results go to stdout. Warnings, errors, and logs (`RUST_LOG`) go to
//! stderr. Any failure exits with status 1.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use saf_site::config;
use saf_site::content::{self, ContentAddInput, ContentOverrides, ContentUpdateInput};
use saf_site::db_cmd;
use saf_site::github::GitHubClient;
use saf_site::migrate;
use saf_site::models::{AutomationLevel, ContentType, FkField, LookupCategory, Status};
use saf_site::output::{self, OutputFormat};
use saf_site::store::{self, ListQuery, SortOrder};
use saf_site::table;

/// SAF site content management CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/saf.example.toml` for a full example. A missing file
/// means defaults plus `PB_*` / `GITHUB_TOKEN` environment variables.
#[derive(Parser)]
#[command(
    name = "saf",
    about = "SAF site content management: FK resolution, diffing, and CRUD over Pocketbase or SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/saf.toml")]
    config: PathBuf,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Print only ids.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the SQLite database schema.
    ///
    /// Idempotent; running it on an existing database is safe.
    Init,

    /// Manage content records (validation profiles and hardening guides).
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },

    /// Generic CRUD over any table.
    Table {
        #[command(subcommand)]
        action: TableAction,
    },

    /// Inspect and check the record store.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// FK reference names shared by `content add` and `content update`.
#[derive(clap::Args)]
struct ReferenceArgs {
    /// Vendor organization name.
    #[arg(long)]
    vendor: Option<String>,
    /// Standard name (e.g. "DISA STIG").
    #[arg(long)]
    standard: Option<String>,
    /// Technology name (e.g. "InSpec").
    #[arg(long)]
    technology: Option<String>,
    /// Target platform name.
    #[arg(long)]
    target: Option<String>,
    /// Maintaining team name.
    #[arg(long)]
    maintainer: Option<String>,
    /// Tag name; repeatable.
    #[arg(long = "tag")]
    tags: Vec<String>,
}

impl ReferenceArgs {
    fn references(&self) -> BTreeMap<FkField, String> {
        [
            (FkField::Vendor, &self.vendor),
            (FkField::Standard, &self.standard),
            (FkField::Technology, &self.technology),
            (FkField::Target, &self.target),
            (FkField::Maintainer, &self.maintainer),
        ]
        .into_iter()
        .filter_map(|(field, name)| name.clone().map(|n| (field, n)))
        .collect()
    }

    fn tags(&self) -> BTreeSet<String> {
        self.tags.iter().cloned().collect()
    }
}

#[derive(Subcommand)]
enum ContentAction {
    /// List content records, newest first.
    List {
        /// Only this content type (`validation` or `hardening`).
        #[arg(long = "type")]
        content_type: Option<ContentType>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Include referenced entities in JSON output.
        #[arg(long)]
        expand: bool,
    },

    /// Show one content record.
    Show {
        id: String,
        /// Include referenced entities in JSON output.
        #[arg(long)]
        expand: bool,
    },

    /// Add content from a GitHub repository.
    ///
    /// Reads repository metadata, `inspec.yml`, and the README, resolves
    /// reference names to ids, and validates. If a record with the same
    /// slug exists, only changed fields are written.
    Add {
        /// Repository URL, e.g. https://github.com/mitre/rhel-9-stig-baseline
        url: String,
        #[arg(long = "type")]
        content_type: ContentType,
        #[command(flatten)]
        refs: ReferenceArgs,
        /// Override the name.
        #[arg(long)]
        name: Option<String>,
        /// Override the generated slug.
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Version without a "v" prefix.
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        control_count: Option<i64>,
        #[arg(long)]
        automation_level: Option<AutomationLevel>,
        /// DISA STIG identifier, e.g. RHEL-09-010001.
        #[arg(long)]
        stig_id: Option<String>,
        /// Benchmark version, e.g. V1R3.
        #[arg(long)]
        benchmark_version: Option<String>,
        /// Prepare and validate without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Update fields of a content record. Only changed fields are written;
    /// an empty reference name (`--vendor ""`) clears the reference.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Version without a "v" prefix; "" clears it.
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        control_count: Option<i64>,
        #[arg(long)]
        automation_level: Option<AutomationLevel>,
        /// "" clears it.
        #[arg(long)]
        stig_id: Option<String>,
        /// "" clears it.
        #[arg(long)]
        benchmark_version: Option<String>,
        #[command(flatten)]
        refs: ReferenceArgs,
        /// Remove all tags.
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
        /// Refresh the README and control count from GitHub.
        #[arg(long)]
        sync_readme: bool,
    },
}

#[derive(Subcommand)]
enum TableAction {
    /// List records of a table.
    List {
        table: String,
        /// Equality filter as `field=value`; repeatable.
        #[arg(long = "filter", value_parser = table::parse_filter)]
        filters: Vec<(String, String)>,
        /// Field to sort by.
        #[arg(long)]
        sort: Option<String>,
        /// `asc` or `desc`.
        #[arg(long, default_value = "asc")]
        order: SortOrder,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one record.
    Show { table: String, id: String },
    /// Create a record from a JSON object.
    Add {
        table: String,
        #[arg(long)]
        data: String,
    },
    /// Patch a record with the fields of a JSON object.
    Update {
        table: String,
        id: String,
        #[arg(long)]
        data: String,
    },
    /// Delete a record.
    Delete {
        table: String,
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Check the backend and count records per collection.
    Status,
    /// Show name → id lookup values.
    Lookups {
        /// One collection (organizations, standards, ...); all when omitted.
        collection: Option<LookupCategory>,
    },
    /// Check required fields and that every FK reference exists.
    Validate,
    /// Audit content slugs against naming conventions.
    Audit {
        /// Show suggested slugs.
        #[arg(long)]
        fix: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    output::init_tracing();
    let format = OutputFormat::from_flags(cli.json, cli.quiet);

    if let Err(err) = run(cli, format).await {
        output::report_error(format, &err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, format: OutputFormat) -> anyhow::Result<()> {
    let cfg = config::load_config_or_default(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        match format {
            OutputFormat::Json => format.print_json(&serde_json::json!({
                "success": true,
                "database": cfg.db.path.display().to_string(),
            }))?,
            _ => format.info("Database initialized successfully."),
        }
        return Ok(());
    }

    let store = store::open_store(&cfg).await?;
    let store = store.as_ref();

    match cli.command {
        Commands::Init => {}
        Commands::Content { action } => match action {
            ContentAction::List {
                content_type,
                limit,
                expand,
            } => {
                content::run_content_list(store, content_type, limit, expand, format).await?;
            }
            ContentAction::Show { id, expand } => {
                content::run_content_show(store, &id, expand, format).await?;
            }
            ContentAction::Add {
                url,
                content_type,
                refs,
                name,
                slug,
                description,
                version,
                status,
                control_count,
                automation_level,
                stig_id,
                benchmark_version,
                dry_run,
            } => {
                let input = ContentAddInput {
                    github_url: url,
                    content_type,
                    references: refs.references(),
                    tags: refs.tags(),
                    overrides: ContentOverrides {
                        name,
                        slug,
                        description,
                        version,
                        status,
                        control_count,
                        automation_level,
                        stig_id,
                        benchmark_version,
                    },
                };
                let github = GitHubClient::new(&cfg.github)?;
                content::run_content_add(store, &github, &input, dry_run, format).await?;
            }
            ContentAction::Update {
                id,
                name,
                description,
                version,
                status,
                control_count,
                automation_level,
                stig_id,
                benchmark_version,
                refs,
                clear_tags,
                sync_readme,
            } => {
                let tags = if clear_tags {
                    Some(BTreeSet::new())
                } else if refs.tags.is_empty() {
                    None
                } else {
                    Some(refs.tags())
                };
                let input = ContentUpdateInput {
                    name,
                    description,
                    version,
                    status,
                    control_count,
                    automation_level,
                    stig_id,
                    benchmark_version,
                    references: refs.references(),
                    tags,
                    sync_readme,
                };
                let github = GitHubClient::new(&cfg.github)?;
                content::run_content_update(store, &github, &id, &input, format).await?;
            }
        },
        Commands::Table { action } => match action {
            TableAction::List {
                table: name,
                filters,
                sort,
                order,
                limit,
            } => {
                let mut query = ListQuery {
                    filters,
                    limit,
                    ..ListQuery::default()
                };
                if let Some(field) = sort {
                    query = query.sort_by(field, order);
                }
                table::run_table_list(store, &name, &query, format).await?;
            }
            TableAction::Show { table: name, id } => {
                table::run_table_show(store, &name, &id, format).await?;
            }
            TableAction::Add { table: name, data } => {
                table::run_table_add(store, &name, &data, format).await?;
            }
            TableAction::Update {
                table: name,
                id,
                data,
            } => {
                table::run_table_update(store, &name, &id, &data, format).await?;
            }
            TableAction::Delete {
                table: name,
                id,
                yes,
            } => {
                table::run_table_delete(store, &name, &id, yes, format).await?;
            }
        },
        Commands::Db { action } => match action {
            DbAction::Status => db_cmd::run_db_status(store, format).await?,
            DbAction::Lookups { collection } => {
                db_cmd::run_db_lookups(store, collection, format).await?
            }
            DbAction::Validate => db_cmd::run_db_validate(store, format).await?,
            DbAction::Audit { fix } => db_cmd::run_db_audit(store, fix, format).await?,
        },
    }

    Ok(())
}
