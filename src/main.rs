//! CLI entry point for contenthub

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contenthub::commands::{self, query::QueryArgs};
use contenthub::ContentHub;

#[derive(Parser)]
#[command(name = "contenthub")]
#[command(version)]
#[command(about = "Browse and edit front-matter content in a directory or GitHub repository", long_about = None)]
struct Cli {
    /// Set the base directory holding content.yml (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every item
    #[command(alias = "ls")]
    List,

    /// Filter, sort and paginate items
    #[command(alias = "q")]
    Query {
        /// Only items under this directory
        #[arg(long)]
        dir: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        tag: Option<String>,

        #[arg(long)]
        author: Option<String>,

        /// Only featured items
        #[arg(long)]
        featured: bool,

        /// Only unpublished items
        #[arg(long)]
        drafts: bool,

        /// Earliest date (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Latest date (inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Words that must all appear in the item
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long)]
        locale: Option<String>,

        /// Sort field (title, author, last_modified, date)
        #[arg(long)]
        sort: Option<String>,

        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,

        #[arg(long)]
        skip: Option<usize>,

        #[arg(long)]
        take: Option<usize>,
    },

    /// Print the directory tree
    Tree {
        /// Only directories for this locale
        #[arg(long)]
        locale: Option<String>,
    },

    /// List tags with item counts
    Tags,

    /// List categories with item counts
    Categories,

    /// Show one item by path or URL
    Show {
        path: String,

        /// Render the body to HTML
        #[arg(long)]
        html: bool,
    },

    /// Create a new item or directory
    New {
        /// Title of the new item or directory
        title: String,

        /// Directory to create the item in
        #[arg(short = 'D', long)]
        dir: Option<String>,

        /// Explicit path of the new file or directory
        #[arg(short, long)]
        path: Option<String>,

        /// Create a directory instead of an item
        #[arg(long)]
        directory: bool,
    },

    /// Delete an item, or a directory with --recursive
    Rm {
        path: String,

        #[arg(short, long)]
        recursive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "contenthub=debug,info"
    } else {
        "contenthub=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let hub = ContentHub::new(&base_dir)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::List => commands::list::items(&hub, &cancel).await?,

        Commands::Query {
            dir,
            category,
            tag,
            author,
            featured,
            drafts,
            from,
            to,
            search,
            locale,
            sort,
            asc,
            skip,
            take,
        } => {
            let args = QueryArgs {
                directory: dir,
                category,
                tag,
                author,
                featured,
                drafts,
                from,
                to,
                search,
                locale,
                sort,
                ascending: asc,
                skip,
                take,
            };
            commands::query::run(&hub, &args, &cancel).await?;
        }

        Commands::Tree { locale } => {
            commands::list::tree(&hub, locale.as_deref(), &cancel).await?
        }

        Commands::Tags => commands::list::tags(&hub, &cancel).await?,

        Commands::Categories => commands::list::categories(&hub, &cancel).await?,

        Commands::Show { path, html } => commands::show::run(&hub, &path, html, &cancel).await?,

        Commands::New {
            title,
            dir,
            path,
            directory,
        } => {
            if directory {
                let path = match path {
                    Some(path) => path,
                    None => contenthub::helpers::join_path(
                        dir.as_deref().unwrap_or(""),
                        &contenthub::helpers::slugify(&title),
                    ),
                };
                tracing::info!("Creating directory {}", path);
                commands::new::create_directory(&hub, &path, Some(&title), &cancel).await?;
            } else {
                tracing::info!("Creating new item with title: {}", title);
                commands::new::create_item(&hub, &title, dir.as_deref(), path.as_deref(), &cancel)
                    .await?;
            }
        }

        Commands::Rm { path, recursive } => {
            commands::remove::run(&hub, &path, recursive, &cancel).await?
        }
    }

    Ok(())
}
