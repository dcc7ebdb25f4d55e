use anyhow::Context;
use clap::{Parser, Subcommand};
use lineage_search::{
    config::Config,
    index::{ElasticsearchEngine, IndexConvention},
    models::{EntityRegistry, Filter, SearchFlags, SearchRequest},
    search::{InMemoryGraph, SearchService},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_REGISTRY: &str = include_str!("../../config/entity-registry.yml");

#[derive(Parser)]
#[command(name = "lineage-search-cli")]
#[command(about = "Lineage search query compiler and index client", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "LINEAGE_SEARCH_CONFIG")]
    config: Option<String>,

    /// Entity registry YAML; the bundled registry when absent
    #[arg(short, long)]
    registry: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the physical index of an entity (or of one of its timeseries aspects)
    IndexName {
        #[arg(value_name = "ENTITY")]
        entity: String,

        #[arg(short, long)]
        aspect: Option<String>,

        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Print the entity stored in a physical index
    EntityName {
        #[arg(value_name = "INDEX")]
        index: String,

        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Print the index query a search compiles to
    Compile {
        #[arg(short, long)]
        entity: String,

        #[arg(short, long, default_value = "*")]
        input: String,

        /// Filter as JSON, e.g. '{"or":[{"and":[{"field":"platform","value":"hive"}]}]}'
        #[arg(short, long)]
        filter: Option<String>,

        /// Compile as a structured query on the default field
        #[arg(long)]
        structured: bool,
    },

    /// Search an Elasticsearch endpoint
    Search {
        /// Entity types; all registered types when absent
        #[arg(short, long)]
        entity: Vec<String>,

        #[arg(short, long, default_value = "*")]
        input: String,

        #[arg(short, long)]
        filter: Option<String>,

        #[arg(long, default_value = "0")]
        from: usize,

        #[arg(short, long, default_value = "10")]
        size: usize,

        /// Overrides `elasticsearch.url`
        #[arg(short, long)]
        url: Option<String>,

        /// Dump Prometheus metrics to stderr afterwards
        #[arg(long)]
        metrics: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("lineage_search={}", config.observability.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_registry(path: Option<&str>) -> anyhow::Result<EntityRegistry> {
    let yaml = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading entity registry {}", path))?,
        None => DEFAULT_REGISTRY.to_string(),
    };
    Ok(EntityRegistry::from_yaml_str(&yaml)?)
}

fn parse_filter(filter: Option<&str>) -> anyhow::Result<Filter> {
    match filter {
        Some(json) => serde_json::from_str(json).context("parsing --filter"),
        None => Ok(Filter::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading configuration")?;
    config.validate_all()?;
    init_tracing(&config);
    lineage_search::metrics::init_metrics().context("registering metrics")?;

    match cli.command {
        Commands::IndexName {
            entity,
            aspect,
            prefix,
        } => {
            let convention = IndexConvention::new(prefix.as_deref().or(config.index.prefix.as_deref()));
            let name = match aspect {
                Some(aspect) => convention.timeseries_aspect_index_name(&entity, &aspect),
                None => convention.entity_index_name(&entity),
            };
            println!("{}", name);
        }

        Commands::EntityName { index, prefix } => {
            let convention = IndexConvention::new(prefix.as_deref().or(config.index.prefix.as_deref()));
            match convention.entity_name_from_index(&index) {
                Some(entity) => println!("{}", entity),
                None => anyhow::bail!("'{}' is not an entity index", index),
            }
        }

        Commands::Compile {
            entity,
            input,
            filter,
            structured,
        } => {
            let registry = load_registry(cli.registry.as_deref())?;
            let spec = registry.require(&entity)?;
            let request = SearchRequest::new(input)
                .with_filter(parse_filter(filter.as_deref())?)
                .with_flags(SearchFlags::default().with_fulltext(!structured));
            let compiled = lineage_search::query::QueryCompiler::new(config.search.clone())
                .compile(&spec, &request)?;
            println!("{}", serde_json::to_string_pretty(&compiled.to_json())?);
        }

        Commands::Search {
            entity,
            input,
            filter,
            from,
            size,
            url,
            metrics,
        } => {
            let mut es_config = config.elasticsearch.clone();
            if let Some(url) = url {
                es_config.url = url;
            }
            let engine = ElasticsearchEngine::new(&es_config)?;
            let service = SearchService::new(
                &config,
                Arc::new(load_registry(cli.registry.as_deref())?),
                Arc::new(engine),
                Arc::new(InMemoryGraph::new()),
            );
            let request = SearchRequest::new(input)
                .with_filter(parse_filter(filter.as_deref())?)
                .with_page(from, size);
            let result = service.search(&entity, &request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if metrics {
                eprint!("{}", lineage_search::metrics::gather_metrics());
            }
        }

        Commands::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
