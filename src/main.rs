use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use soradb::document::{document_from_json_str, document_to_json, value_to_json};
use soradb::logging::init_logging;
use soradb::{SoraConfig, SoraDb, SortSpec};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Simple MongoDB client", long_about = None)]
struct Cli {
    /// Configuration file (defaults to soradb.toml or config/soradb.toml)
    #[arg(long, global = true, env = "SORADB_CONFIG")]
    config: Option<PathBuf>,

    /// MongoDB connection string
    #[arg(long, global = true)]
    url: Option<String>,

    /// Database name
    #[arg(long, global = true)]
    database: Option<String>,

    /// Collection name
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the server is reachable
    Ping,

    /// Show wrapper and driver versions
    Version {
        /// Also ask the server for its version
        #[arg(long)]
        server: bool,
    },

    /// Insert one or more JSON documents
    Insert {
        #[arg(required = true)]
        documents: Vec<String>,
    },

    /// Find documents
    Find {
        #[arg(long)]
        filter: Option<String>,

        #[arg(long)]
        projection: Option<String>,

        /// JSON object or list of [field, direction] pairs
        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Find the first matching document
    FindOne {
        #[arg(long)]
        filter: Option<String>,
    },

    /// Update documents matching a filter
    Update {
        filter: String,
        update: String,

        /// Update every match instead of the first
        #[arg(long)]
        many: bool,
    },

    /// Delete documents matching a filter
    Delete {
        filter: String,

        /// Delete every match instead of the first
        #[arg(long)]
        many: bool,
    },

    /// Count documents
    Count {
        #[arg(long)]
        filter: Option<String>,
    },

    /// List every document ordered by a field
    SortBy {
        field: String,

        #[arg(long)]
        desc: bool,
    },

    /// Print the value of a key from each document holding it
    Values { key: String },

    /// Drop a collection from the selected database
    Drop { collection: String },

    /// List collections in the selected database
    Collections,
}

impl Cli {
    fn load_config(&self) -> Result<SoraConfig> {
        let mut config = SoraConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        if let Some(ref url) = self.url {
            config.url = url.clone();
        }
        if let Some(ref database) = self.database {
            config.database = database.clone();
        }
        if let Some(ref collection) = self.collection {
            config.collection = collection.clone();
        }
        if self.log_json {
            config.log.json = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version { server: false } = cli.command {
        SoraDb::print_version();
        return Ok(());
    }

    let config = cli.load_config()?;
    let _log_guard = init_logging(&config.log)?;

    let mut db = SoraDb::new();
    db.connect_with_config(&config).await?;

    let outcome = run(&db, cli.command).await;
    db.disconnect().await;
    outcome
}

async fn run(db: &SoraDb, command: Commands) -> Result<()> {
    match command {
        Commands::Ping => {
            db.ping().await?;
            println!("ok");
        }
        Commands::Version { .. } => {
            SoraDb::print_version();
            println!("server: {}", db.server_version().await?);
        }
        Commands::Insert { documents } => {
            let documents = documents
                .iter()
                .map(|text| document_from_json_str(text))
                .collect::<soradb::Result<Vec<_>>>()?;

            let ids = if documents.len() == 1 {
                let document = documents.into_iter().next().context("no document")?;
                vec![db.insert_one(document).await?]
            } else {
                db.insert_many(documents).await?
            };
            for id in &ids {
                println!("{}", value_to_json(id));
            }
        }
        Commands::Find {
            filter,
            projection,
            sort,
            limit,
        } => {
            let sort = match sort {
                Some(text) => {
                    let json: serde_json::Value = serde_json::from_str(&text)?;
                    Some(SortSpec::try_from(json)?)
                }
                None => None,
            };
            let documents = db
                .find(
                    parse_optional(filter)?,
                    parse_optional(projection)?,
                    sort,
                    limit,
                )
                .await?;
            print_documents(&documents);
        }
        Commands::FindOne { filter } => match db.find_one(parse_optional(filter)?).await? {
            Some(document) => println!("{}", document_to_json(&document)),
            None => println!("null"),
        },
        Commands::Update {
            filter,
            update,
            many,
        } => {
            let filter = document_from_json_str(&filter)?;
            let update = document_from_json_str(&update)?;
            let modified = if many {
                db.update_many(filter, update).await?
            } else {
                db.update_one(filter, update).await?
            };
            println!("{}", modified);
        }
        Commands::Delete { filter, many } => {
            let filter = document_from_json_str(&filter)?;
            let deleted = if many {
                db.delete_many(filter).await?
            } else {
                db.delete_one(filter).await?
            };
            println!("{}", deleted);
        }
        Commands::Count { filter } => {
            println!("{}", db.count(parse_optional(filter)?).await?);
        }
        Commands::SortBy { field, desc } => {
            print_documents(&db.sort_by(&field, !desc).await?);
        }
        Commands::Values { key } => {
            for value in db.fetch_values_by_key(&key).await? {
                println!("{}", value_to_json(&value));
            }
        }
        Commands::Drop { collection } => {
            db.drop_collection(&collection).await?;
        }
        Commands::Collections => {
            for name in db.list_collections().await? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn parse_optional(text: Option<String>) -> soradb::Result<Option<soradb::bson::Document>> {
    text.as_deref().map(document_from_json_str).transpose()
}

fn print_documents(documents: &[soradb::bson::Document]) {
    for document in documents {
        println!("{}", document_to_json(document));
    }
}
