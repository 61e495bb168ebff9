//! MongoDB Client Facade
//!
//! `SoraDb` holds one driver client, the selected database and the current
//! collection. Every method forwards to the matching driver call and wraps
//! driver faults in [`SoraError`].

use crate::config::{ConnectionOptions, SoraConfig};
use crate::document::{self, SortDirection, SortSpec};
use crate::error::{redact_url, Result, SoraError};
use crate::version::VersionInfo;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{ClientOptions, FindOptions, Hint, UpdateModifications},
    Client, Collection, Database,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Live connection state, present only after a successful connect
#[derive(Debug)]
struct Session {
    client: Client,
    database: Database,
    collection: Collection<Document>,
}

impl Session {
    async fn close(self) {
        let Session {
            client,
            database,
            collection,
        } = self;
        drop(collection);
        drop(database);
        client.shutdown().await;
    }
}

/// Simplified MongoDB client
///
/// ```rust,no_run
/// use soradb::SoraDb;
/// use mongodb::bson::doc;
///
/// # async fn example() -> soradb::Result<()> {
/// let mut db = SoraDb::new();
/// db.connect("mongodb://localhost:27017", "shop", "orders").await?;
///
/// let id = db.insert_one(doc! { "item": "tea", "qty": 2 }).await?;
/// let order = db.find_one(doc! { "_id": id }).await?;
/// assert!(order.is_some());
///
/// db.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SoraDb {
    session: Option<Session>,
}

impl SoraDb {
    /// Create a facade in the disconnected state
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Connect to `url`, verify it with a ping and select the database and
    /// collection.
    ///
    /// On failure the facade keeps whatever state it had before the call.
    pub async fn connect(
        &mut self,
        url: &str,
        database_name: &str,
        collection_name: &str,
    ) -> Result<()> {
        self.connect_with_options(
            url,
            database_name,
            collection_name,
            &ConnectionOptions::default(),
        )
        .await
    }

    /// Connect using a loaded [`SoraConfig`]
    pub async fn connect_with_config(&mut self, config: &SoraConfig) -> Result<()> {
        config.validate()?;
        self.connect_with_options(
            &config.url,
            &config.database,
            &config.collection,
            &config.options,
        )
        .await
    }

    /// Connect, forwarding `options` to the driver
    pub async fn connect_with_options(
        &mut self,
        url: &str,
        database_name: &str,
        collection_name: &str,
        options: &ConnectionOptions,
    ) -> Result<()> {
        let client = establish(url, options).await.map_err(|e| {
            warn!(url = %redact_url(url), error = %e, "MongoDB connection failed");
            SoraError::connection(url, e)
        })?;

        let database = client.database(database_name);
        let collection = database.collection::<Document>(collection_name);

        info!(
            database = %database_name,
            collection = %collection_name,
            "Connected to MongoDB database successfully"
        );

        let session = Session {
            client,
            database,
            collection,
        };
        if let Some(previous) = self.session.replace(session) {
            debug!("closing previous MongoDB connection");
            previous.close().await;
        }

        Ok(())
    }

    /// Close the connection. A no-op when not connected.
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            info!("Disconnected from MongoDB");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn database_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.database.name())
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.collection.name())
    }

    /// Make `name` the current collection within the selected database
    pub fn use_collection(&mut self, name: &str) -> Result<()> {
        let session = self.session.as_mut().ok_or(SoraError::NotConnected)?;
        session.collection = session.database.collection::<Document>(name);
        debug!(collection = %name, "switched collection");
        Ok(())
    }

    /// Re-run the liveness check against the connected server
    pub async fn ping(&self) -> Result<()> {
        let session = self.session()?;
        session
            .client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(fault("pinging server"))?;
        Ok(())
    }

    /// Version string reported by the server's `buildInfo`
    pub async fn server_version(&self) -> Result<String> {
        let session = self.session()?;
        let build_info = session
            .client
            .database("admin")
            .run_command(doc! { "buildInfo": 1 })
            .await
            .map_err(fault("retrieving server version"))?;

        Ok(build_info
            .get_str("version")
            .unwrap_or("unknown")
            .to_string())
    }

    /// Names of the collections in the selected database
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let session = self.session()?;
        session
            .database
            .list_collection_names()
            .await
            .map_err(fault("listing collections"))
    }

    /// Drop `name` from the selected database
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        let session = self.session()?;
        session
            .database
            .collection::<Document>(name)
            .drop()
            .await
            .map_err(|e| {
                let action = format!("dropping collection '{}'", name);
                warn!(action = %action, error = %e, "MongoDB operation failed");
                SoraError::operation(&action, e)
            })?;

        info!(collection = %name, "Collection dropped successfully");
        Ok(())
    }

    // Basic CRUD operations

    /// Insert a single document and return its `_id`
    pub async fn insert_one(&self, document: Document) -> Result<Bson> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), "inserting document");

        let result = collection
            .insert_one(document)
            .await
            .map_err(fault("inserting document"))?;

        Ok(result.inserted_id)
    }

    /// Insert documents and return their ids in input order
    pub async fn insert_many<I>(&self, documents: I) -> Result<Vec<Bson>>
    where
        I: IntoIterator<Item = Document>,
    {
        let collection = self.collection()?;
        let documents: Vec<Document> = documents.into_iter().collect();
        debug!(collection = %collection.name(), count = documents.len(), "inserting documents");

        let result = collection
            .insert_many(documents)
            .await
            .map_err(fault("inserting documents"))?;

        Ok(ordered_ids(result.inserted_ids))
    }

    /// First document matching `filter`, or `None`
    pub async fn find_one(&self, filter: impl Into<Option<Document>>) -> Result<Option<Document>> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), "finding document");

        collection
            .find_one(filter.into().unwrap_or_default())
            .await
            .map_err(fault("finding document"))
    }

    /// All documents matching `filter`, with `projection` applied
    pub async fn find_many(
        &self,
        filter: impl Into<Option<Document>>,
        projection: impl Into<Option<Document>>,
    ) -> Result<Vec<Document>> {
        self.find(filter, projection, None, None).await
    }

    /// Matching documents with optional projection, sort and limit.
    ///
    /// The sort is validated before anything is sent to the server. An empty
    /// sort or projection is the same as none; `limit` is forwarded as given.
    pub async fn find(
        &self,
        filter: impl Into<Option<Document>>,
        projection: impl Into<Option<Document>>,
        sort: Option<SortSpec>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let sort = sort
            .filter(|spec| !spec.is_empty())
            .map(|spec| spec.to_document())
            .transpose()?;

        let mut options = FindOptions::default();
        options.projection = projection.into().filter(|p| !p.is_empty());
        options.sort = sort;
        options.limit = limit;

        self.find_with("finding documents", filter.into(), options)
            .await
    }

    /// Every document in the collection ordered by `field`
    pub async fn sort_by(&self, field: &str, ascending: bool) -> Result<Vec<Document>> {
        let sort = SortSpec::by(field, SortDirection::from_ascending(ascending)).to_document()?;

        let mut options = FindOptions::default();
        options.sort = Some(sort);

        self.find_with("sorting documents", None, options).await
    }

    /// Apply `update` to the first match; returns the modified count
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<u64> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), "updating document");

        let result = collection
            .update_one(filter, update)
            .await
            .map_err(fault("updating document"))?;

        Ok(result.modified_count)
    }

    /// Apply `update` to every match; returns the modified count
    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<u64> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), "updating documents");

        let result = collection
            .update_many(filter, update)
            .await
            .map_err(fault("updating documents"))?;

        Ok(result.modified_count)
    }

    /// Delete the first match; returns the deleted count
    pub async fn delete_one(&self, filter: Document) -> Result<u64> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), "deleting document");

        let result = collection
            .delete_one(filter)
            .await
            .map_err(fault("deleting document"))?;

        Ok(result.deleted_count)
    }

    /// Delete every match; returns the deleted count
    pub async fn delete_many(&self, filter: Document) -> Result<u64> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), "deleting documents");

        let result = collection
            .delete_many(filter)
            .await
            .map_err(fault("deleting documents"))?;

        Ok(result.deleted_count)
    }

    /// Number of documents matching `filter`; `None` counts everything
    pub async fn count(&self, filter: impl Into<Option<Document>>) -> Result<u64> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), "counting documents");

        collection
            .count_documents(filter.into().unwrap_or_default())
            .await
            .map_err(fault("counting documents"))
    }

    /// Value of the top-level `key` from each document that has it, in
    /// natural order. Documents without the key are skipped.
    pub async fn fetch_values_by_key(&self, key: &str) -> Result<Vec<Bson>> {
        let (filter, options) = values_query(key);
        let documents = self
            .find_with("fetching values by key", filter, options)
            .await?;

        Ok(document::values_for_key(documents, key))
    }

    /// Wrapper version and the driver requirement it was built against
    pub fn version() -> VersionInfo {
        VersionInfo::current()
    }

    /// Print the wrapper version and the driver requirement to stdout
    pub fn print_version() {
        let info = Self::version();
        println!("\n{} requirement: {}", info.driver, info.driver_requirement);
        println!("{}: {}\n", info.package, info.version);
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(SoraError::NotConnected)
    }

    fn collection(&self) -> Result<&Collection<Document>> {
        self.session().map(|s| &s.collection)
    }

    async fn find_with(
        &self,
        action: &'static str,
        filter: Option<Document>,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let collection = self.collection()?;
        debug!(collection = %collection.name(), action, "querying documents");

        let cursor = collection
            .find(filter.unwrap_or_default())
            .with_options(options)
            .await
            .map_err(fault(action))?;

        cursor.try_collect().await.map_err(fault(action))
    }
}

async fn establish(url: &str, options: &ConnectionOptions) -> mongodb::error::Result<Client> {
    let mut client_options = ClientOptions::parse(url).await?;
    options.apply(&mut client_options);

    let client = Client::with_options(client_options)?;

    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await?;

    Ok(client)
}

/// Filter and options for reading `key` from every document.
///
/// Plain keys are filtered and projected on the server, pinned to natural
/// order since an index on `key` would otherwise return index order. Other
/// keys get a full scan.
fn values_query(key: &str) -> (Option<Document>, FindOptions) {
    let mut options = FindOptions::default();
    if !document::is_plain_key(key) {
        return (None, options);
    }

    let mut filter = Document::new();
    filter.insert(key, doc! { "$exists": true });

    let mut projection = Document::new();
    projection.insert(key, 1);
    options.projection = Some(projection);
    options.hint = Some(Hint::Keys(doc! { "$natural": 1 }));

    (Some(filter), options)
}

/// Log a driver fault and wrap it as an operation error
fn fault(action: &'static str) -> impl FnOnce(mongodb::error::Error) -> SoraError {
    move |err| {
        warn!(action, error = %err, "MongoDB operation failed");
        SoraError::operation(action, err)
    }
}

/// The driver reports inserted ids keyed by input position
fn ordered_ids(inserted_ids: HashMap<usize, Bson>) -> Vec<Bson> {
    let mut ids: Vec<(usize, Bson)> = inserted_ids.into_iter().collect();
    ids.sort_by_key(|(index, _)| *index);
    ids.into_iter().map(|(_, id)| id).collect()
}
