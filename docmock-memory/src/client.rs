//! The client context.
//!
//! A [`MockClient`] owns every database it has handed out, along with the
//! collaborators shared by all of them: the latency model, the predicate evaluator,
//! the update synthesizer, the identifier factory and the persistence hook. Two
//! clients never share state; clones of one client do.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use mea::rwlock::RwLock;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use docmock_core::{
    error::{DocMockError, DocMockResult},
    id::{IdFactory, ObjectIdFactory},
    persist::{DatabaseSnapshot, NoopPersistence, Persistence},
    query::PredicateEvaluator,
    update::UpdateSynthesizer,
};

use crate::{
    database::{Database, DatabaseState},
    evaluator::MatchEvaluator,
    latency::{DEFAULT_MAX_DELAY, Latency, Pending},
    persister::Persister,
    updater::OperatorUpdater,
};

pub(crate) type SharedState = Arc<RwLock<DatabaseState>>;

/// Collaborators and switches shared by every handle of one client.
#[derive(Debug)]
pub(crate) struct Engine {
    pub latency: Latency,
    pub evaluator: Arc<dyn PredicateEvaluator>,
    pub updater: Arc<dyn UpdateSynthesizer>,
    pub ids: Arc<dyn IdFactory>,
    persister: Persister,
    open: AtomicBool,
}

impl Engine {
    pub fn new(
        latency: Latency,
        evaluator: Arc<dyn PredicateEvaluator>,
        updater: Arc<dyn UpdateSynthesizer>,
        ids: Arc<dyn IdFactory>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            latency,
            evaluator,
            updater,
            ids,
            persister: Persister::new(persistence),
            open: AtomicBool::new(true),
        }
    }

    fn ensure_open(&self) -> DocMockResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DocMockError::ConnectionClosed)
        }
    }

    /// Schedules a mutating operation: wait the simulated latency, then run
    /// `operation` to completion under the database write lock. If the database
    /// changed, its snapshot is queued for the persistence hook before the lock is
    /// released; the caller does not wait for the hook.
    pub fn write<T, F>(self: &Arc<Self>, state: &SharedState, operation: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DatabaseState, &Engine) -> DocMockResult<T> + Send + 'static,
    {
        let engine = Arc::clone(self);
        let state = Arc::clone(state);

        Pending::new(async move {
            engine.latency.pause().await;
            engine.ensure_open()?;

            let mut guard = state.write().await;
            let result = operation(&mut *guard, engine.as_ref());

            if guard.take_dirty() {
                engine.persister.push(guard.snapshot());
            }

            result
        })
    }

    /// Schedules a read-only operation under the database read lock.
    pub fn read<T, F>(self: &Arc<Self>, state: &SharedState, operation: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&DatabaseState, &Engine) -> DocMockResult<T> + Send + 'static,
    {
        let engine = Arc::clone(self);
        let state = Arc::clone(state);

        Pending::new(async move {
            engine.latency.pause().await;
            engine.ensure_open()?;

            let guard = state.read().await;
            operation(&*guard, engine.as_ref())
        })
    }
}

/// Client settings that can be loaded from configuration files.
///
/// ```ignore
/// let config: MockConfig = serde_json::from_str(r#"{ "max_delay_ms": 0 }"#)?;
/// let client = MockClient::builder().config(config).build().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Upper bound of the simulated latency, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self { max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64 }
    }
}

/// An in-memory stand-in for a MongoDB client.
///
/// # Example
///
/// ```ignore
/// use docmock_memory::MockClient;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = MockClient::builder().max_delay(Duration::ZERO).build().await?;
///     let users = client.db("app")?.collection("users")?;
///
///     users.insert_one(doc! { "name": "Alice" }).await?;
///     let alice = users.find_one(doc! { "name": "Alice" }).await?;
///     assert!(alice.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockClient {
    engine: Arc<Engine>,
    databases: Arc<Mutex<HashMap<String, SharedState>>>,
}

impl MockClient {
    /// Creates a builder for constructing a `MockClient` with custom options.
    pub fn builder() -> MockClientBuilder {
        MockClientBuilder::default()
    }

    /// Returns a handle to the named database, creating its state on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::InvalidArgument`] if the name is empty or contains a
    /// space, `.`, `$`, `/` or `\`.
    pub fn db(&self, name: &str) -> DocMockResult<Database> {
        if name.is_empty() || name.contains([' ', '.', '$', '/', '\\', '\0']) {
            return Err(DocMockError::InvalidArgument(format!("invalid database name '{name}'")));
        }

        let state = self
            .databases
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(DatabaseState::new(name))))
            .clone();

        Ok(Database::new(name, Arc::clone(&self.engine), state))
    }

    /// Names of the databases handed out so far.
    pub fn database_names(&self) -> Vec<String> {
        let mut names = self.databases.lock().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Closes the client. Every operation scheduled afterwards, on any handle,
    /// fails with [`DocMockError::ConnectionClosed`].
    pub fn close(&self) {
        debug!(target: "docmock::client", "Closing client");
        self.engine.open.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        !self.engine.open.load(Ordering::Acquire)
    }

    /// Waits until every snapshot queued by earlier writes was handed to the
    /// persistence hook. Writes themselves never wait for the hook.
    pub async fn flush(&self) {
        self.engine.persister.flush().await;
    }

    /// Captures every database in the persisted layout.
    pub fn snapshot(&self) -> Pending<Vec<DatabaseSnapshot>> {
        let states = self.databases.lock().values().cloned().collect::<Vec<_>>();
        let engine = Arc::clone(&self.engine);

        Pending::new(async move {
            engine.latency.pause().await;
            engine.ensure_open()?;

            let mut snapshots = Vec::with_capacity(states.len());
            for state in states {
                snapshots.push(state.read().await.snapshot());
            }
            snapshots.sort_by(|a, b| a.name.cmp(&b.name));

            Ok(snapshots)
        })
    }
}

/// Builder for constructing [`MockClient`] instances.
#[derive(Debug, Default)]
pub struct MockClientBuilder {
    max_delay: Option<Duration>,
    evaluator: Option<Arc<dyn PredicateEvaluator>>,
    updater: Option<Arc<dyn UpdateSynthesizer>>,
    ids: Option<Arc<dyn IdFactory>>,
    persistence: Option<Arc<dyn Persistence>>,
    seed: Vec<DatabaseSnapshot>,
}

impl MockClientBuilder {
    /// Applies settings loaded from configuration.
    pub fn config(mut self, config: MockConfig) -> Self {
        self.max_delay = Some(Duration::from_millis(config.max_delay_ms));
        self
    }

    /// Sets the upper bound of the simulated latency. `Duration::ZERO` only yields.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn PredicateEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn updater(mut self, updater: Arc<dyn UpdateSynthesizer>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn id_factory(mut self, ids: Arc<dyn IdFactory>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Loads a previously captured database when the client is built.
    pub fn seed(mut self, snapshot: DatabaseSnapshot) -> Self {
        self.seed.push(snapshot);
        self
    }

    /// Builds and returns a new [`MockClient`].
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::InvalidArgument`] if a seeded snapshot carries an
    /// invalid database name.
    pub async fn build(self) -> DocMockResult<MockClient> {
        let engine = Engine::new(
            Latency::new(self.max_delay.unwrap_or(DEFAULT_MAX_DELAY)),
            self.evaluator.unwrap_or_else(|| Arc::new(MatchEvaluator)),
            self.updater.unwrap_or_else(|| Arc::new(OperatorUpdater)),
            self.ids.unwrap_or_else(|| Arc::new(ObjectIdFactory)),
            self.persistence.unwrap_or_else(|| Arc::new(NoopPersistence)),
        );

        let client = MockClient {
            engine: Arc::new(engine),
            databases: Arc::new(Mutex::new(HashMap::new())),
        };

        for snapshot in self.seed {
            let database = client.db(&snapshot.name)?;
            database.state().write().await.restore(snapshot);
        }

        Ok(client)
    }
}
