//! Query cursors.
//!
//! A [`Cursor`] is configured while it is in the [`CursorState::Init`] state and
//! becomes read-only once it has produced a result. Results always flow through the
//! same fixed pipeline: filter, sort, map, skip/limit, copy, projection.
//!
//! # Example
//!
//! ```ignore
//! let mut cursor = users.find(doc! { "active": true });
//! cursor.sort(doc! { "age": -1 })?.skip(10)?.limit(5)?;
//!
//! let total = cursor.count(false).await?;
//! let page = cursor.to_array().await?;
//! ```

use std::{cmp::Ordering, collections::VecDeque, fmt, sync::Arc};

use bson::{Bson, Document};
use futures::stream::{self, Stream};

use docmock_core::{
    compare::{as_f64, compare_values},
    document::{DocumentExt, ID_FIELD},
    error::{DocMockError, DocMockResult},
    query::{PredicateEvaluator, Sort, SortDirection, parse_sort},
};

use crate::{collection::Collection, latency::Pending};

/// A transform applied to every matched document before windowing.
pub type MapFn = Arc<dyn Fn(Document) -> Document + Send + Sync>;

/// Lifecycle of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Accepts configuration.
    Init,
    /// Has produced results.
    Open,
    /// Terminal. Reads return nothing.
    Closed,
}

fn lookup_in_documents<'d>(document: &'d Document, parts: &[&str]) -> Option<&'d Bson> {
    let (last, parents) = parts.split_last()?;
    let mut current = document;
    for part in parents {
        current = current.get(*part)?.as_document()?;
    }
    current.get(*last)
}

fn insert_in_documents(target: &mut Document, parts: &[&str], value: Bson) {
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = target;
    for part in parents {
        let slot = current.entry(part.to_string()).or_insert_with(|| Bson::Document(Document::new()));
        current = match slot {
            Bson::Document(child) => child,
            _ => return,
        };
    }
    current.insert(*last, value);
}

/// Field selection applied to cursor output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    /// Only `_id` (unless excluded) and the listed fields. Paths are followed
    /// through embedded documents only; a path that crosses an array selects nothing.
    Pick { fields: Vec<String>, include_id: bool },
    /// Everything except the listed fields.
    Omit { fields: Vec<String> },
}

impl Projection {
    /// Parses a projection document. An empty document selects everything.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::InvalidArgument`] when inclusions and exclusions are
    /// mixed (other than for `_id`), and [`DocMockError::NotSupported`] for
    /// projection operators.
    pub fn parse(spec: &Document) -> DocMockResult<Option<Self>> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut id_flag = None;

        for (field, value) in spec {
            let flag = projection_flag(field, value)?;
            if field == ID_FIELD {
                id_flag = Some(flag);
            } else if flag {
                include.push(field.clone());
            } else {
                exclude.push(field.clone());
            }
        }

        if !include.is_empty() && !exclude.is_empty() {
            return Err(DocMockError::InvalidArgument(
                "projection cannot have a mix of inclusion and exclusion".into(),
            ));
        }

        let projection = match (include.is_empty(), exclude.is_empty(), id_flag) {
            (false, _, id_flag) => Some(Projection::Pick { fields: include, include_id: id_flag != Some(false) }),
            (true, false, Some(false)) => {
                exclude.push(ID_FIELD.to_string());
                Some(Projection::Omit { fields: exclude })
            }
            (true, false, _) => Some(Projection::Omit { fields: exclude }),
            (true, true, Some(false)) => Some(Projection::Omit { fields: vec![ID_FIELD.to_string()] }),
            (true, true, Some(true)) => Some(Projection::Pick { fields: Vec::new(), include_id: true }),
            (true, true, None) => None,
        };

        Ok(projection)
    }

    pub fn apply(&self, document: Document) -> Document {
        match self {
            Projection::Pick { fields, include_id } => {
                let mut picked = Document::new();
                if *include_id {
                    if let Some(id) = document.id() {
                        picked.insert(ID_FIELD, id.clone());
                    }
                }
                for field in fields {
                    let parts = field.split('.').collect::<Vec<_>>();
                    if let Some(value) = lookup_in_documents(&document, &parts) {
                        insert_in_documents(&mut picked, &parts, value.clone());
                    }
                }
                picked
            }
            Projection::Omit { fields } => {
                let mut document = document;
                for field in fields {
                    document.remove_path(field);
                }
                document
            }
        }
    }
}

fn projection_flag(field: &str, value: &Bson) -> DocMockResult<bool> {
    match value {
        Bson::Boolean(flag) => Ok(*flag),
        Bson::Document(_) => Err(DocMockError::NotSupported(format!("projection operator on '{field}'"))),
        other => match as_f64(other) {
            Some(number) => Ok(number != 0.0),
            None => Err(DocMockError::InvalidArgument(format!("invalid projection value for '{field}': {other}"))),
        },
    }
}

/// The configured query pipeline of a cursor.
#[derive(Clone, Default)]
pub(crate) struct Pipeline {
    pub query: Document,
    pub sort: Vec<Sort>,
    pub projection: Option<Projection>,
    pub skip: usize,
    /// `0` means unlimited.
    pub limit: usize,
    pub map: Option<MapFn>,
}

impl Pipeline {
    pub fn new(query: Document) -> Self {
        Self { query, ..Self::default() }
    }

    fn take(&self) -> usize {
        if self.limit == 0 { usize::MAX } else { self.limit }
    }

    /// Runs the pipeline over `documents` and returns owned copies.
    pub fn run(&self, documents: &[Document], evaluator: &dyn PredicateEvaluator) -> DocMockResult<Vec<Document>> {
        let mut matched = evaluator
            .filter(&self.query, documents)?
            .into_iter()
            .filter_map(|position| documents.get(position))
            .collect::<Vec<_>>();

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &self.sort));
        }

        let window = match &self.map {
            Some(map) => matched
                .into_iter()
                .map(|document| map(document.clone()))
                .skip(self.skip)
                .take(self.take())
                .collect::<Vec<_>>(),
            None => matched
                .into_iter()
                .skip(self.skip)
                .take(self.take())
                .cloned()
                .collect::<Vec<_>>(),
        };

        Ok(match &self.projection {
            Some(projection) => window.into_iter().map(|document| projection.apply(document)).collect(),
            None => window,
        })
    }

    /// Counts matches, optionally restricted to the skip/limit window.
    pub fn count(
        &self,
        documents: &[Document],
        evaluator: &dyn PredicateEvaluator,
        apply_skip_limit: bool,
    ) -> DocMockResult<u64> {
        let total = evaluator.filter(&self.query, documents)?.len();

        let count = if apply_skip_limit {
            total.saturating_sub(self.skip).min(self.take())
        } else {
            total
        };

        Ok(count as u64)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("query", &self.query)
            .field("sort", &self.sort)
            .field("projection", &self.projection)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("map", &self.map.is_some())
            .finish()
    }
}

/// Orders two documents by a multi-key sort specification.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let ordering = compare_values(a.get_path(&key.field), b.get_path(&key.field));
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// A lazily configured, one-shot query over a collection.
pub struct Cursor {
    collection: Collection,
    pipeline: Pipeline,
    state: CursorState,
    buffer: VecDeque<Document>,
    close_listeners: Vec<Box<dyn FnOnce() + Send>>,
}

impl Cursor {
    pub(crate) fn new(collection: Collection, query: Document) -> Self {
        Self {
            collection,
            pipeline: Pipeline::new(query),
            state: CursorState::Init,
            buffer: VecDeque::new(),
            close_listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    fn configurable(&self, method: &str) -> DocMockResult<()> {
        match self.state {
            CursorState::Init => Ok(()),
            _ => Err(DocMockError::InvalidState(format!(
                "cannot call {method} on a cursor that has already produced results"
            ))),
        }
    }

    /// Sets the sort order, `{ field: 1 | -1, ... }`.
    pub fn sort(&mut self, spec: Document) -> DocMockResult<&mut Self> {
        self.configurable("sort")?;
        self.pipeline.sort = parse_sort(&spec)?;
        Ok(self)
    }

    pub fn skip(&mut self, skip: usize) -> DocMockResult<&mut Self> {
        self.configurable("skip")?;
        self.pipeline.skip = skip;
        Ok(self)
    }

    /// Caps the number of results. `0` removes the cap.
    pub fn limit(&mut self, limit: usize) -> DocMockResult<&mut Self> {
        self.configurable("limit")?;
        self.pipeline.limit = limit;
        Ok(self)
    }

    /// Sets the field selection.
    pub fn project(&mut self, spec: Document) -> DocMockResult<&mut Self> {
        self.configurable("project")?;
        self.pipeline.projection = Projection::parse(&spec)?;
        Ok(self)
    }

    /// Adds a transform applied to every matched document. Transforms compose in the
    /// order they were added.
    pub fn map<F>(&mut self, transform: F) -> DocMockResult<&mut Self>
    where
        F: Fn(Document) -> Document + Send + Sync + 'static,
    {
        self.configurable("map")?;
        self.pipeline.map = Some(match self.pipeline.map.take() {
            Some(previous) => Arc::new(move |document| transform(previous(document))),
            None => Arc::new(transform),
        });
        Ok(self)
    }

    /// Counts the matching documents. With `apply_skip_limit`, only those inside the
    /// configured window are counted. Does not move the cursor.
    pub fn count(&self, apply_skip_limit: bool) -> Pending<u64> {
        self.collection.count_pipeline(self.pipeline.clone(), apply_skip_limit)
    }

    /// The number of documents the cursor yields in total.
    pub fn size(&self) -> Pending<u64> {
        self.count(true)
    }

    /// Returns the next document, or `None` once the cursor is exhausted or closed.
    pub async fn next(&mut self) -> DocMockResult<Option<Document>> {
        match self.state {
            CursorState::Init => {
                let documents = self.collection.select(self.pipeline.clone()).await?;
                self.buffer = documents.into();
                self.state = CursorState::Open;
            }
            CursorState::Open => self.collection.pause().await,
            CursorState::Closed => {
                self.collection.pause().await;
                return Ok(None);
            }
        }

        Ok(self.buffer.pop_front())
    }

    /// Returns every remaining result from the start of the window and closes the
    /// cursor. A closed cursor yields an empty list.
    pub fn to_array(&mut self) -> Pending<Vec<Document>> {
        if self.is_closed() {
            return self.collection.select_nothing();
        }

        let pending = self.collection.select(self.pipeline.clone());
        self.close();
        pending
    }

    /// Calls `f` with each remaining document.
    pub async fn for_each<F>(&mut self, mut f: F) -> DocMockResult<()>
    where
        F: FnMut(Document),
    {
        while let Some(document) = self.next().await? {
            f(document);
        }
        Ok(())
    }

    /// Converts the cursor into a stream of documents. The stream ends after the last
    /// document or after the first error.
    pub fn into_stream(self) -> impl Stream<Item = DocMockResult<Document>> + Send {
        stream::unfold(self, |mut cursor| async move {
            match cursor.next().await {
                Ok(Some(document)) => Some((Ok(document), cursor)),
                Ok(None) => None,
                Err(err) => {
                    cursor.close();
                    Some((Err(err), cursor))
                }
            }
        })
    }

    /// Returns the cursor to its unconfigured-results state, so it can be reconfigured
    /// and read again.
    pub fn rewind(&mut self) {
        self.buffer.clear();
        self.state = CursorState::Init;
    }

    /// Registers a listener called once when the cursor closes.
    pub fn on_close<F>(&mut self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.close_listeners.push(Box::new(listener));
    }

    /// Closes the cursor. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }

        self.state = CursorState::Closed;
        self.buffer.clear();
        for listener in self.close_listeners.drain(..) {
            listener();
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.collection.namespace())
            .field("pipeline", &self.pipeline)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
