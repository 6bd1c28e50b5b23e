//! Background counterparts of the service operations
//!
//! Each `*_async` method spawns the operation on the tokio runtime and returns at once. The
//! returned handle can be cancelled, awaited, or given a completion callback. These methods must
//! be called from within a tokio runtime.
//!
//! Progress of a background query is not reported from the worker: entries are handed back to
//! the caller, which runs its progress callback from [`PendingQuery::finish`], in feed order and
//! before `finish` returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::authorization::AuthorizationDomain;
use crate::cancel::Cancellable;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use crate::feed::{Feed, ProgressCallback};
use crate::query::Query;
use crate::service::Service;

/// An operation running in the background
#[derive(Debug)]
pub struct PendingOperation<T> {
    handle: JoinHandle<Result<T>>,
    cancellable: Cancellable,
}

impl<T: Send + 'static> PendingOperation<T> {
    fn spawn<F>(cancellable: Cancellable, operation: F) -> Self
    where F: Future<Output = Result<T>> + Send + 'static
    {
        Self {
            handle: tokio::spawn(operation),
            cancellable,
        }
    }

    /// The token the operation watches. It is the one given when starting the operation, if any.
    pub fn cancellable(&self) -> &Cancellable {
        &self.cancellable
    }

    pub fn cancel(&self) {
        self.cancellable.cancel()
    }

    /// Waits for the operation to complete
    pub async fn finish(self) -> Result<T> {
        self.await
    }

    /// Calls `callback` with the outcome, exactly once.
    ///
    /// The callback runs on a new task spawned on the current Tokio runtime, not in the caller's
    /// context. It may run on any worker thread. Await the returned handle to know when it has run,
    /// or await the operation itself to get the outcome in the caller's task instead.
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where F: FnOnce(Result<T>) + Send + 'static
    {
        tokio::spawn(async move {
            let result = self.await;
            callback(result);
        })
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| joined.unwrap_or_else(|err| Err(join_error(err))))
    }
}

fn join_error(err: tokio::task::JoinError) -> Error {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    log::debug!("A background operation was aborted");
    Error::cancelled()
}


type ProgressEvent<K> = (Entry<K>, usize, Option<u32>);

/// A feed query running in the background
#[derive(Debug)]
pub struct PendingQuery<K: EntryKind> {
    operation: PendingOperation<(Option<Feed<K>>, Option<Query>)>,
    progress: mpsc::UnboundedReceiver<ProgressEvent<K>>,
}

impl<K: EntryKind> PendingQuery<K> {
    pub fn cancellable(&self) -> &Cancellable {
        self.operation.cancellable()
    }

    pub fn cancel(&self) {
        self.operation.cancel()
    }

    /// Waits for the query to complete.
    ///
    /// `progress` is called for every parsed entry, from the calling task, all before this
    /// returns. When the query succeeds, its pagination state and etag are copied into `query`.
    pub async fn finish(mut self, query: Option<&mut Query>, mut progress: Option<&mut ProgressCallback<'_, K>>) -> Result<Option<Feed<K>>> {
        // The channel closes when the worker is done, whatever the outcome
        while let Some((entry, index, total)) = self.progress.recv().await {
            if let Some(callback) = progress.as_deref_mut() {
                callback(&entry, index, total);
            }
        }

        let (feed, worker_query) = self.operation.await?;
        if let (Some(query), Some(worker_query)) = (query, worker_query) {
            *query = worker_query;
        }
        Ok(feed)
    }
}


impl Service {
    /// Starts [`Service::query`] in the background. `query` is cloned; see [`PendingQuery::finish`]
    /// to get its updated state back.
    pub fn query_async<K: EntryKind>(
        &self,
        domain: Option<Arc<AuthorizationDomain>>,
        feed_uri: &str,
        query: Option<&Query>,
        cancellable: Option<Cancellable>,
    ) -> PendingQuery<K> {
        let service = self.clone();
        let feed_uri = feed_uri.to_string();
        let mut query = query.cloned();
        let token = cancellable.unwrap_or_default();
        let worker_token = token.clone();
        let (sender, receiver) = mpsc::unbounded_channel();

        let operation = PendingOperation::spawn(token, async move {
            let mut forward = move |entry: &Entry<K>, index: usize, total: Option<u32>| {
                if sender.send((entry.clone(), index, total)).is_err() {
                    log::debug!("Nobody is listening to the query progress any more");
                }
            };
            let progress: &mut ProgressCallback<'_, K> = &mut forward;
            let feed = service.query(domain.as_ref(), &feed_uri, query.as_mut(), Some(&worker_token), Some(progress)).await?;
            Ok((feed, query))
        });

        PendingQuery { operation, progress: receiver }
    }

    /// Starts [`Service::query_single_entry`] in the background
    pub fn query_single_entry_async<K: EntryKind>(
        &self,
        domain: Option<Arc<AuthorizationDomain>>,
        entry_id: &str,
        query: Option<&Query>,
        cancellable: Option<Cancellable>,
    ) -> PendingOperation<Option<Entry<K>>> {
        let service = self.clone();
        let entry_id = entry_id.to_string();
        let query = query.cloned();
        let token = cancellable.unwrap_or_default();
        let worker_token = token.clone();

        PendingOperation::spawn(token, async move {
            service.query_single_entry(domain.as_ref(), &entry_id, query.as_ref(), Some(&worker_token)).await
        })
    }

    /// Starts [`Service::insert_entry`] in the background
    pub fn insert_entry_async<K: EntryKind>(
        &self,
        domain: Option<Arc<AuthorizationDomain>>,
        upload_uri: &str,
        entry: Entry<K>,
        cancellable: Option<Cancellable>,
    ) -> PendingOperation<Entry<K>> {
        let service = self.clone();
        let upload_uri = upload_uri.to_string();
        let token = cancellable.unwrap_or_default();
        let worker_token = token.clone();

        PendingOperation::spawn(token, async move {
            service.insert_entry(domain.as_ref(), &upload_uri, &entry, Some(&worker_token)).await
        })
    }

    /// Starts [`Service::update_entry`] in the background
    pub fn update_entry_async<K: EntryKind>(
        &self,
        domain: Option<Arc<AuthorizationDomain>>,
        entry: Entry<K>,
        cancellable: Option<Cancellable>,
    ) -> PendingOperation<Entry<K>> {
        let service = self.clone();
        let token = cancellable.unwrap_or_default();
        let worker_token = token.clone();

        PendingOperation::spawn(token, async move {
            service.update_entry(domain.as_ref(), &entry, Some(&worker_token)).await
        })
    }

    /// Starts [`Service::delete_entry`] in the background
    pub fn delete_entry_async<K: EntryKind>(
        &self,
        domain: Option<Arc<AuthorizationDomain>>,
        entry: Entry<K>,
        cancellable: Option<Cancellable>,
    ) -> PendingOperation<bool> {
        let service = self.clone();
        let token = cancellable.unwrap_or_default();
        let worker_token = token.clone();

        PendingOperation::spawn(token, async move {
            service.delete_entry(domain.as_ref(), &entry, Some(&worker_token)).await
        })
    }
}
