//! Object-store backed storage for opening Zarr stores in place.
//!
//! Wraps an `object_store` client (S3 in production, in-memory in tests)
//! scoped to a key prefix so the synchronous zarrs API can read a store
//! without staging it to local disk first.

use std::sync::Arc;

use object_store::path::Path as ObjectPath;
use object_store::prefix::PrefixStore;
use object_store::ObjectStore;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};

/// Blocking executor that works from within a tokio runtime.
///
/// Uses `tokio::task::block_in_place` to move the current task to a blocking
/// thread, then uses the runtime handle to drive the future. Requires the
/// multi-threaded runtime.
#[derive(Clone, Copy)]
pub struct TokioBlockOn;

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
    }
}

/// Object store scoped to the key prefix of one Zarr store.
pub type AsyncRemoteStorage = AsyncObjectStore<PrefixStore<Arc<dyn ObjectStore>>>;

/// Synchronous view of [`AsyncRemoteStorage`] usable with `ZarrReader::read_storage`.
pub type RemoteStorage = AsyncToSyncStorageAdapter<AsyncRemoteStorage, TokioBlockOn>;

/// Open the store rooted at `prefix` inside `store`.
pub fn open_remote_storage(store: Arc<dyn ObjectStore>, prefix: &str) -> Arc<RemoteStorage> {
    let prefix = ObjectPath::from(prefix.trim_matches('/'));
    let scoped = PrefixStore::new(store, prefix);
    let async_store = Arc::new(AsyncObjectStore::new(scoped));
    Arc::new(AsyncToSyncStorageAdapter::new(async_store, TokioBlockOn))
}
