use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub etag: String,
    pub body: Vec<u8>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

/// ETag-validated responses. Entries never expire on their own; a `304` from
/// GitHub is what makes a cached body current.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Mutex<LruCache<String, CachedResponse>>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        self.inner.lock().await.get(key).cloned()
    }

    pub async fn put(&self, key: String, value: CachedResponse) {
        self.inner.lock().await.put(key, value);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
