//! Removes expired translation-cache entries. Entries without an expiry
//! (the default) live forever; validation cache entries are never expired.

use chrono::Utc;

use crate::store::Store;

pub async fn run(store: &Store) {
    match store.cleanup_expired_translations(Utc::now()) {
        Ok(removed) if removed > 0 => {
            tracing::info!(removed, "Translation cache cleanup finished")
        }
        Ok(_) => tracing::debug!("Translation cache cleanup found nothing to remove"),
        Err(e) => tracing::error!(error = %e, "Translation cache cleanup failed"),
    }
}
