//! Mutation service: validated writes against the store, each followed by
//! exactly one broadcast.
//!
//! Broadcasts are issued from the store's commit callback, while the store
//! still holds its write lock. Publication order therefore matches sequence
//! order even when writers race.

use super::validate::{validate_new, validate_patch};
use crate::channel::{Broadcaster, ChannelEvent, EventEnvelope};
use crate::error::{CatalogError, Result};
use crate::store::RecordStore;
use crate::types::{Commit, Product, ProductDraft, ProductId, Projection, Snapshot};

/// Applies create/update/delete requests and publishes the outcome.
///
/// The store and the broadcaster are injected. The service takes no locks of
/// its own; ordering comes from the store.
pub struct MutationService<S, B> {
    store: S,
    channel: B,
}

impl<S: RecordStore, B: Broadcaster> MutationService<S, B> {
    pub fn new(store: S, channel: B) -> Self {
        Self { store, channel }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn channel(&self) -> &B {
        &self.channel
    }

    /// Validate and insert a new product, then broadcast `productAdded`.
    pub fn create(&self, draft: ProductDraft) -> Result<Product> {
        let input = validate_new(draft)?;
        let commit = self
            .store
            .insert_with(input, &mut |commit: &Commit| {
                self.channel.broadcast(EventEnvelope::new(
                    commit.sequence,
                    ChannelEvent::ProductAdded(commit.product.clone()),
                ))
            })
            .map_err(|e| {
                tracing::error!(error = %e, "create failed");
                e
            })?;

        tracing::info!(id = %commit.product.id, sequence = %commit.sequence, "product created");
        Ok(commit.product)
    }

    /// Merge the present fields of `draft` into product `id`, then broadcast
    /// `productUpdated` with the full merged record.
    pub fn update(&self, id: &str, draft: ProductDraft) -> Result<Product> {
        let id = ProductId::parse(id)?;
        let patch = validate_patch(draft)?;

        let commit = self
            .store
            .update_with(id, &patch, &mut |commit: &Commit| {
                self.channel.broadcast(EventEnvelope::new(
                    commit.sequence,
                    ChannelEvent::ProductUpdated(commit.product.clone()),
                ))
            })
            .map_err(|e| {
                tracing::error!(%id, error = %e, "update failed");
                e
            })?
            .ok_or(CatalogError::NotFound(id))?;

        tracing::info!(%id, sequence = %commit.sequence, revision = commit.product.revision, "product updated");
        Ok(commit.product)
    }

    /// Remove product `id`, then broadcast `productDeleted`.
    pub fn delete(&self, id: &str) -> Result<ProductId> {
        let id = ProductId::parse(id)?;

        let sequence = self
            .store
            .delete_with(id, &mut |sequence| {
                self.channel
                    .broadcast(EventEnvelope::new(sequence, ChannelEvent::ProductDeleted(id)))
            })
            .map_err(|e| {
                tracing::error!(%id, error = %e, "delete failed");
                e
            })?
            .ok_or(CatalogError::NotFound(id))?;

        tracing::info!(%id, %sequence, "product deleted");
        Ok(id)
    }

    /// Snapshot of the catalog under the listing projection.
    pub fn list(&self) -> Result<Snapshot> {
        self.store.list(&Projection::LISTING)
    }

    /// Full record for one product.
    pub fn get(&self, id: &str) -> Result<Product> {
        let id = ProductId::parse(id)?;
        self.store.get(id)?.ok_or(CatalogError::NotFound(id))
    }
}
