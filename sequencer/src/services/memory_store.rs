//! In-memory reference implementations of the persistence collaborators
//!
//! The enrollment store keeps a sorted due-time index over `next_fire_at`
//! and enforces optimistic versioning on every write, which is what the
//! engine's claim-then-dispatch protocol relies on.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use shared::{EnrollmentId, LeadEnrollment, SequenceDefinition, SequenceId, TenantId};

use crate::error::{SequencerError, SequencerResult};
use crate::traits::{EnrollmentStore, SequenceStore, VersionedEnrollment};

/// In-memory sequence definition store
///
/// Cloning shares the underlying table.
#[derive(Clone)]
pub struct InMemorySequenceStore {
    definitions: Arc<RwLock<HashMap<SequenceId, SequenceDefinition>>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySequenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn fetch_definition(
        &self,
        sequence_id: &SequenceId,
    ) -> SequencerResult<Option<SequenceDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(sequence_id).cloned())
    }

    async fn fetch_active_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> SequencerResult<Vec<SequenceDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .values()
            .filter(|definition| definition.is_active && &definition.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn upsert_definition(&self, definition: SequenceDefinition) -> SequencerResult<()> {
        definition.validate()?;
        let mut definitions = self.definitions.write().await;
        definitions.insert(definition.id.clone(), definition);
        Ok(())
    }
}

/// Row table plus due-time index, guarded together so the index never drifts
/// from the rows
struct EnrollmentTable {
    rows: HashMap<EnrollmentId, VersionedEnrollment>,
    due: BTreeMap<(DateTime<Utc>, EnrollmentId), ()>,
}

impl EnrollmentTable {
    fn reindex(
        &mut self,
        id: &EnrollmentId,
        old_fire_at: Option<DateTime<Utc>>,
        new_fire_at: Option<DateTime<Utc>>,
    ) {
        if let Some(old) = old_fire_at {
            self.due.remove(&(old, id.clone()));
        }
        if let Some(new) = new_fire_at {
            self.due.insert((new, id.clone()), ());
        }
    }
}

/// In-memory lead enrollment store with optimistic versioning
///
/// Cloning shares the underlying table.
#[derive(Clone)]
pub struct InMemoryEnrollmentStore {
    inner: Arc<RwLock<EnrollmentTable>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(EnrollmentTable {
                rows: HashMap::new(),
                due: BTreeMap::new(),
            })),
        }
    }
}

impl Default for InMemoryEnrollmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn insert(&self, enrollment: LeadEnrollment) -> SequencerResult<()> {
        let mut table = self.inner.write().await;
        if table.rows.contains_key(&enrollment.id) {
            return Err(SequencerError::EnrollmentExists {
                enrollment_id: enrollment.id.to_string(),
            });
        }

        let id = enrollment.id.clone();
        let fire_at = enrollment.next_fire_at;
        table.rows.insert(
            id.clone(),
            VersionedEnrollment {
                enrollment,
                version: 1,
            },
        );
        table.reindex(&id, None, fire_at);
        Ok(())
    }

    async fn get(
        &self,
        enrollment_id: &EnrollmentId,
    ) -> SequencerResult<Option<VersionedEnrollment>> {
        let table = self.inner.read().await;
        Ok(table.rows.get(enrollment_id).cloned())
    }

    async fn update(
        &self,
        enrollment: LeadEnrollment,
        expected_version: u64,
    ) -> SequencerResult<()> {
        let mut table = self.inner.write().await;
        let current = table.rows.get(&enrollment.id).ok_or_else(|| {
            SequencerError::EnrollmentNotFound {
                enrollment_id: enrollment.id.to_string(),
            }
        })?;

        if current.version != expected_version {
            return Err(SequencerError::VersionConflict {
                enrollment_id: enrollment.id.to_string(),
                expected: expected_version,
                found: current.version,
            });
        }

        let id = enrollment.id.clone();
        let old_fire_at = current.enrollment.next_fire_at;
        let new_fire_at = enrollment.next_fire_at;
        table.rows.insert(
            id.clone(),
            VersionedEnrollment {
                enrollment,
                version: expected_version + 1,
            },
        );
        table.reindex(&id, old_fire_at, new_fire_at);
        Ok(())
    }

    async fn fetch_due_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> SequencerResult<Vec<VersionedEnrollment>> {
        let table = self.inner.read().await;
        Ok(table
            .due
            .keys()
            .take_while(|(fire_at, _)| *fire_at <= before)
            .take(limit)
            .filter_map(|(_, id)| table.rows.get(id))
            .cloned()
            .collect())
    }
}
