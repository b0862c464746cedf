use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use crate::metrics::LOCAL_MAPPINGS;
use crate::Hyperrectangle;
use crate::RegionError;
use crate::Result;
use crate::RetryPolicy;

/// Name of a table, optionally bound to one region of its group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleStoreName {
    group: String,
    table: String,
    region_id: Option<u64>,
}

impl TupleStoreName {
    pub fn new(
        group: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            table: table.into(),
            region_id: None,
        }
    }

    pub fn with_region(
        &self,
        region_id: u64,
    ) -> Self {
        Self {
            group: self.group.clone(),
            table: self.table.clone(),
            region_id: Some(region_id),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn region_id(&self) -> Option<u64> {
        self.region_id
    }

    /// `<group>_<table>` or `<group>_<table>_<regionId>`
    pub fn full_name(&self) -> String {
        match self.region_id {
            Some(id) => format!("{}_{}_{}", self.group, self.table, id),
            None => format!("{}_{}", self.group, self.table),
        }
    }
}

impl fmt::Display for TupleStoreName {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Region id to box cache of the regions this process serves.
///
/// Pure cache: the region syncer recomputes it from the tree after every
/// settled update. Waiters block on a condition variable and re-check their
/// predicate after each wake up and once more before timing out.
pub struct RegionIdMapper {
    group: String,
    mappings: Mutex<HashMap<u64, Hyperrectangle>>,
    changed: Condvar,
    lookup_retry: RetryPolicy,
}

impl fmt::Debug for RegionIdMapper {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RegionIdMapper")
            .field("group", &self.group)
            .field("mappings", &self.mappings.lock().len())
            .finish()
    }
}

impl RegionIdMapper {
    pub fn new(
        group: impl Into<String>,
        lookup_retry: RetryPolicy,
    ) -> Self {
        Self {
            group: group.into(),
            mappings: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
            lookup_retry,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// `false` (and a warning) when the region is already mapped
    pub fn add(
        &self,
        region_id: u64,
        bbox: Hyperrectangle,
    ) -> bool {
        let mut mappings = self.mappings.lock();
        if mappings.contains_key(&region_id) {
            warn!(group = %self.group, region_id, "Mapping for region already exists");
            return false;
        }
        mappings.insert(region_id, bbox);
        debug!(group = %self.group, region_id, "Added local mapping");
        self.publish(&mappings);
        true
    }

    /// `false` when no mapping existed
    pub fn remove(
        &self,
        region_id: u64,
    ) -> bool {
        let mut mappings = self.mappings.lock();
        let removed = mappings.remove(&region_id).is_some();
        if removed {
            debug!(group = %self.group, region_id, "Removed local mapping");
            self.publish(&mappings);
        }
        removed
    }

    /// Replaces the content with `expected`: missing ids are added, ids not
    /// in `expected` are removed. Returns `(added, removed)`.
    pub fn reconcile(
        &self,
        expected: Vec<(u64, Hyperrectangle)>,
    ) -> (Vec<u64>, Vec<u64>) {
        let expected: HashMap<u64, Hyperrectangle> = expected.into_iter().collect();
        let mut mappings = self.mappings.lock();

        let mut removed: Vec<u64> = mappings
            .keys()
            .filter(|id| !expected.contains_key(id))
            .copied()
            .collect();
        removed.sort_unstable();
        for id in &removed {
            mappings.remove(id);
        }

        let mut added = Vec::new();
        for (id, bbox) in expected {
            if let std::collections::hash_map::Entry::Vacant(entry) = mappings.entry(id) {
                entry.insert(bbox);
                added.push(id);
            }
        }
        added.sort_unstable();

        if !added.is_empty() || !removed.is_empty() {
            debug!(group = %self.group, ?added, ?removed, "Reconciled local mappings");
            self.publish(&mappings);
        }
        (added, removed)
    }

    /// Empties the cache and wakes every waiter
    pub fn clear(&self) {
        let mut mappings = self.mappings.lock();
        mappings.clear();
        self.publish(&mappings);
    }

    fn publish(
        &self,
        mappings: &HashMap<u64, Hyperrectangle>,
    ) {
        LOCAL_MAPPINGS
            .with_label_values(&[&self.group])
            .set(mappings.len() as i64);
        self.changed.notify_all();
    }

    pub fn contains(
        &self,
        region_id: u64,
    ) -> bool {
        self.mappings.lock().contains_key(&region_id)
    }

    pub fn len(&self) -> usize {
        self.mappings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mapped regions whose box intersects `bbox`, ascending
    pub fn region_ids_for_box(
        &self,
        bbox: &Hyperrectangle,
    ) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .mappings
            .lock()
            .iter()
            .filter(|(_, b)| b.intersects(bbox))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn all_region_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.mappings.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Content as sorted `(region id, box)` pairs
    pub fn snapshot(&self) -> Vec<(u64, Hyperrectangle)> {
        let mut entries: Vec<(u64, Hyperrectangle)> = self
            .mappings
            .lock()
            .iter()
            .map(|(id, b)| (*id, b.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub fn wait_until_appears(
        &self,
        region_id: u64,
        timeout: Duration,
    ) -> Result<()> {
        self.wait_until(region_id, timeout, |m| m.contains_key(&region_id))
    }

    pub fn wait_until_disappears(
        &self,
        region_id: u64,
        timeout: Duration,
    ) -> Result<()> {
        self.wait_until(region_id, timeout, |m| !m.contains_key(&region_id))
    }

    fn wait_until<P>(
        &self,
        region_id: u64,
        timeout: Duration,
        predicate: P,
    ) -> Result<()>
    where
        P: Fn(&HashMap<u64, Hyperrectangle>) -> bool,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut mappings = self.mappings.lock();
        while !predicate(&mappings) {
            if self.changed.wait_until(&mut mappings, deadline).timed_out() {
                if predicate(&mappings) {
                    return Ok(());
                }
                return Err(RegionError::WaitTimeout {
                    region_id,
                    waited: started.elapsed(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Tables of the locally served regions overlapping `bbox`.
    ///
    /// Retries while the lookup is empty (the tree may still converge); an
    /// empty result after the last attempt is logged, not an error.
    pub fn local_tables_for_region(
        &self,
        bbox: &Hyperrectangle,
        store: &TupleStoreName,
    ) -> Vec<TupleStoreName> {
        let attempts = self.lookup_retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            let ids = self.region_ids_for_box(bbox);
            if !ids.is_empty() {
                return self.convert_region_ids_to_tables(store, &ids);
            }
            if attempt < attempts && self.lookup_retry.delay_ms > 0 {
                thread::sleep(self.lookup_retry.delay());
            }
        }
        warn!(
            group = %self.group,
            table = %store,
            "Got an empty result for local tables of box {}",
            bbox
        );
        Vec::new()
    }

    pub fn all_local_tables(
        &self,
        store: &TupleStoreName,
    ) -> Vec<TupleStoreName> {
        self.convert_region_ids_to_tables(store, &self.all_region_ids())
    }

    pub fn convert_region_ids_to_tables(
        &self,
        store: &TupleStoreName,
        region_ids: &[u64],
    ) -> Vec<TupleStoreName> {
        region_ids.iter().map(|id| store.with_region(*id)).collect()
    }
}
