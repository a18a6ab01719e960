//! Storage boundary: the blocked-hours table and the read-only bookings view.
//!
//! `BlockedHourStore` is the seam the hosted backend client plugs into;
//! `WalStore` is the durable reference implementation backed by the journal.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info};

use crate::feed::ChangeFeed;
use crate::journal::Journal;
use crate::model::{
    BlockEvent, BlockId, BlockedInterval, Booking, BookingId, BookingStatus, DAY_END, NewBlock,
    SpaceDays, SpaceId,
};
use crate::observability;

pub type SharedSpaceDays = Arc<RwLock<SpaceDays>>;

// ── Errors ───────────────────────────────────────────────

#[derive(Debug)]
pub enum StoreError {
    /// Caller passed a malformed range or span.
    InvalidRange(&'static str),
    /// A guard-rail constant was hit.
    LimitExceeded(&'static str),
    /// The new span overlaps an existing block on the same space/date.
    Overlap { existing: BlockId },
    /// A bounded client-side timeout elapsed.
    Timeout,
    /// The backing service failed or is unreachable.
    Unavailable(String),
    /// The local journal failed.
    Journal(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidRange(what) => write!(f, "invalid range: {what}"),
            StoreError::LimitExceeded(what) => write!(f, "limit exceeded: {what}"),
            StoreError::Overlap { existing } => {
                write!(f, "span overlaps existing block {existing}")
            }
            StoreError::Timeout => write!(f, "store call timed out"),
            StoreError::Unavailable(why) => write!(f, "store unavailable: {why}"),
            StoreError::Journal(why) => write!(f, "journal error: {why}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// True for failures worth a retry affordance, as opposed to rejections
    /// that will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::Unavailable(_) | StoreError::Journal(_))
    }
}

// ── Traits ───────────────────────────────────────────────

/// Durable CRUD over blocked intervals, queryable by space and date range.
#[async_trait]
pub trait BlockedHourStore: Send + Sync {
    /// All intervals for `space_id` with `start <= date <= end` (inclusive),
    /// ordered by `(date, span.start)` ascending. An unknown space yields an
    /// empty vec, not an error.
    async fn fetch_by_range(
        &self,
        space_id: SpaceId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BlockedInterval>, StoreError>;

    /// Insert a new interval, assigning id and audit stamps. Rejects a span
    /// that overlaps an existing block on the same space/date. Does NOT look
    /// at bookings; that guard sits in the engine.
    async fn create(&self, new: NewBlock) -> Result<BlockedInterval, StoreError>;

    /// Remove an interval. Deleting an id that no longer exists is success:
    /// concurrent-delete races must not surface as errors.
    async fn delete(&self, id: BlockId) -> Result<(), StoreError>;
}

/// Read-only view of the sibling bookings table.
#[async_trait]
pub trait BookingSource: Send + Sync {
    /// Bookings for `space_id` touching any date in the inclusive range.
    /// Cancelled rows are excluded; pending rows are included (they tag
    /// slots without blocking them).
    async fn fetch_by_range(
        &self,
        space_id: SpaceId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError>;
}

// ── Group-commit journal channel ─────────────────────────

pub(crate) enum JournalCommand {
    Append {
        event: BlockEvent,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<BlockEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty; flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

type PendingAppend = (BlockEvent, oneshot::Sender<io::Result<()>>);

fn flush_and_respond(journal: &mut Journal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(journal: &mut Journal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (these callers were told it failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

// ── WalStore ─────────────────────────────────────────────

/// Durable reference store: per-space day maps guarded by `RwLock`, a
/// journal behind a group-commit writer task, and a change feed.
pub struct WalStore {
    state: DashMap<SpaceId, SharedSpaceDays>,
    journal_tx: mpsc::Sender<JournalCommand>,
    feed: Arc<ChangeFeed>,
    /// Reverse lookup: block id → (space, date), so deletes skip a scan.
    block_index: DashMap<BlockId, (SpaceId, NaiveDate)>,
}

impl WalStore {
    /// Replay the journal at `path` and start the writer task.
    /// Must run inside a tokio runtime.
    pub fn open(path: &Path, feed: Arc<ChangeFeed>) -> io::Result<Self> {
        let events = Journal::replay(path)?;
        let journal = Journal::open(path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = Self {
            state: DashMap::new(),
            journal_tx,
            feed,
            block_index: DashMap::new(),
        };

        // Replay: we are the sole owner of these Arcs, so try_write always
        // succeeds. Never blocking_write here: open may run in async context.
        let replayed = events.len();
        for event in events {
            match event {
                BlockEvent::Created { id, space_id, date, span, reason, created_at } => {
                    let space = store.space_or_create(space_id);
                    let mut days = space.try_write().expect("replay: uncontended write");
                    days.insert(BlockedInterval {
                        id,
                        space_id,
                        date,
                        span,
                        reason,
                        created_at,
                        updated_at: created_at,
                    });
                    store.block_index.insert(id, (space_id, date));
                }
                BlockEvent::Deleted { id, space_id, date } => {
                    if let Some(space) = store.space(space_id) {
                        let mut days = space.try_write().expect("replay: uncontended write");
                        days.remove(date, id);
                    }
                    store.block_index.remove(&id);
                }
            }
        }
        store
            .state
            .retain(|_, space| !space.try_read().expect("replay: uncontended read").is_empty());
        if replayed > 0 {
            info!(records = replayed, "journal replayed");
        }

        Ok(store)
    }

    fn space(&self, id: SpaceId) -> Option<SharedSpaceDays> {
        self.state.get(&id).map(|e| e.value().clone())
    }

    fn space_or_create(&self, id: SpaceId) -> SharedSpaceDays {
        self.state
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(SpaceDays::new())))
            .value()
            .clone()
    }

    /// Write an event via the background group-commit writer.
    async fn journal_append(&self, event: &BlockEvent) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append { event: event.clone(), response: tx })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))
    }

    /// Rewrite the journal with one Created record per live block.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let mut events = Vec::new();
        let spaces: Vec<SharedSpaceDays> = self.state.iter().map(|e| e.value().clone()).collect();
        for space in spaces {
            let days = space.read().await;
            for block in days.days.values().flatten() {
                events.push(BlockEvent::Created {
                    id: block.id,
                    space_id: block.space_id,
                    date: block.date,
                    span: block.span,
                    reason: block.reason.clone(),
                    created_at: block.created_at,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> Result<u64, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await.map_err(|_| StoreError::Journal("journal writer dropped response".into()))
    }
}

fn validate_new(new: &NewBlock) -> Result<(), StoreError> {
    use crate::limits::*;
    if new.span.start >= new.span.end {
        return Err(StoreError::InvalidRange("span start must precede end"));
    }
    if new.span.end > DAY_END {
        return Err(StoreError::InvalidRange("span runs past the end of the day"));
    }
    if new.date.year() < MIN_BLOCK_YEAR || new.date.year() > MAX_BLOCK_YEAR {
        return Err(StoreError::LimitExceeded("date out of range"));
    }
    if let Some(reason) = &new.reason
        && reason.len() > MAX_REASON_LEN
    {
        return Err(StoreError::LimitExceeded("reason too long"));
    }
    Ok(())
}

fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), StoreError> {
    if start > end {
        return Err(StoreError::InvalidRange("start date after end date"));
    }
    if (end - start).num_days() + 1 > crate::limits::MAX_QUERY_DAYS {
        return Err(StoreError::LimitExceeded("date range too wide"));
    }
    Ok(())
}

#[async_trait]
impl BlockedHourStore for WalStore {
    async fn fetch_by_range(
        &self,
        space_id: SpaceId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BlockedInterval>, StoreError> {
        validate_range(start, end)?;
        metrics::counter!(observability::STORE_FETCHES_TOTAL).increment(1);
        let Some(space) = self.space(space_id) else {
            return Ok(Vec::new());
        };
        let days = space.read().await;
        Ok(days.in_range(start, end).cloned().collect())
    }

    async fn create(&self, new: NewBlock) -> Result<BlockedInterval, StoreError> {
        validate_new(&new)?;
        let space = self.space_or_create(new.space_id);
        // The write lock is held across the journal ack: it serializes
        // same-space writes, which is what keeps the overlap check valid.
        let mut days = space.write().await;
        if days.day(new.date).len() >= crate::limits::MAX_BLOCKS_PER_DAY {
            return Err(StoreError::LimitExceeded("too many blocks on one day"));
        }
        if let Some(existing) = days.overlapping(new.date, new.span).next() {
            metrics::counter!(observability::STORE_OVERLAP_REJECTS_TOTAL).increment(1);
            debug!(space = %new.space_id, date = %new.date, span = %new.span,
                   existing = %existing.id, "create rejected: overlap");
            return Err(StoreError::Overlap { existing: existing.id });
        }

        let now = Utc::now();
        let block = BlockedInterval {
            id: BlockId::generate(),
            space_id: new.space_id,
            date: new.date,
            span: new.span,
            reason: new.reason,
            created_at: now,
            updated_at: now,
        };
        let event = BlockEvent::Created {
            id: block.id,
            space_id: block.space_id,
            date: block.date,
            span: block.span,
            reason: block.reason.clone(),
            created_at: now,
        };
        self.journal_append(&event).await?;
        days.insert(block.clone());
        drop(days);
        self.block_index.insert(block.id, (block.space_id, block.date));
        self.feed.send(&event);
        metrics::counter!(observability::BLOCKS_CREATED_TOTAL).increment(1);
        debug!(space = %block.space_id, date = %block.date, span = %block.span, "block created");
        Ok(block)
    }

    async fn delete(&self, id: BlockId) -> Result<(), StoreError> {
        let Some((space_id, date)) = self.block_index.get(&id).map(|e| *e.value()) else {
            debug!(block = %id, "delete of absent block treated as success");
            return Ok(());
        };
        let Some(space) = self.space(space_id) else {
            self.block_index.remove(&id);
            return Ok(());
        };

        let mut days = space.write().await;
        if !days.day(date).iter().any(|b| b.id == id) {
            // Lost a concurrent-delete race after the index lookup.
            drop(days);
            self.block_index.remove(&id);
            return Ok(());
        }
        let event = BlockEvent::Deleted { id, space_id, date };
        self.journal_append(&event).await?;
        days.remove(date, id);
        drop(days);
        self.block_index.remove(&id);
        self.feed.send(&event);
        metrics::counter!(observability::BLOCKS_DELETED_TOTAL).increment(1);
        debug!(space = %space_id, date = %date, block = %id, "block deleted");
        Ok(())
    }
}

// ── StaticBookings ───────────────────────────────────────

/// In-memory booking source: the test fixture, and the adapter for embedders
/// that already hold the rows they fetched elsewhere.
#[derive(Default)]
pub struct StaticBookings {
    rows: DashMap<BookingId, Booking>,
}

impl StaticBookings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, booking: Booking) {
        self.rows.insert(booking.id, booking);
    }

    pub fn set_status(&self, id: BookingId, status: BookingStatus) {
        if let Some(mut b) = self.rows.get_mut(&id) {
            b.status = status;
        }
    }
}

#[async_trait]
impl BookingSource for StaticBookings {
    async fn fetch_by_range(
        &self,
        space_id: SpaceId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError> {
        if start > end {
            return Err(StoreError::InvalidRange("start date after end date"));
        }
        let mut rows: Vec<Booking> = self
            .rows
            .iter()
            .filter(|e| {
                let b = e.value();
                b.space_id == space_id
                    && b.status != BookingStatus::Cancelled
                    && b.start_date <= end
                    && start <= b.end_date
            })
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|b| (b.start_date, b.span.start));
        Ok(rows)
    }
}
