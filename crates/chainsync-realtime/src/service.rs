//! The realtime sync service — follows the chain head, reconciles forks,
//! and drives persistence through the event store.
//!
//! # Lifecycle
//!
//! [`RealtimeSync::setup`] fetches the latest block, derives the initial
//! finality checkpoint, and enqueues the latest block as the first task.
//! [`RealtimeSync::start`] seeds the local chain at the finalized block
//! and runs the worker loop: drain the task queue, then wait for the next
//! poll tick (which fetches the latest block and enqueues it) or for
//! shutdown.
//!
//! # Block classification
//!
//! Each dequeued block is compared against the local chain head:
//! duplicate → no-op; direct child → extend; number gap → fetch the
//! missing range and re-enqueue; anything else → reorg reconciliation.
//!
//! The worker is strictly sequential. Classification assumes a stable
//! local head during task execution, so at most one block task ever runs
//! at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use chainsync_core::bloom::{might_contain, parse_bloom};
use chainsync_core::filter::filter_logs;
use chainsync_core::queue::{block_priority, QueuedTask, TaskQueue};
use chainsync_core::types::{BlockHeader, Log, Transaction};
use chainsync_core::{
    EventPublisher, LocalChain, LogFilterConfig, LogFilterSpec, NetworkConfig, SyncEvent,
};
use chainsync_rpc::{BlockTag, EthRpcClient, RetryConfig, RpcBlock, RpcError};
use chainsync_store::EventStore;

use crate::error::SyncError;

/// Upper bound on concurrent block fetches while filling a gap.
const GAP_FETCH_CONCURRENCY: usize = 10;

/// What `setup` reports back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupSummary {
    pub latest_block_number: u64,
    pub finalized_block_number: u64,
}

/// Consumer-side handle: the event stream plus the kill switch.
pub struct SyncHandle {
    pub events: mpsc::UnboundedReceiver<SyncEvent>,
    shutdown: watch::Sender<bool>,
}

impl SyncHandle {
    /// Stop polling and clear pending tasks. An in-flight task is not
    /// preempted; its store writes are individually atomic.
    pub fn kill(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Realtime head-following sync for one network.
pub struct RealtimeSync {
    network: NetworkConfig,
    filters: Vec<LogFilterConfig>,
    /// Cached copy of the filter specs, in filter order.
    specs: Vec<LogFilterSpec>,
    rpc: Arc<dyn EthRpcClient>,
    store: Arc<dyn EventStore>,
    chain: LocalChain,
    queue: TaskQueue<RpcBlock>,
    events: EventPublisher,
    retry: RetryConfig,
    finalized_block_number: u64,
    shutdown: watch::Receiver<bool>,
}

impl RealtimeSync {
    pub fn new(
        network: NetworkConfig,
        filters: Vec<LogFilterConfig>,
        rpc: Arc<dyn EthRpcClient>,
        store: Arc<dyn EventStore>,
    ) -> (Self, SyncHandle) {
        let (events, event_rx) = EventPublisher::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let specs = filters.iter().map(|f| f.filter.clone()).collect();
        let service = Self {
            network,
            filters,
            specs,
            rpc,
            store,
            chain: LocalChain::new(),
            queue: TaskQueue::new(),
            events,
            retry: RetryConfig::default(),
            finalized_block_number: 0,
            shutdown: shutdown_rx,
        };
        let handle = SyncHandle {
            events: event_rx,
            shutdown: shutdown_tx,
        };
        (service, handle)
    }

    /// The current finality checkpoint.
    pub fn finalized_block_number(&self) -> u64 {
        self.finalized_block_number
    }

    /// Fetch the latest block, derive the initial finality checkpoint, and
    /// enqueue the latest block as the first task.
    pub async fn setup(&mut self) -> Result<SetupSummary, SyncError> {
        let latest = self
            .rpc
            .block_by_number(BlockTag::Latest, true)
            .await?
            .ok_or_else(|| RpcError::BlockNotFound("latest".into()))?;
        let latest_block_number = latest.number()?;

        self.finalized_block_number =
            latest_block_number.saturating_sub(self.network.finality_block_count);
        self.queue.push(latest, block_priority(latest_block_number));

        info!(
            latest = latest_block_number,
            finalized = self.finalized_block_number,
            "realtime sync ready"
        );
        Ok(SetupSummary {
            latest_block_number,
            finalized_block_number: self.finalized_block_number,
        })
    }

    /// Seed the local chain at the finalized block and run the worker loop
    /// until [`SyncHandle::kill`] or a fatal error.
    pub async fn start(&mut self) -> Result<(), SyncError> {
        let exhausted = self
            .filters
            .iter()
            .all(|f| matches!(f.filter.end_block, Some(end) if end <= self.finalized_block_number));
        if exhausted {
            warn!(
                finalized = self.finalized_block_number,
                "all log filters end at or below the finality checkpoint; not polling"
            );
            return Ok(());
        }

        let finalized = self
            .rpc
            .block_by_number(BlockTag::Number(self.finalized_block_number), false)
            .await?
            .ok_or_else(|| {
                SyncError::InvariantViolation(format!(
                    "finalized block {} missing from endpoint",
                    self.finalized_block_number
                ))
            })?;
        self.chain.seed(finalized.to_header()?);
        self.queue.resume();

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.network.polling_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();

        loop {
            self.drain_queue().await?;

            tokio::select! {
                _ = shutdown.changed() => {
                    self.queue.pause();
                    self.queue.clear();
                    info!("realtime sync stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.rpc.block_by_number(BlockTag::Latest, true).await {
                        Ok(Some(latest)) => {
                            if let Err(error) = self.enqueue_block(latest) {
                                self.emit_error(&error);
                            }
                        }
                        Ok(None) => warn!("endpoint returned no latest block"),
                        Err(error) => {
                            warn!(error = %error, "latest-block poll failed");
                            self.emit_error(&error.into());
                        }
                    }
                }
            }
        }
    }

    /// Process queued block tasks one at a time, lowest block number
    /// first. Retryable failures re-enqueue per the retry policy; fatal
    /// failures propagate.
    async fn drain_queue(&mut self) -> Result<(), SyncError> {
        while let Some(entry) = self.queue.pop() {
            if *self.shutdown.borrow() {
                return Ok(());
            }
            if let Err(error) = self.process_block(&entry.task).await {
                self.emit_error(&error);
                if !error.is_retryable() {
                    return Err(error);
                }
                self.retry_task(entry, &error).await;
            }
        }
        Ok(())
    }

    async fn retry_task(&mut self, entry: QueuedTask<RpcBlock>, error: &SyncError) {
        let attempt = entry.attempts + 1;
        match self.retry.next_delay(attempt) {
            Some(delay) => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "block task failed; retrying"
                );
                tokio::time::sleep(delay).await;
                self.queue.requeue(entry.task, entry.priority, attempt);
            }
            None => {
                warn!(error = %error, "block task retries exhausted; dropping");
            }
        }
    }

    /// Classify one dequeued block against the local chain head and act.
    async fn process_block(&mut self, block: &RpcBlock) -> Result<(), SyncError> {
        let header = block.to_header()?;

        if self.chain.contains_hash(&header.hash) {
            debug!(block = header.number, "duplicate block");
            return Ok(());
        }

        let Some(head) = self.chain.head().cloned() else {
            return Err(SyncError::InvariantViolation(
                "local chain is empty; start() must seed it before processing".into(),
            ));
        };

        if header.number == head.number + 1 && header.parent_hash == head.hash {
            return self.extend(block, header).await;
        }
        if header.number > head.number + 1 {
            return self.fill_gap(block, head.number, header.number).await;
        }
        self.reconcile(block, header).await
    }

    /// Accept a new head: screen the bloom, persist any matched logs with
    /// their block and transactions, then advance finality if the head has
    /// moved far enough past the checkpoint.
    async fn extend(&mut self, block: &RpcBlock, header: BlockHeader) -> Result<(), SyncError> {
        let bloom =
            parse_bloom(&header.logs_bloom).map_err(|e| SyncError::MalformedBlock(e.to_string()))?;

        let mut matched = Vec::new();
        if might_contain(&bloom, &self.specs) {
            let raw_logs = self.rpc.logs_by_block_hash(&header.hash).await?;
            let logs: Vec<Log> = raw_logs
                .iter()
                .map(|l| l.to_log(Some(header.timestamp)))
                .collect::<Result<_, _>>()?;
            matched = filter_logs(logs, &self.specs);
        }

        if !matched.is_empty() {
            let full_block = block.to_block()?;
            let wanted: HashSet<&str> = matched
                .iter()
                .map(|log| log.transaction_hash.as_str())
                .collect();
            let transactions: Vec<Transaction> = block
                .full_transactions()
                .iter()
                .filter(|t| wanted.contains(t.hash.as_str()))
                .map(|t| t.to_transaction(self.network.chain_id))
                .collect::<Result<_, _>>()?;
            self.store
                .insert_realtime_block(self.network.chain_id, &full_block, &transactions, &matched)
                .await?;
            info!(
                block = header.number,
                logs = matched.len(),
                transactions = transactions.len(),
                "matched logs persisted"
            );
        }

        let timestamp = header.timestamp;
        let number = header.number;
        self.chain
            .try_append(header)
            .map_err(|e| SyncError::InvariantViolation(e.to_string()))?;
        self.events
            .emit(SyncEvent::RealtimeCheckpoint { timestamp });
        debug!(block = number, "head extended");

        if number > self.finalized_block_number + 2 * self.network.finality_block_count {
            self.advance_finality().await?;
        }
        Ok(())
    }

    /// Move the finality checkpoint forward by `finality_block_count`
    /// blocks, prune the local chain behind it, and record the newly
    /// finalized range for every log filter.
    async fn advance_finality(&mut self) -> Result<(), SyncError> {
        let target = self.finalized_block_number + self.network.finality_block_count;
        let newly_finalized = self.chain.at_number(target).cloned().ok_or_else(|| {
            SyncError::InvariantViolation(format!(
                "block {target} missing from the local chain during finality advance"
            ))
        })?;

        self.chain.prune_below(newly_finalized.number);

        let keys: Vec<String> = self.filters.iter().map(|f| f.key.clone()).collect();
        self.store
            .insert_log_filter_cached_ranges(
                &keys,
                self.finalized_block_number + 1,
                newly_finalized.number,
                newly_finalized.timestamp,
            )
            .await?;

        self.finalized_block_number = newly_finalized.number;
        self.events.emit(SyncEvent::FinalityCheckpoint {
            timestamp: newly_finalized.timestamp,
        });
        info!(finalized = newly_finalized.number, "finality advanced");
        Ok(())
    }

    /// Fetch the blocks between the local head and a block that arrived
    /// ahead of it, then enqueue the whole run in ascending order.
    async fn fill_gap(
        &mut self,
        block: &RpcBlock,
        head_number: u64,
        number: u64,
    ) -> Result<(), SyncError> {
        debug!(from = head_number + 1, to = number - 1, "filling gap");

        let rpc = Arc::clone(&self.rpc);
        let fetched: Vec<RpcBlock> = stream::iter(head_number + 1..number)
            .map(|missing| {
                let rpc = Arc::clone(&rpc);
                async move {
                    rpc.block_by_number(BlockTag::Number(missing), true)
                        .await?
                        .ok_or_else(|| RpcError::BlockNotFound(format!("{missing}")))
                }
            })
            .buffered(GAP_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        for missing in fetched {
            self.enqueue_block(missing)?;
        }
        self.enqueue_block(block.clone())?;
        Ok(())
    }

    /// Walk parent hashes backwards from a non-linking block until a
    /// common ancestor above the finality checkpoint is found, then swap
    /// the local suffix for the new canonical branch.
    async fn reconcile(&mut self, block: &RpcBlock, header: BlockHeader) -> Result<(), SyncError> {
        warn!(
            block = header.number,
            hash = %header.hash,
            "block does not extend the local chain; reconciling"
        );

        let detected_at = header.number;
        let mut canonical: Vec<RpcBlock> = vec![block.clone()];
        let mut cursor = header;
        let mut depth: u64 = 0;

        while cursor.number > self.finalized_block_number {
            if let Some(ancestor) = self.chain.by_hash(&cursor.parent_hash).cloned() {
                self.chain.truncate_to(ancestor.number);
                self.store
                    .delete_realtime_data(self.network.chain_id, ancestor.number + 1)
                    .await?;
                // Pending tasks predate the fork detection and may
                // reference non-canonical hashes.
                self.queue.clear();
                for canonical_block in canonical {
                    self.enqueue_block(canonical_block)?;
                }
                // One immediate head fetch so the tail of the new branch
                // is not left waiting for the next poll tick. The next
                // tick delivers the same block, so a failure here only
                // costs latency.
                match self.rpc.block_by_number(BlockTag::Latest, true).await {
                    Ok(Some(latest)) => self.enqueue_block(latest)?,
                    Ok(None) => {}
                    Err(error) => warn!(error = %error, "latest-block fetch after reorg failed"),
                }
                self.events.emit(SyncEvent::ShallowReorg {
                    common_ancestor_timestamp: ancestor.timestamp,
                });
                info!(ancestor = ancestor.number, depth, "shallow reorg reconciled");
                return Ok(());
            }

            let parent = self
                .rpc
                .block_by_hash(&cursor.parent_hash, true)
                .await?
                .ok_or_else(|| RpcError::BlockNotFound(cursor.parent_hash.clone()))?;
            cursor = parent.to_header()?;
            canonical.insert(0, parent);
            depth += 1;
        }

        // The walk reached the finalized block without converging. Leave
        // the local chain alone; recovery is the consumer's call.
        self.events.emit(SyncEvent::DeepReorg {
            detected_at_block_number: detected_at,
            minimum_depth: depth,
        });
        warn!(
            detected_at,
            minimum_depth = depth,
            "deep reorg; local chain left untouched"
        );
        Ok(())
    }

    fn enqueue_block(&mut self, block: RpcBlock) -> Result<(), SyncError> {
        let number = block.number()?;
        self.queue.push(block, block_priority(number));
        Ok(())
    }

    fn emit_error(&self, error: &SyncError) {
        self.events.emit(SyncEvent::Error {
            message: error.to_string(),
        });
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ethbloom::{Bloom, Input};

    use chainsync_rpc::models::{BlockTransactions, RpcLog, RpcTransaction};
    use chainsync_store::{LogQuery, SqliteEventStore};

    // ── Fixtures ──────────────────────────────────────────────────────────────

    fn hex_of(bytes: &[u8]) -> String {
        format!("0x{}", hex::encode(bytes))
    }

    fn address(byte: u8) -> String {
        hex_of(&[byte; 20])
    }

    fn empty_bloom() -> String {
        hex_of(Bloom::zero().as_bytes())
    }

    fn bloom_over(values: &[&str]) -> String {
        let mut bloom = Bloom::zero();
        for value in values {
            let bytes = hex::decode(value.trim_start_matches("0x")).unwrap();
            bloom.accrue(Input::Raw(&bytes));
        }
        hex_of(bloom.as_bytes())
    }

    fn rpc_block(number: u64, hash: &str, parent: &str, bloom: String) -> RpcBlock {
        RpcBlock {
            hash: hash.into(),
            number: format!("0x{number:x}"),
            parent_hash: parent.into(),
            timestamp: format!("0x{:x}", number * 12),
            logs_bloom: bloom,
            gas_limit: "0x1c9c380".into(),
            gas_used: "0x5208".into(),
            base_fee_per_gas: Some("0x7".into()),
            miner: "0xminer".into(),
            extra_data: "0x".into(),
            size: "0x220".into(),
            state_root: "0xstate".into(),
            transactions_root: "0xtxroot".into(),
            receipts_root: "0xrcroot".into(),
            total_difficulty: Some("0x1".into()),
            transactions: BlockTransactions::Full(Vec::new()),
        }
    }

    fn rpc_transaction(hash: &str, block: &RpcBlock) -> RpcTransaction {
        RpcTransaction {
            hash: hash.into(),
            nonce: "0x1".into(),
            from: "0xsender".into(),
            to: Some("0xrecipient".into()),
            value: "0x0".into(),
            input: "0x".into(),
            gas: "0x5208".into(),
            gas_price: Some("0x3b9aca00".into()),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            block_hash: block.hash.clone(),
            block_number: block.number.clone(),
            transaction_index: "0x0".into(),
        }
    }

    fn rpc_log(block: &RpcBlock, index: u32, address: &str, tx_hash: &str) -> RpcLog {
        RpcLog {
            address: address.into(),
            topics: vec!["0xsig".into()],
            data: "0xdata".into(),
            block_hash: block.hash.clone(),
            block_number: block.number.clone(),
            transaction_hash: tx_hash.into(),
            transaction_index: "0x0".into(),
            log_index: format!("0x{index:x}"),
            removed: false,
        }
    }

    fn local_header(number: u64) -> BlockHeader {
        BlockHeader {
            hash: format!("0xb{number}"),
            number,
            parent_hash: format!("0xb{}", number - 1),
            timestamp: (number * 12) as i64,
            logs_bloom: empty_bloom(),
        }
    }

    // ── Mock RPC ──────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct MockRpc {
        by_number: Mutex<HashMap<u64, RpcBlock>>,
        by_hash: Mutex<HashMap<String, RpcBlock>>,
        logs: Mutex<HashMap<String, Vec<RpcLog>>>,
        latest: Mutex<Option<RpcBlock>>,
        logs_calls: AtomicUsize,
        fail_logs_once: AtomicBool,
    }

    impl MockRpc {
        fn insert_block(&self, block: RpcBlock) {
            let number = block.number().unwrap();
            self.by_hash
                .lock()
                .unwrap()
                .insert(block.hash.clone(), block.clone());
            self.by_number.lock().unwrap().insert(number, block);
        }

        fn set_latest(&self, block: RpcBlock) {
            self.insert_block(block.clone());
            *self.latest.lock().unwrap() = Some(block);
        }

        fn set_logs(&self, block_hash: &str, logs: Vec<RpcLog>) {
            self.logs.lock().unwrap().insert(block_hash.into(), logs);
        }
    }

    #[async_trait]
    impl EthRpcClient for MockRpc {
        async fn block_by_number(
            &self,
            tag: BlockTag,
            _full_transactions: bool,
        ) -> Result<Option<RpcBlock>, RpcError> {
            match tag {
                BlockTag::Latest => Ok(self.latest.lock().unwrap().clone()),
                BlockTag::Number(n) => Ok(self.by_number.lock().unwrap().get(&n).cloned()),
            }
        }

        async fn block_by_hash(
            &self,
            hash: &str,
            _full_transactions: bool,
        ) -> Result<Option<RpcBlock>, RpcError> {
            Ok(self.by_hash.lock().unwrap().get(hash).cloned())
        }

        async fn logs_by_block_hash(&self, block_hash: &str) -> Result<Vec<RpcLog>, RpcError> {
            self.logs_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_logs_once.swap(false, Ordering::SeqCst) {
                return Err(RpcError::Http("connection reset".into()));
            }
            Ok(self
                .logs
                .lock()
                .unwrap()
                .get(block_hash)
                .cloned()
                .unwrap_or_default())
        }
    }

    // ── Harness ───────────────────────────────────────────────────────────────

    struct Harness {
        service: RealtimeSync,
        handle: SyncHandle,
        rpc: Arc<MockRpc>,
        store: Arc<SqliteEventStore>,
    }

    async fn harness(filters: Vec<LogFilterConfig>, finality_block_count: u64) -> Harness {
        let rpc = Arc::new(MockRpc::default());
        let store = Arc::new(SqliteEventStore::in_memory().await.unwrap());
        let network = NetworkConfig {
            chain_id: 1,
            polling_interval_ms: 20,
            finality_block_count,
        };
        let rpc_client: Arc<dyn EthRpcClient> = rpc.clone();
        let event_store: Arc<dyn EventStore> = store.clone();
        let (service, handle) = RealtimeSync::new(network, filters, rpc_client, event_store);
        Harness {
            service,
            handle,
            rpc,
            store,
        }
    }

    fn single_filter(addr: &str) -> Vec<LogFilterConfig> {
        vec![LogFilterConfig::new(addr, LogFilterSpec::address(addr))]
    }

    fn drain_events(handle: &mut SyncHandle) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = handle.events.try_recv() {
            events.push(event);
        }
        events
    }

    async fn all_logs(store: &SqliteEventStore, addr: &str) -> Vec<Log> {
        store
            .get_logs(&LogQuery {
                contract_address: addr.into(),
                from_block_timestamp: 0,
                to_block_timestamp: i64::MAX,
                event_sig_hashes: None,
            })
            .await
            .unwrap()
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn happy_extend_persists_matched_logs() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.chain.seed(local_header(100));

        let mut block = rpc_block(101, "0xb101", "0xb100", bloom_over(&[&addr]));
        block.transactions = BlockTransactions::Full(vec![
            rpc_transaction("0xt1", &block),
            rpc_transaction("0xt2", &block),
        ]);
        h.rpc.set_logs("0xb101", vec![rpc_log(&block, 0, &addr, "0xt1")]);

        h.service.process_block(&block).await.unwrap();

        assert_eq!(h.service.chain.head().unwrap().number, 101);
        assert_eq!(
            drain_events(&mut h.handle),
            vec![SyncEvent::RealtimeCheckpoint { timestamp: 101 * 12 }]
        );

        let stored = h.store.get_block("0xb101").await.unwrap().unwrap();
        assert_eq!(stored.number, 101);
        // only the transaction referenced by the matched log is persisted
        assert!(h.store.get_transaction("0xt1").await.unwrap().is_some());
        assert!(h.store.get_transaction("0xt2").await.unwrap().is_none());
        let logs = all_logs(&h.store, &addr).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_timestamp, Some(101 * 12));
    }

    #[tokio::test]
    async fn bloom_pass_without_matched_logs_skips_insert() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.chain.seed(local_header(100));

        // bloom passes, but the only log is from another contract
        let block = rpc_block(101, "0xb101", "0xb100", bloom_over(&[&addr]));
        h.rpc
            .set_logs("0xb101", vec![rpc_log(&block, 0, &address(0xbb), "0xt1")]);

        h.service.process_block(&block).await.unwrap();

        assert_eq!(h.rpc.logs_calls.load(Ordering::SeqCst), 1);
        assert!(h.store.get_block("0xb101").await.unwrap().is_none());
        assert_eq!(h.service.chain.head().unwrap().number, 101);
        assert_eq!(
            drain_events(&mut h.handle),
            vec![SyncEvent::RealtimeCheckpoint { timestamp: 101 * 12 }]
        );
    }

    #[tokio::test]
    async fn bloom_miss_skips_log_fetch() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.chain.seed(local_header(100));

        let block = rpc_block(101, "0xb101", "0xb100", empty_bloom());
        h.service.process_block(&block).await.unwrap();

        assert_eq!(h.rpc.logs_calls.load(Ordering::SeqCst), 0);
        assert!(h.store.get_block("0xb101").await.unwrap().is_none());
        assert_eq!(h.service.chain.head().unwrap().number, 101);
        assert_eq!(drain_events(&mut h.handle).len(), 1);
    }

    #[tokio::test]
    async fn duplicate_block_is_a_noop() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.chain.seed(local_header(100));

        let duplicate = rpc_block(100, "0xb100", "0xb99", empty_bloom());
        h.service.process_block(&duplicate).await.unwrap();

        assert_eq!(h.service.chain.len(), 1);
        assert!(drain_events(&mut h.handle).is_empty());
    }

    #[tokio::test]
    async fn gap_fill_processes_blocks_in_ascending_order() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.chain.seed(local_header(100));

        h.rpc
            .insert_block(rpc_block(101, "0xb101", "0xb100", empty_bloom()));
        h.rpc
            .insert_block(rpc_block(102, "0xb102", "0xb101", empty_bloom()));
        let head = rpc_block(103, "0xb103", "0xb102", empty_bloom());

        h.service.process_block(&head).await.unwrap();
        assert_eq!(h.service.queue.len(), 3);

        h.service.drain_queue().await.unwrap();

        assert_eq!(h.service.chain.head().unwrap().number, 103);
        let timestamps: Vec<i64> = drain_events(&mut h.handle)
            .into_iter()
            .map(|event| match event {
                SyncEvent::RealtimeCheckpoint { timestamp } => timestamp,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(timestamps, vec![101 * 12, 102 * 12, 103 * 12]);
    }

    #[tokio::test]
    async fn shallow_reorg_swaps_in_the_canonical_branch() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.chain.seed(local_header(98));
        h.service.chain.try_append(local_header(99)).unwrap();
        h.service.chain.try_append(local_header(100)).unwrap();

        // realtime rows for the stale block 100
        let stale = rpc_block(100, "0xb100", "0xb99", bloom_over(&[&addr]));
        let stale_block = stale.to_block().unwrap();
        h.store
            .insert_realtime_block(
                1,
                &stale_block,
                &[],
                &[rpc_log(&stale, 0, &addr, "0xt1").to_log(Some(1200)).unwrap()],
            )
            .await
            .unwrap();

        // the new branch: 100' links to local 99, 101' extends 100'
        h.rpc
            .insert_block(rpc_block(100, "0xa100", "0xb99", empty_bloom()));
        let new_head = rpc_block(101, "0xa101", "0xa100", empty_bloom());

        h.service.process_block(&new_head).await.unwrap();

        // truncated to the common ancestor
        assert_eq!(h.service.chain.head().unwrap().number, 99);
        // stale realtime rows deleted
        assert!(h.store.get_block("0xb100").await.unwrap().is_none());
        assert!(all_logs(&h.store, &addr).await.is_empty());
        // canonical branch re-enqueued in ascending order
        let queued: Vec<u64> = std::iter::from_fn(|| h.service.queue.pop())
            .map(|entry| entry.task.number().unwrap())
            .collect();
        assert_eq!(queued, vec![100, 101]);
        assert_eq!(
            drain_events(&mut h.handle),
            vec![SyncEvent::ShallowReorg {
                common_ancestor_timestamp: 99 * 12
            }]
        );
    }

    #[tokio::test]
    async fn finality_advances_after_two_finality_windows() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.finalized_block_number = 100;
        h.service.chain.seed(local_header(100));

        for number in 101..=121 {
            let block = rpc_block(
                number,
                &format!("0xb{number}"),
                &format!("0xb{}", number - 1),
                empty_bloom(),
            );
            h.service.process_block(&block).await.unwrap();
        }

        assert_eq!(h.service.finalized_block_number(), 110);
        assert_eq!(h.service.chain.first().unwrap().number, 110);
        assert_eq!(h.service.chain.head().unwrap().number, 121);

        let intervals = h.store.get_cached_intervals(&addr).await.unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start_block, 101);
        assert_eq!(intervals[0].end_block, 110);
        assert_eq!(intervals[0].end_block_timestamp, 110 * 12);

        let events = drain_events(&mut h.handle);
        // 21 head checkpoints, with the finality checkpoint after block 121's
        assert_eq!(events.len(), 22);
        assert_eq!(
            events[20],
            SyncEvent::RealtimeCheckpoint { timestamp: 121 * 12 }
        );
        assert_eq!(
            events[21],
            SyncEvent::FinalityCheckpoint { timestamp: 110 * 12 }
        );
    }

    #[tokio::test]
    async fn no_finality_advance_at_exact_window_boundary() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.finalized_block_number = 100;
        h.service.chain.seed(local_header(100));

        for number in 101..=120 {
            let block = rpc_block(
                number,
                &format!("0xb{number}"),
                &format!("0xb{}", number - 1),
                empty_bloom(),
            );
            h.service.process_block(&block).await.unwrap();
        }

        // 120 is not strictly greater than 100 + 2 * 10
        assert_eq!(h.service.finalized_block_number(), 100);
        assert!(h.store.get_cached_intervals(&addr).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deep_reorg_leaves_local_chain_untouched() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.finalized_block_number = 100;
        h.service.chain.seed(local_header(100));
        for number in 101..=103 {
            h.service.chain.try_append(local_header(number)).unwrap();
        }

        // a foreign branch whose ancestry never meets the local chain
        h.rpc
            .insert_block(rpc_block(103, "0xa103", "0xa102", empty_bloom()));
        h.rpc
            .insert_block(rpc_block(102, "0xa102", "0xa101", empty_bloom()));
        h.rpc
            .insert_block(rpc_block(101, "0xa101", "0xa100", empty_bloom()));
        h.rpc
            .insert_block(rpc_block(100, "0xa100", "0xa99", empty_bloom()));
        let foreign_head = rpc_block(104, "0xa104", "0xa103", empty_bloom());

        h.service.process_block(&foreign_head).await.unwrap();

        assert_eq!(
            drain_events(&mut h.handle),
            vec![SyncEvent::DeepReorg {
                detected_at_block_number: 104,
                minimum_depth: 4
            }]
        );
        assert_eq!(h.service.chain.head().unwrap().hash, "0xb103");
        assert_eq!(h.service.chain.len(), 4);
        assert!(h.service.queue.is_empty());
    }

    #[tokio::test]
    async fn setup_saturates_finality_at_zero() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.rpc
            .set_latest(rpc_block(5, "0xb5", "0xb4", empty_bloom()));

        let summary = h.service.setup().await.unwrap();

        assert_eq!(
            summary,
            SetupSummary {
                latest_block_number: 5,
                finalized_block_number: 0
            }
        );
        assert_eq!(h.service.queue.len(), 1);
    }

    #[tokio::test]
    async fn start_returns_when_all_filters_are_exhausted() {
        let addr = address(0xaa);
        let filters = vec![LogFilterConfig::new(
            &addr,
            LogFilterSpec::address(&addr).end_block(50),
        )];
        let mut h = harness(filters, 10).await;
        h.service.finalized_block_number = 100;

        h.service.start().await.unwrap();

        assert!(h.service.chain.is_empty());
        assert!(drain_events(&mut h.handle).is_empty());
    }

    #[tokio::test]
    async fn failed_task_retries_and_recovers() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 10).await;
        h.service.chain.seed(local_header(100));

        let block = rpc_block(101, "0xb101", "0xb100", bloom_over(&[&addr]));
        h.rpc.set_logs("0xb101", vec![rpc_log(&block, 0, &addr, "0xt1")]);
        h.rpc.fail_logs_once.store(true, Ordering::SeqCst);

        h.service.enqueue_block(block).unwrap();
        h.service.drain_queue().await.unwrap();

        let events = drain_events(&mut h.handle);
        assert!(matches!(events[0], SyncEvent::Error { .. }));
        assert_eq!(
            events[1],
            SyncEvent::RealtimeCheckpoint { timestamp: 101 * 12 }
        );
        assert_eq!(h.service.chain.head().unwrap().number, 101);
        assert_eq!(all_logs(&h.store, &addr).await.len(), 1);
    }

    #[tokio::test]
    async fn live_loop_follows_the_head_until_killed() {
        let addr = address(0xaa);
        let mut h = harness(single_filter(&addr), 1).await;

        h.rpc
            .insert_block(rpc_block(100, "0xb100", "0xb99", empty_bloom()));
        h.rpc
            .set_latest(rpc_block(101, "0xb101", "0xb100", empty_bloom()));

        let summary = h.service.setup().await.unwrap();
        assert_eq!(summary.finalized_block_number, 100);

        let rpc = h.rpc.clone();
        let mut service = h.service;
        let worker = tokio::spawn(async move { service.start().await });

        let first = tokio::time::timeout(Duration::from_secs(5), h.handle.events.recv())
            .await
            .unwrap();
        assert_eq!(first, Some(SyncEvent::RealtimeCheckpoint { timestamp: 101 * 12 }));

        rpc.set_latest(rpc_block(102, "0xb102", "0xb101", empty_bloom()));
        let second = tokio::time::timeout(Duration::from_secs(5), h.handle.events.recv())
            .await
            .unwrap();
        assert_eq!(second, Some(SyncEvent::RealtimeCheckpoint { timestamp: 102 * 12 }));

        h.handle.kill();
        let result = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
