//! # Concurrency
//!
//! Submitters and a forging loop share one pool across threads. Every
//! transaction is selected exactly once and every batch keeps each
//! account's nonces increasing.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use rc_02_tx_pool::{Idx, Nonce, PoolConfig, PoolL2Tx, TxId, TxPoolApi};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const SUBMITTERS: u64 = 4;
    const TXS_PER_SUBMITTER: u64 = 25;

    fn assert_monotonic(batch: &[PoolL2Tx]) {
        let mut last: HashMap<Idx, Nonce> = HashMap::new();
        for tx in batch {
            if let Some(prev) = last.insert(tx.from_idx, tx.nonce) {
                assert!(tx.nonce > prev, "nonce order broken for {:?}", tx.from_idx);
            }
        }
    }

    /// Selects, confirms and advances account nonces. Returns the batch.
    fn forge_round(node: &TestNode, batch_num: u64) -> Vec<PoolL2Tx> {
        let batch = node.service.select_batch(8).unwrap();
        if batch.is_empty() {
            return batch;
        }
        assert_monotonic(&batch);
        node.service.done_forging(&ids(&batch), batch_num).unwrap();
        for tx in &batch {
            node.accounts.set_nonce(tx.from_idx, tx.nonce + 1);
        }
        batch
    }

    #[test]
    fn test_parallel_submitters_and_forger() {
        let config = PoolConfig {
            max_txs: 1_000,
            ..PoolConfig::for_testing()
        };
        let node = Arc::new(TestNode::new(config));
        let submitting = Arc::new(AtomicBool::new(true));

        // each submitter owns two accounts and sends in nonce order
        let submitters: Vec<_> = (0..SUBMITTERS)
            .map(|worker| {
                let node = Arc::clone(&node);
                thread::spawn(move || {
                    let owned = [FIRST_ACCOUNT + 2 * worker, FIRST_ACCOUNT + 2 * worker + 1];
                    let mut sent = Vec::new();
                    for i in 0..TXS_PER_SUBMITTER {
                        let from = owned[(i % 2) as usize];
                        let tx = transfer(from, i / 2, 120 + (i % 7) as u8, 1_000 + 5 * i);
                        sent.push(node.service.add_tx(tx).unwrap());
                    }
                    sent
                })
            })
            .collect();

        let forger = {
            let node = Arc::clone(&node);
            let submitting = Arc::clone(&submitting);
            thread::spawn(move || {
                let mut selected = Vec::new();
                let mut batch_num = 1;
                while submitting.load(Ordering::Acquire) {
                    let batch = forge_round(&node, batch_num);
                    if batch.is_empty() {
                        thread::sleep(Duration::from_millis(1));
                        continue;
                    }
                    selected.extend(ids(&batch));
                    batch_num += 1;
                }
                (selected, batch_num)
            })
        };

        let mut submitted: HashSet<TxId> = HashSet::new();
        for handle in submitters {
            submitted.extend(handle.join().unwrap());
        }
        submitting.store(false, Ordering::Release);
        let (mut selected, mut batch_num) = forger.join().unwrap();

        while node.service.status().pending_count > 0 {
            let batch = forge_round(&node, batch_num);
            assert!(!batch.is_empty(), "pending rows left unselectable");
            selected.extend(ids(&batch));
            batch_num += 1;
        }

        let unique: HashSet<TxId> = selected.iter().copied().collect();
        assert_eq!(unique.len(), selected.len(), "a transaction was selected twice");
        assert_eq!(unique, submitted);

        let status = node.service.status();
        assert_eq!(status.forged_count, (SUBMITTERS * TXS_PER_SUBMITTER) as usize);
        assert_eq!(status.invalid_count, 0);
        assert_eq!(status.last_forged_batch, batch_num - 1);
    }

    #[test]
    fn test_concurrent_readers_see_consistent_status() {
        let node = Arc::new(TestNode::new(PoolConfig::for_testing()));
        for from in FIRST_ACCOUNT..=LAST_ACCOUNT {
            node.service.add_tx(transfer(from, 0, 126, 1_000)).unwrap();
        }

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let node = Arc::clone(&node);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let status = node.service.status();
                        assert_eq!(status.total(), (LAST_ACCOUNT - FIRST_ACCOUNT + 1) as usize);
                    }
                })
            })
            .collect();

        let batch = node.service.select_batch(4).unwrap();
        assert_eq!(batch.len(), 4);
        for handle in readers {
            handle.join().unwrap();
        }
        assert_eq!(node.service.status().forging_count, 4);
    }
}
