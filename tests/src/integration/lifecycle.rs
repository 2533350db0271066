//! # Lifecycle
//!
//! Select → forge → confirm, reorg rollback, purge retention, and the
//! store-first commit discipline across a restart.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use rc_02_tx_pool::{
        BatchNum, Idx, IdxNonce, PoolConfig, PoolError, PoolTxState, TxId, TxPoolApi, TxStore,
    };

    fn node() -> TestNode {
        TestNode::new(PoolConfig::for_testing())
    }

    /// Selects everything selectable and confirms it in `batch_num`,
    /// advancing account nonces the way the synchronizer would.
    fn forge_next(node: &TestNode, batch_num: BatchNum) -> Vec<TxId> {
        let batch = node.service.select_batch(16).unwrap();
        let forged = ids(&batch);
        node.service.done_forging(&forged, batch_num).unwrap();
        for tx in &batch {
            node.accounts.set_nonce(tx.from_idx, tx.nonce + 1);
        }
        forged
    }

    // =========================================================================
    // FORGING
    // =========================================================================

    #[test]
    fn test_full_forging_cycle() {
        let node = node();
        let a = node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        let b = node.service.add_tx(transfer(256, 1, 126, 1_000)).unwrap();

        let batch = node.service.select_batch(16).unwrap();
        assert_eq!(ids(&batch), vec![a, b]);
        for tx in &batch {
            assert_eq!(
                node.service.get_tx(&tx.id).unwrap().state,
                PoolTxState::Forging
            );
        }

        node.service.done_forging(&[a, b], 1).unwrap();
        let status = node.service.status();
        assert_eq!(status.forged_count, 2);
        assert_eq!(status.pending_count, 0);
        assert_eq!(status.last_forged_batch, 1);
        assert_eq!(
            node.store.ids_by_account_state(Idx(256), PoolTxState::Forged).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_forging_twice_is_a_consistency_error() {
        let node = node();
        let id = node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        node.service.start_forging(&[id]).unwrap();
        assert!(matches!(
            node.service.start_forging(&[id]),
            Err(PoolError::NotPending { .. })
        ));
        node.service.done_forging(&[id], 1).unwrap();
        assert!(matches!(
            node.service.done_forging(&[id], 2),
            Err(PoolError::NotForging { .. })
        ));
    }

    #[test]
    fn test_invalidate_only_touches_live_rows() {
        let node = node();
        let forged = node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        let also_forged = node.service.add_tx(transfer(257, 0, 126, 1_000)).unwrap();
        forge_next(&node, 1);
        let late = node.service.add_tx(transfer(258, 0, 126, 1_000)).unwrap();
        node.service.start_forging(&[late]).unwrap();

        let invalidated = node.service.invalidate_txs(&[forged, late]).unwrap();
        assert_eq!(invalidated, vec![late]);
        assert_eq!(node.service.get_tx(&forged).unwrap().state, PoolTxState::Forged);
        assert_eq!(
            node.service.get_tx(&also_forged).unwrap().state,
            PoolTxState::Forged
        );
    }

    #[test]
    fn test_check_nonces_is_idempotent() {
        let node = node();
        let old = node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        let accounts = [IdxNonce { idx: Idx(256), nonce: 1 }];
        assert_eq!(node.service.check_nonces(&accounts).unwrap(), vec![old]);
        assert!(node.service.check_nonces(&accounts).unwrap().is_empty());
        assert_eq!(node.service.get_tx(&old).unwrap().state, PoolTxState::Invalid);
    }

    // =========================================================================
    // REORG
    // =========================================================================

    #[test]
    fn test_reorg_twice_equals_once() {
        let node = node();
        for from in 256..=258 {
            node.service.add_tx(transfer(from, 0, 126, 1_000)).unwrap();
        }
        node.service.add_tx(transfer(256, 1, 126, 1_000)).unwrap();
        forge_next(&node, 1);
        node.service.add_tx(transfer(259, 0, 126, 1_000)).unwrap();
        forge_next(&node, 2);

        let reverted = node.service.reorg(1).unwrap();
        assert_eq!(reverted.len(), 1);
        let once = node.service.status();
        let pending_once = ids(&node.service.get_pending_txs());

        assert!(node.service.reorg(1).unwrap().is_empty());
        assert_eq!(node.service.status(), once);
        assert_eq!(ids(&node.service.get_pending_txs()), pending_once);
        assert_eq!(once.last_forged_batch, 1);
    }

    #[test]
    fn test_reorg_reverts_unconfirmed_forging() {
        let node = node();
        let id = node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        node.service.select_batch(16).unwrap();

        assert_eq!(node.service.reorg(0).unwrap(), vec![id]);
        let tx = node.service.get_tx(&id).unwrap();
        assert_eq!(tx.state, PoolTxState::Pending);
        assert_eq!(tx.batch_num, None);
    }

    #[test]
    fn test_reorg_deeper_than_safety_period_refused() {
        let node = node();
        for batch_num in 1..=5 {
            node.service
                .add_tx(transfer(256, batch_num - 1, 126, 1_000))
                .unwrap();
            forge_next(&node, batch_num);
        }
        // safety_period is 2 in the test config
        let err = node.service.reorg(2).unwrap_err();
        assert!(matches!(err, PoolError::ReorgTooDeep { last_forged: 5, .. }));
        assert_eq!(node.service.status().forged_count, 5);

        assert_eq!(node.service.reorg(3).unwrap().len(), 2);
    }

    // =========================================================================
    // PURGE
    // =========================================================================

    #[test]
    fn test_forged_rows_survive_safety_period() {
        let node = node();
        let mut forged_in = Vec::new();
        for batch_num in 1..=4 {
            let id = node
                .service
                .add_tx(transfer(256, batch_num - 1, 126, 1_000))
                .unwrap();
            forge_next(&node, batch_num);
            forged_in.push((batch_num, id));
        }

        // last forged 4, safety period 2: batch 1 is the only one old enough
        assert_eq!(node.service.purge().unwrap(), 1);
        for (batch_num, id) in forged_in {
            assert_eq!(node.service.get_tx(&id).is_ok(), batch_num >= 2);
        }
        assert_eq!(node.store.len(), 3);
    }

    #[test]
    fn test_pending_evicted_only_past_ttl_and_cap() {
        let config = PoolConfig {
            max_txs: 3,
            ttl_secs: 30,
            ..PoolConfig::for_testing()
        };
        let node = TestNode::new(config);
        let mut added = Vec::new();
        for from in 256..=260 {
            added.push(node.service.add_tx(transfer(from, 0, 126, 1_000)).unwrap());
            node.time.advance(10_000);
        }

        // now = 51_000; rows aged 50s, 40s, 30s, 20s, 10s
        assert_eq!(node.service.purge().unwrap(), 2);
        assert!(node.service.get_tx(&added[0]).is_err());
        assert!(node.service.get_tx(&added[1]).is_err());
        assert!(node.service.get_tx(&added[2]).is_ok());
        assert_eq!(node.service.status().pending_count, 3);
    }

    #[test]
    fn test_expired_max_num_batch_is_purged() {
        let node = node();
        // nonce ahead of the account, so selection keeps deferring it
        let mut expiring = unsigned_transfer(257, 3, 126, 1_000);
        expiring.max_num_batch = Some(1);
        let expiring = node.service.add_tx(sign(expiring)).unwrap();
        node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        forge_next(&node, 1);
        assert_eq!(
            node.service.get_tx(&expiring).unwrap().state,
            PoolTxState::Pending
        );

        let next = node.service.add_tx(transfer(256, 1, 126, 1_000)).unwrap();
        node.service.start_forging(&[next]).unwrap();
        node.service.done_forging(&[next], 2).unwrap();

        assert_eq!(node.service.purge().unwrap(), 1);
        assert!(node.service.get_tx(&expiring).is_err());
    }

    // =========================================================================
    // STORE
    // =========================================================================

    #[test]
    fn test_store_outage_is_transient_and_atomic() {
        let node = node();
        let id = node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        node.service.start_forging(&[id]).unwrap();
        let before = node.service.status();

        node.store.set_unavailable(true);
        let err = node.service.done_forging(&[id], 1).unwrap_err();
        assert_eq!(err.kind(), rc_02_tx_pool::ErrorKind::Transient);
        assert_eq!(node.service.status(), before);
        assert_eq!(node.service.get_tx(&id).unwrap().state, PoolTxState::Forging);

        node.store.set_unavailable(false);
        node.service.done_forging(&[id], 1).unwrap();
        assert_eq!(node.service.get_tx(&id).unwrap().state, PoolTxState::Forged);
    }

    #[test]
    fn test_restart_recovers_pool_and_groups() {
        let node = node();
        node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        let gid = node
            .service
            .add_atomic_group(atomic_group(&[(257, 0, 1), (258, 0, -1)]))
            .unwrap();
        forge_next(&node, 1);
        node.service.add_tx(transfer(259, 0, 126, 1_000)).unwrap();
        let before = node.service.status();

        let restarted = node.restart(PoolConfig::for_testing());
        assert_eq!(restarted.service.recover().unwrap(), 4);
        assert_eq!(restarted.service.status(), before);
        assert_eq!(restarted.service.get_atomic_group(&gid).unwrap().len(), 2);
        assert_eq!(
            ids(&restarted.service.get_pending_txs()),
            ids(&node.service.get_pending_txs())
        );
    }
}
