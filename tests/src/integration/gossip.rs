//! # Gossip
//!
//! Two nodes wired through the channel publisher and the ingest task:
//! local submissions travel, gossiped ones are not echoed back out.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use rc_02_tx_pool::{spawn_gossip_ingest, Idx, PoolConfig, PoolTxState, TxId, TxPoolApi};
    use std::time::Duration;
    use tokio::sync::watch;

    async fn wait_for(node: &TestNode, id: &TxId) -> bool {
        for _ in 0..100 {
            if node.service.get_tx(id).is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_local_submission_reaches_peer() {
        let (a, a_out) = TestNode::gossiping(PoolConfig::for_testing());
        let (b, mut b_out) = TestNode::gossiping(PoolConfig::for_testing());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingest = spawn_gossip_ingest(b.service.clone(), a_out, shutdown_rx);

        let id = a.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        assert!(wait_for(&b, &id).await, "peer never received the transaction");

        let received = b.service.get_tx(&id).unwrap();
        assert_eq!(received.id, id);
        assert_eq!(received.state, PoolTxState::Pending);
        // gossiped admissions are not re-published
        assert!(b_out.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        let stats = ingest.await.unwrap();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.rejected, 0);
    }

    #[tokio::test]
    async fn test_group_members_gossiped_one_by_one() {
        let (a, a_out) = TestNode::gossiping(PoolConfig::for_testing());
        let b = TestNode::new(PoolConfig::for_testing());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingest = spawn_gossip_ingest(b.service.clone(), a_out, shutdown_rx);

        let gid = a
            .service
            .add_atomic_group(atomic_group(&[(256, 0, 1), (257, 0, -1)]))
            .unwrap();
        let members = ids(&a.service.get_atomic_group(&gid).unwrap());
        for id in &members {
            assert!(wait_for(&b, id).await);
        }

        let batch = b.service.select_batch(16).unwrap();
        assert_eq!(ids(&batch), members);

        shutdown_tx.send(true).unwrap();
        assert_eq!(ingest.await.unwrap().admitted, 2);
    }

    #[tokio::test]
    async fn test_peer_rejects_what_it_cannot_verify() {
        let (a, a_out) = TestNode::gossiping(PoolConfig::for_testing());
        let b = TestNode::new(PoolConfig::for_testing());
        // b has never seen this account
        b.accounts.remove(Idx(256));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingest = spawn_gossip_ingest(b.service.clone(), a_out, shutdown_rx);

        let id = a.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();
        let second = a.service.add_tx(transfer(257, 0, 126, 1_000)).unwrap();

        // the channel is ordered, so the first was handled before the second
        assert!(wait_for(&b, &second).await);
        assert!(b.service.get_tx(&id).is_err());

        shutdown_tx.send(true).unwrap();
        let stats = ingest.await.unwrap();
        assert_eq!((stats.admitted, stats.rejected), (1, 1));
    }
}
