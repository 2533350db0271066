//! # Admission
//!
//! Real Ed25519 signatures over the canonical encoding, the amount codec
//! boundary, and the admission error classification a submitter relies on.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use rc_01_amount_codec::{decode, CodecError, Float16};
    use rc_02_tx_pool::{
        ErrorKind, FeeSelector, Idx, PoolConfig, PoolError, PoolTxState, TxPoolApi, TxType, U256,
    };

    fn node() -> TestNode {
        TestNode::new(PoolConfig::for_testing())
    }

    #[test]
    fn test_signed_transfer_is_pending() {
        let node = node();
        let id = node.service.add_tx(transfer(256, 0, 126, 1_000)).unwrap();

        let tx = node.service.get_tx(&id).unwrap();
        assert_eq!(tx.state, PoolTxState::Pending);
        assert_eq!(tx.batch_num, None);
        assert_eq!(node.service.get_pending_txs().len(), 1);
    }

    #[test]
    fn test_signature_from_other_account_rejected() {
        let node = node();
        let mut tx = transfer(256, 0, 126, 1_000);
        tx.from_idx = Idx(257);
        let err = node.service.add_tx(tx).unwrap_err();
        assert!(matches!(err, PoolError::InvalidSignature(_)));
        assert_eq!(err.kind(), ErrorKind::Admission);
        assert!(err.is_permanent());
    }

    #[test]
    fn test_largest_encodable_amount_accepted() {
        let node = node();
        let max = decode(0xFFFF);
        let mut tx = unsigned_transfer(256, 0, 0, 0);
        tx.amount = max;
        assert!(node.service.add_tx(sign(tx)).is_ok());

        let mut over = unsigned_transfer(256, 1, 0, 0);
        over.amount = max + U256::one();
        let err = node.service.add_tx(over).unwrap_err();
        assert!(matches!(err, PoolError::InvalidAmount(_)));
    }

    #[test]
    fn test_lossy_amount_rejected() {
        let node = node();
        let amount = 87_999_990_000_000_000u64;
        assert_eq!(Float16::floor(U256::from(amount)).unwrap().0, 0x776F);
        let err = node.service.add_tx(transfer(256, 0, 126, amount)).unwrap_err();
        assert!(matches!(
            err,
            PoolError::InvalidAmount(CodecError::RoundingLoss { .. })
        ));
        assert!(err.is_permanent());
        assert!(node.store.is_empty());
    }

    #[test]
    fn test_relayed_amount_rewrite_rejected() {
        let node = node();
        let honest = transfer(256, 0, 126, 454_500);

        // 454549 shares the encoding of 454500, so the signature alone
        // cannot tell the two apart
        let mut rewritten = honest.clone();
        rewritten.amount = U256::from(454_549u64);
        assert!(matches!(
            node.service.add_gossiped_tx(rewritten),
            Err(PoolError::InvalidAmount(_))
        ));

        let id = node.service.add_gossiped_tx(honest).unwrap();
        let stored = node.service.get_tx(&id).unwrap();
        assert_eq!(stored.amount, U256::from(454_500u64));
        assert_eq!(
            stored.absolute_fee().unwrap(),
            FeeSelector(126).fee_amount(U256::from(454_500u64)).unwrap()
        );
    }

    #[test]
    fn test_tx_types_derived_from_recipient() {
        let node = node();

        let mut exit = unsigned_transfer(256, 0, 126, 1_000);
        exit.to_idx = Idx::EXIT;
        let exit_id = node.service.add_tx(sign(exit)).unwrap();

        let mut to_eth = unsigned_transfer(256, 1, 126, 1_000);
        to_eth.to_idx = Idx::UNREGISTERED;
        to_eth.to_eth_addr = Some([0xEE; 20]);
        let eth_id = node.service.add_tx(sign(to_eth)).unwrap();

        let mut to_bjj = unsigned_transfer(256, 2, 126, 1_000);
        to_bjj.to_idx = Idx::UNREGISTERED;
        to_bjj.to_bjj = Some([0xBB; 32]);
        let bjj_id = node.service.add_tx(sign(to_bjj)).unwrap();

        assert_eq!(node.service.get_tx(&exit_id).unwrap().tx_type, TxType::Exit);
        assert_eq!(
            node.service.get_tx(&eth_id).unwrap().tx_type,
            TxType::TransferToEthAddr
        );
        assert_eq!(
            node.service.get_tx(&bjj_id).unwrap().tx_type,
            TxType::TransferToBjj
        );
    }

    #[test]
    fn test_reserved_recipient_rejected() {
        let node = node();
        let mut tx = unsigned_transfer(256, 0, 126, 1_000);
        tx.to_idx = Idx(7);
        assert!(matches!(
            node.service.add_tx(sign(tx)),
            Err(PoolError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_nonce_ahead_is_accepted_pending() {
        let node = node();
        let id = node.service.add_tx(transfer(256, 40, 126, 1_000)).unwrap();
        assert_eq!(node.service.get_tx(&id).unwrap().state, PoolTxState::Pending);
        assert!(node.service.select_batch(10).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_is_not_permanent() {
        let node = node();
        let tx = transfer(256, 0, 126, 1_000);
        node.service.add_tx(tx.clone()).unwrap();
        let err = node.service.add_tx(tx).unwrap_err();
        assert!(matches!(err, PoolError::DuplicateTx(_)));
        assert!(!err.is_permanent());
    }
}
