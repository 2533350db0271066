//! Static account snapshot.
//!
//! Stands in for the base-chain synchronizer: accounts are set explicitly
//! and read under a lock.

use crate::domain::{Account, Idx, Nonce, PoolError};
use crate::ports::outbound::AccountProvider;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StaticAccountProvider {
    accounts: RwLock<HashMap<Idx, Account>>,
}

impl StaticAccountProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let provider = Self::new();
        for account in accounts {
            provider.set_account(account);
        }
        provider
    }

    pub fn set_account(&self, account: Account) {
        self.accounts.write().insert(account.idx, account);
    }

    /// Advances the confirmed nonce of an existing account. Returns false
    /// if the account is unknown.
    pub fn set_nonce(&self, idx: Idx, nonce: Nonce) -> bool {
        match self.accounts.write().get_mut(&idx) {
            Some(account) => {
                account.nonce = nonce;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, idx: Idx) -> Option<Account> {
        self.accounts.write().remove(&idx)
    }
}

impl AccountProvider for StaticAccountProvider {
    fn account(&self, idx: Idx) -> Result<Option<Account>, PoolError> {
        Ok(self.accounts.read().get(&idx).cloned())
    }
}
