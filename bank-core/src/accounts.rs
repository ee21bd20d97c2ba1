//! Account registry and customer lookup
//!
//! The registry owns account identity, numbering and status. From the
//! transaction engine's point of view it is a read path: the engine
//! resolves accounts here and never writes them. Creation and mutation of
//! accounts is plain CRUD driven by the request-handling layer.
//!
//! Ownership checks go through the [`CustomerDirectory`] trait, the seam
//! to whatever identity service owns customer records. The in-memory
//! implementation backs tests and standalone deployments.

use crate::{
    error::{Error, Result},
    registry::NumberRegistry,
    storage::Storage,
    types::{Account, AccountId, AccountStatus, AccountType, CustomerId, OverdraftPolicy},
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// Lookup into the external customer/identity service
pub trait CustomerDirectory: Send + Sync {
    /// Whether the customer exists
    fn exists(&self, customer: CustomerId) -> Result<bool>;
}

/// Customer directory backed by an in-memory set
#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    known: parking_lot::RwLock<HashSet<CustomerId>>,
}

impl InMemoryCustomerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer
    pub fn register(&self, customer: CustomerId) {
        self.known.write().insert(customer);
    }
}

impl CustomerDirectory for InMemoryCustomerDirectory {
    fn exists(&self, customer: CustomerId) -> Result<bool> {
        Ok(self.known.read().contains(&customer))
    }
}

/// Account registry
#[derive(Clone)]
pub struct AccountRegistry {
    storage: Arc<Storage>,
    numbers: NumberRegistry,
    customers: Arc<dyn CustomerDirectory>,
}

impl AccountRegistry {
    /// Create a registry over the given store and customer directory
    pub fn new(
        storage: Arc<Storage>,
        numbers: NumberRegistry,
        customers: Arc<dyn CustomerDirectory>,
    ) -> Self {
        Self {
            storage,
            numbers,
            customers,
        }
    }

    /// Swap the customer directory
    pub fn set_customer_directory(&mut self, customers: Arc<dyn CustomerDirectory>) {
        self.customers = customers;
    }

    /// Open a new account for a customer.
    ///
    /// The account number must be unused; numbers are never reissued, so a
    /// number that ever belonged to an account (even a deleted one) is
    /// rejected with a conflict.
    pub fn create_account(
        &self,
        number: &str,
        kind: AccountType,
        owner: CustomerId,
        overdraft: OverdraftPolicy,
    ) -> Result<Account> {
        if number.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "account number must not be empty".to_string(),
            ));
        }
        if !self.customers.exists(owner)? {
            return Err(Error::CustomerNotFound(owner.to_string()));
        }

        // Park the number, then check past commits while holding it
        let _reservation = self
            .numbers
            .reserve(number)
            .ok_or_else(|| Error::Conflict(format!("account number {} already in use", number)))?;
        if self.storage.find_account_id_by_number(number)?.is_some() {
            return Err(Error::Conflict(format!(
                "account number {} already in use",
                number
            )));
        }

        let account = Account {
            id: AccountId::new(),
            number: number.to_string(),
            kind,
            status: AccountStatus::Active,
            owner,
            overdraft,
            created_at: Utc::now(),
        };
        self.storage.insert_account(&account)?;

        tracing::info!(account_id = %account.id, number = %account.number, owner = %owner, "Account opened");

        Ok(account)
    }

    /// Resolve an account by ID
    pub fn resolve(&self, account_id: AccountId) -> Result<Account> {
        self.storage.get_account(account_id)
    }

    /// Resolve an account by number
    pub fn resolve_by_number(&self, number: &str) -> Result<Account> {
        let account_id = self
            .storage
            .find_account_id_by_number(number)?
            .ok_or_else(|| Error::AccountNotFound(number.to_string()))?;
        // A tombstoned number maps to a deleted account; report the number
        self.storage.get_account(account_id).map_err(|err| match err {
            Error::AccountNotFound(_) => Error::AccountNotFound(number.to_string()),
            other => other,
        })
    }

    /// Whether the account belongs to the customer
    pub fn is_owned_by(&self, account_id: AccountId, customer: CustomerId) -> Result<bool> {
        Ok(self.resolve(account_id)?.owner == customer)
    }

    /// Change the lifecycle status of an account
    pub fn set_status(&self, account_id: AccountId, status: AccountStatus) -> Result<Account> {
        let mut account = self.resolve(account_id)?;
        account.status = status;
        self.storage.put_account(&account)?;
        tracing::info!(account_id = %account.id, status = ?status, "Account status changed");
        Ok(account)
    }

    /// Change the kind of an account
    pub fn set_type(&self, account_id: AccountId, kind: AccountType) -> Result<Account> {
        let mut account = self.resolve(account_id)?;
        account.kind = kind;
        self.storage.put_account(&account)?;
        Ok(account)
    }

    /// Change the overdraft policy of an account
    pub fn set_overdraft(
        &self,
        account_id: AccountId,
        overdraft: OverdraftPolicy,
    ) -> Result<Account> {
        let mut account = self.resolve(account_id)?;
        account.overdraft = overdraft;
        self.storage.put_account(&account)?;
        Ok(account)
    }

    /// All accounts owned by one customer
    pub fn list_by_owner(&self, owner: CustomerId) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        for account_id in self.storage.list_account_ids_by_owner(owner)? {
            accounts.push(self.storage.get_account(account_id)?);
        }
        Ok(accounts)
    }

    /// Delete an account.
    ///
    /// Refused while any balance row or transaction still references the
    /// account. The account number stays reserved forever.
    pub fn delete_account(&self, account_id: AccountId) -> Result<()> {
        let account = self.resolve(account_id)?;

        if !self.storage.list_balances_by_account(account_id)?.is_empty() {
            return Err(Error::Conflict(format!(
                "account {} still has balances",
                account_id
            )));
        }
        if self.storage.account_has_transactions(account_id)? {
            return Err(Error::Conflict(format!(
                "account {} is referenced by transactions",
                account_id
            )));
        }

        self.storage.delete_account(&account)
    }
}
