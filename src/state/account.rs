use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Account aggregate: a marketplace user with a spendable token balance.
///
/// Invariants:
/// - Balance never becomes negative
/// - Deduction is conditional: an insufficient balance leaves the account
///   untouched and reports the failure to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// External identity of the user (opaque to the engine)
    pub id: String,

    /// Name shown in notification messages
    pub display_name: String,

    /// Spendable tokens held by the account
    pub balance: u64,
}

impl Account {
    /// Create a new account with zero balance
    pub fn new(id: String, display_name: String) -> Self {
        Account {
            id,
            display_name,
            balance: 0,
        }
    }

    /// Create an account with an initial balance
    pub fn with_balance(id: String, display_name: String, balance: u64) -> Self {
        Account {
            id,
            display_name,
            balance,
        }
    }

    /// Add to balance (grant, refund, or escrow release)
    ///
    /// Returns the new balance
    pub fn credit(&mut self, amount: u64) -> u64 {
        self.balance = self.balance.saturating_add(amount);
        self.balance
    }

    /// Subtract from balance, conditional on sufficient funds.
    ///
    /// Returns `Ok(new_balance)` when the funds were available. On
    /// insufficient funds the balance is left unchanged and
    /// `Error::InsufficientBalance` is returned; this is the single-row
    /// conditional update the lifecycle engine relies on.
    pub fn deduct(&mut self, amount: u64) -> Result<u64> {
        if self.balance < amount {
            return Err(Error::InsufficientBalance {
                have: self.balance,
                need: amount,
            });
        }
        self.balance -= amount;
        Ok(self.balance)
    }

    /// Check if account has sufficient balance
    pub fn has_sufficient_balance(&self, amount: u64) -> bool {
        self.balance >= amount
    }

    /// Get current balance
    pub fn balance(&self) -> u64 {
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Account {
        Account::with_balance("alice".to_string(), "Alice".to_string(), 100)
    }

    #[test]
    fn test_account_creation() {
        let account = Account::new("alice".to_string(), "Alice".to_string());
        assert_eq!(account.balance, 0);
        assert_eq!(account.display_name, "Alice");
    }

    #[test]
    fn test_credit() {
        let mut account = alice();
        account.credit(50);
        assert_eq!(account.balance, 150);
    }

    #[test]
    fn test_deduct_success() {
        let mut account = alice();
        let result = account.deduct(30);
        assert!(result.is_ok());
        assert_eq!(account.balance, 70);
    }

    #[test]
    fn test_deduct_insufficient() {
        let mut account = alice();
        let result = account.deduct(150);
        assert!(matches!(
            result,
            Err(Error::InsufficientBalance {
                have: 100,
                need: 150
            })
        ));
        // Failed deduction must not move the balance
        assert_eq!(account.balance, 100);
    }

    #[test]
    fn test_deduct_exact_balance() {
        let mut account = alice();
        assert_eq!(account.deduct(100).unwrap(), 0);
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn test_credit_saturates() {
        let mut account = alice();
        account.balance = u64::MAX - 1;
        account.credit(10);
        assert_eq!(account.balance, u64::MAX);
    }
}
