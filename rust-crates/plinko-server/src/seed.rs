use plinko::{
    Points,
    ledger::{
        Clock,
        LedgerService,
    },
    storage::LedgerStorage,
};
use rand::Rng;
use std::str::FromStr;

/// An account to open at startup, written `name:balance` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUser {
    pub username: String,
    pub balance: Points,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SeedUserError {
    #[error("expected NAME:BALANCE, got '{0}'")]
    Format(String),
    #[error("balance '{0}' is not a non-negative integer")]
    Balance(String),
}

impl FromStr for SeedUser {
    type Err = SeedUserError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (username, balance) = raw
            .rsplit_once(':')
            .filter(|(username, _)| !username.trim().is_empty())
            .ok_or_else(|| SeedUserError::Format(raw.to_string()))?;
        let balance: Points = balance
            .trim()
            .parse()
            .ok()
            .filter(|balance| *balance >= 0)
            .ok_or_else(|| SeedUserError::Balance(balance.to_string()))?;
        Ok(Self {
            username: username.trim().to_string(),
            balance,
        })
    }
}

/// Open each seed account. Usernames that already exist are left untouched,
/// so seeding a persistent database is repeatable.
pub fn seed_users<S, R, C>(ledger: &LedgerService<S, R, C>, users: &[SeedUser]) -> plinko::Result<()>
where
    S: LedgerStorage,
    R: Rng,
    C: Clock,
{
    for user in users {
        match ledger.register(&user.username, user.balance) {
            Ok(_) => {}
            Err(plinko::Error::UsernameTaken(username)) => {
                tracing::info!("seed user {username} already exists, skipping");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use plinko::storage::{
        AccountStore,
        in_memory_storage::InMemoryStorage,
    };

    #[test]
    fn from_str__parses_name_and_balance() {
        // when
        let user: SeedUser = "alice:250".parse().unwrap();

        // then
        assert_eq!(
            user,
            SeedUser {
                username: "alice".to_string(),
                balance: 250,
            }
        );
    }

    #[test]
    fn from_str__rejects_missing_name_or_bad_balance() {
        assert_eq!(
            "alice".parse::<SeedUser>(),
            Err(SeedUserError::Format("alice".to_string()))
        );
        assert_eq!(
            ":10".parse::<SeedUser>(),
            Err(SeedUserError::Format(":10".to_string()))
        );
        assert_eq!(
            "alice:-5".parse::<SeedUser>(),
            Err(SeedUserError::Balance("-5".to_string()))
        );
        assert_eq!(
            "alice:lots".parse::<SeedUser>(),
            Err(SeedUserError::Balance("lots".to_string()))
        );
    }

    #[test]
    fn seed_users__opens_accounts_and_skips_existing_names() {
        // given
        let ledger = LedgerService::new(InMemoryStorage::new());
        ledger.register("bob", 5).unwrap();
        let users: [SeedUser; 2] = ["alice:100".parse().unwrap(), "bob:900".parse().unwrap()];

        // when
        seed_users(&ledger, &users).unwrap();

        // then
        let storage = ledger.storage();
        assert_eq!(storage.account_by_username("alice").unwrap().unwrap().balance, 100);
        assert_eq!(storage.account_by_username("bob").unwrap().unwrap().balance, 5);
    }
}
