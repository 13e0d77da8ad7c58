use std::str::FromStr;

use chrono::NaiveDate;

use crate::config::LedgerConfig;
use crate::decimal::Decimal4;
use crate::member::Member;
use crate::store::Ledger;

/// Defaults with a cheap Argon2 cost so tests don't spend seconds hashing.
pub fn test_config() -> LedgerConfig {
    LedgerConfig::default().with_hash_cost(256, 1)
}

pub fn dec(s: &str) -> Decimal4 {
    Decimal4::from_str(s).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub struct Fixture {
    pub ledger: Ledger,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            ledger: Ledger::in_memory(test_config()).unwrap(),
        }
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Fixture {
            ledger: Ledger::in_memory(config).unwrap(),
        }
    }

    pub fn member(&self, number: &str) -> Member {
        self.ledger
            .create_member(number, &format!("Member {}", number), "pw")
            .unwrap()
    }
}
