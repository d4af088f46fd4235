#![no_main]

use libfuzzer_sys::fuzz_target;

use ledger_core::{Account, AccountId};

fuzz_target!(|data: &[u8]| {
    if let Ok(account) = Account::decode(data) {
        let encoded = account.encode().expect("decoded account must encode");
        assert_eq!(Account::decode(&encoded).ok(), Some(account));
    }

    if let Ok(id) = AccountId::from_key(data) {
        assert_eq!(&id.key()[..], data);
    }
});
