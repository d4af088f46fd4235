#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ledger_core::{Account, AccountId, Transfer, TransferOutcome};

#[derive(Debug, Arbitrary)]
struct Input {
    from: i64,
    to: i64,
    amount: i64,
}

fuzz_target!(|input: Input| {
    let (Ok(a), Ok(b)) = (AccountId::new(0), AccountId::new(1)) else {
        return;
    };
    if input.from < 0 || input.to < 0 || input.amount < 0 {
        return;
    }

    let transfer = Transfer::new(a, b, input.amount);
    match transfer.apply(Account::new(input.from), Account::new(input.to)) {
        Ok(TransferOutcome::Applied { from, to }) => {
            assert!(from.balance >= 0);
            assert_eq!(
                from.balance as i128 + to.balance as i128,
                input.from as i128 + input.to as i128
            );
        }
        Ok(TransferOutcome::InsufficientFunds { balance }) => {
            assert_eq!(balance, input.from);
            assert!(input.amount > input.from);
        }
        Err(_) => {}
    }
});
