//! Value-added tax on charges and on the computer fee.

use portbill_core::{Amount, round_ratio};

/// Fixed VAT rate, in percent.
pub const TAX_RATE_PERCENT: u64 = 18;

/// `round(amount * 18%)` when the line is taxable, otherwise zero.
pub fn tax(amount: Amount, taxable: bool) -> Amount {
    if !taxable {
        return 0;
    }
    round_ratio(amount, TAX_RATE_PERCENT, 100)
}
