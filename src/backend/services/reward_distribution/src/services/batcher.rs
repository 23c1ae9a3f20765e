use crate::models::{
    payout::{Batch, Payment},
    reward::{Mutez, Recipient, RewardSnapshot},
};
use crate::utils::errors::{PayoutError, Result};

/// Turns an annotated snapshot into the ordered list of transfers to make.
///
/// Pool contracts with resolved liquidity providers are replaced, in place, by
/// one payment per provider. Blacklisted, zero and sub-minimum amounts are dropped.
pub fn flatten_payments(snapshot: &RewardSnapshot, minimum_payment: Mutez) -> Vec<Payment> {
    let payable = |blacklisted: bool, amount: Mutez| {
        !blacklisted && amount > 0 && amount >= minimum_payment
    };

    let mut payments = Vec::with_capacity(snapshot.delegators.len());
    for recipient in &snapshot.delegators {
        if recipient.liquidity_providers.is_empty() {
            if payable(recipient.blacklisted, recipient.net_reward) {
                payments.push(Payment {
                    destination: recipient.address.clone(),
                    amount: recipient.net_reward,
                    pool: None,
                });
            }
            continue;
        }

        if recipient.blacklisted {
            continue;
        }
        payments.extend(pool_payments(recipient).filter(|p| payable(false, p.amount)));
    }

    payments
}

fn pool_payments(recipient: &Recipient) -> impl Iterator<Item = Payment> + '_ {
    recipient
        .liquidity_providers
        .iter()
        .filter(|lp| !lp.blacklisted)
        .map(move |lp| Payment {
            destination: lp.address.clone(),
            amount: lp.net_reward,
            pool: Some(recipient.address.clone()),
        })
}

/// Splits payments into consecutive batches of at most `size`, keeping order.
pub fn batch_payments(payments: &[Payment], size: usize) -> Result<Vec<Batch>> {
    if size == 0 {
        return Err(PayoutError::InvalidBatchSize);
    }

    Ok(payments
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            payments: chunk.to_vec(),
        })
        .collect())
}
