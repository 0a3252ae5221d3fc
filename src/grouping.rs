use slice_group_by::GroupBy;

use crate::base::{GroupKey, Transaction};

/// Transactions sharing an instrument and direction within one closing year,
/// in their original row order.
#[derive(Debug, Clone)]
pub(crate) struct TransactionGroup<'a> {
    pub key: GroupKey,
    pub transactions: Vec<&'a Transaction>,
}

/// All groups closed within one calendar year.
#[derive(Debug, Clone)]
pub(crate) struct YearPartition<'a> {
    pub year: i32,
    pub groups: Vec<TransactionGroup<'a>>,
}

impl YearPartition<'_> {
    pub(crate) fn transaction_count(&self) -> usize {
        self.groups.iter().map(|g| g.transactions.len()).sum()
    }
}

/// Distinct closing years, ascending.
pub(crate) fn closing_years(transactions: &[Transaction]) -> Vec<i32> {
    let mut years: Vec<i32> = transactions.iter().map(Transaction::close_year).collect();
    years.sort_unstable();
    years.dedup();
    years
}

fn group_by_key<'a>(transactions: &[&'a Transaction]) -> Vec<TransactionGroup<'a>> {
    let mut groups = Vec::<TransactionGroup>::new();

    for &tx in transactions {
        let key = tx.key();
        match groups.iter().position(|g| g.key == key) {
            Some(index) => groups[index].transactions.push(tx),
            None => groups.push(TransactionGroup { key, transactions: vec![tx] }),
        }
    }

    groups
}

/// Splits the transactions by closing year and then by (instrument,
/// direction). Groups appear in the order their first transaction appears,
/// and members keep their row order.
pub(crate) fn partition_by_year(transactions: &[Transaction]) -> Vec<YearPartition> {
    let mut by_year: Vec<&Transaction> = transactions.iter().collect();
    // stable, so row order is kept within each year
    by_year.sort_by_key(|tx| tx.close_year());

    by_year.linear_group_by_key(|tx| tx.close_year()).map(|txs| {
        YearPartition {
            year: txs[0].close_year(),
            groups: group_by_key(txs),
        }
    }).collect()
}
