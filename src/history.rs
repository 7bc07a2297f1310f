use anyhow::{anyhow, bail, Result};
use log::debug;

use crate::{
    apis::{ApiClient, NormalTransaction, TokenTransfer},
    types::Chain,
};

/// Maps an offset/limit pair onto the explorer's page numbering.
///
/// Returns `(page, offset)` where the explorer's `offset` is the page size.
/// Pages start at 1, so `start=60, limit=30` is page 3.
pub fn page_params(start: u32, limit: u32) -> Result<(u32, u32)> {
    if limit == 0 {
        bail!("Page size must be greater than zero");
    }
    Ok((start / limit + 1, limit))
}

/// Which side of a transfer the tracked address is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    /// Sent from the address to itself.
    Own,
    /// Neither side; the explorer listed it for another reason.
    Other,
}

impl Direction {
    /// Compares case-insensitively, as explorers return lowercase addresses.
    pub fn of(owner: &str, from: &str, to: &str) -> Self {
        let is_owner = |a: &str| a.eq_ignore_ascii_case(owner);
        match (is_owner(from), is_owner(to)) {
            (true, true) => Direction::Own,
            (true, false) => Direction::Out,
            (false, true) => Direction::In,
            (false, false) => Direction::Other,
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
            Direction::Own => "SELF",
            Direction::Other => "-",
        }
    }
}

/// Historical activity for a single address, fetched one page at a time.
///
/// Records accumulate in the order the explorer returns them. Nothing is
/// deduplicated or cached; each page is a fresh request.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressHistory<R> {
    /// Address that a user wants to explore.
    pub address: String,
    pub chain: Chain,
    /// Every record fetched so far.
    pub records: Vec<R>,
    /// Offset of the next record to request.
    next_start: u32,
    page_size: u32,
    /// Set once a page comes back short.
    exhausted: bool,
}

pub type TransferHistory = AddressHistory<TokenTransfer>;
pub type TransactionHistory = AddressHistory<NormalTransaction>;

impl<R> AddressHistory<R> {
    pub fn new(address: &str, chain: Chain, page_size: u32) -> Self {
        AddressHistory {
            address: address.to_string(),
            chain,
            records: vec![],
            next_start: 0,
            page_size,
            exhausted: false,
        }
    }
    /// `(page, offset)` of the next request.
    pub fn next_page(&self) -> Result<(u32, u32)> {
        page_params(self.next_start, self.page_size)
    }
    /// Adds a fetched page and advances the cursor. Returns the number of new records.
    pub fn append_page(&mut self, page: Vec<R>) -> usize {
        let added = page.len();
        if added < self.page_size as usize {
            self.exhausted = true;
        }
        self.records.extend(page);
        self.next_start += self.page_size;
        added
    }
    /// True when the explorer has nothing older to return.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn direction(&self, from: &str, to: &str) -> Direction {
        Direction::of(&self.address, from, to)
    }
}

impl AddressHistory<TokenTransfer> {
    /// Gets the next page of token transfers.
    ///
    /// Uses the explorer `tokentx` action.
    pub async fn fetch_next_page(&mut self, client: &ApiClient) -> Result<usize> {
        let (page, offset) = self.next_page()?;
        debug!("Requesting transfers page {} (size {}) for {}", page, offset, self.address);
        let start = self.next_start;
        let page = client
            .token_transfers(&self.address, self.chain, start, self.page_size)
            .await
            .ok_or_else(|| anyhow!("No transfer data for address {}", self.address))?;
        Ok(self.append_page(page))
    }
}

impl AddressHistory<NormalTransaction> {
    /// Gets the next page of transactions.
    ///
    /// Uses the explorer `txlist` action.
    pub async fn fetch_next_page(&mut self, client: &ApiClient) -> Result<usize> {
        let (page, offset) = self.next_page()?;
        debug!("Requesting transactions page {} (size {}) for {}", page, offset, self.address);
        let start = self.next_start;
        let page = client
            .transactions(&self.address, self.chain, start, self.page_size)
            .await
            .ok_or_else(|| anyhow!("No transaction data for address {}", self.address))?;
        Ok(self.append_page(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_arithmetic() {
        assert_eq!(page_params(60, 30).unwrap(), (3, 30));
        assert_eq!(page_params(0, 30).unwrap(), (1, 30));
        assert_eq!(page_params(29, 30).unwrap(), (1, 30));
        assert_eq!(page_params(30, 30).unwrap(), (2, 30));
        assert!(page_params(10, 0).is_err());
    }

    #[test]
    fn pages_accumulate_until_short_page() {
        let mut history: AddressHistory<u32> = AddressHistory::new("0xabc", Chain::Eth, 3);
        assert_eq!(history.next_page().unwrap(), (1, 3));

        assert_eq!(history.append_page(vec![1, 2, 3]), 3);
        assert!(!history.is_exhausted());
        assert_eq!(history.next_page().unwrap(), (2, 3));

        // No dedup across pages.
        assert_eq!(history.append_page(vec![3, 4]), 2);
        assert!(history.is_exhausted());
        assert_eq!(history.records, vec![1, 2, 3, 3, 4]);
        assert_eq!(history.next_page().unwrap(), (3, 3));
    }

    #[test]
    fn direction_ignores_case() {
        let owner = "0xAbC";
        assert_eq!(Direction::of(owner, "0xabc", "0xdef"), Direction::Out);
        assert_eq!(Direction::of(owner, "0xdef", "0xABC"), Direction::In);
        assert_eq!(Direction::of(owner, "0xabc", "0xabc"), Direction::Own);
        assert_eq!(Direction::of(owner, "0x1", "0x2").label(), "-");
    }
}
