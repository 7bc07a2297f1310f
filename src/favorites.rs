use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{apis::Pair, store::JsonStore, types::Chain};

/// Favorite tokens keyed by token address.
pub type TokenFavorites = JsonStore<FavoriteToken>;
/// Favorite wallets keyed by wallet address.
pub type WalletFavorites = JsonStore<FavoriteWallet>;
/// Last seen price per coin symbol.
pub type PriceHistory = JsonStore<PriceSnapshot>;

/// A pinned token and what it looked like at the last scan.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FavoriteToken {
    pub name: String,
    pub last_scan_price: f64,
    pub last_scan_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_fdv: Option<f64>,
}

/// A pinned wallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FavoriteWallet {
    pub chain: Chain,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceSnapshot {
    pub price: f64,
    pub time: DateTime<Utc>,
}

impl FavoriteToken {
    /// New entry stamped with the current time.
    pub fn new(name: &str, price: f64, fdv: Option<f64>) -> Self {
        FavoriteToken {
            name: name.to_string(),
            last_scan_price: price,
            last_scan_time: Utc::now(),
            last_scan_fdv: fdv,
        }
    }
    /// Entry for a freshly fetched pair, carrying that pair's FDV.
    /// `None` when the aggregator reports no USD price to track.
    pub fn from_pair(pair: &Pair) -> Option<Self> {
        let price = pair.price_usd()?;
        Some(FavoriteToken::new(&pair.base_token.name, price, pair.fdv))
    }
    /// Change from the recorded price to `current`, in percent.
    pub fn change_since_scan(&self, current: f64) -> Option<f64> {
        percent_change(self.last_scan_price, current)
    }
}

impl PriceSnapshot {
    pub fn now(price: f64) -> Self {
        PriceSnapshot {
            price,
            time: Utc::now(),
        }
    }
}

impl JsonStore<FavoriteToken> {
    /// Records a fresh scan of a favorite. `None` if the address is not a favorite.
    pub fn update_scan(
        &mut self,
        address: &str,
        price: f64,
        fdv: Option<f64>,
    ) -> Result<Option<&FavoriteToken>> {
        self.modify(address, |entry| {
            entry.last_scan_price = price;
            entry.last_scan_time = Utc::now();
            entry.last_scan_fdv = fdv;
        })
    }

    /// Records a scan from a fetched pair. An unpriced pair leaves the entry as it was.
    pub fn record_pair(&mut self, address: &str, pair: &Pair) -> Result<Option<&FavoriteToken>> {
        match pair.price_usd() {
            Some(price) => self.update_scan(address, price, pair.fdv),
            None => Ok(self.get(address)),
        }
    }
}

/// Store key for an address. Hex addresses are lowercased, so checksummed
/// and plain spellings of one address share an entry.
pub fn favorite_key(address: &str) -> String {
    let address = address.trim();
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            format!("0x{}", hex.to_ascii_lowercase())
        }
        _ => address.to_string(),
    }
}

/// Relative change between two prices in percent. `None` when there is no base price.
pub fn percent_change(last: f64, current: f64) -> Option<f64> {
    if last == 0.0 || !last.is_finite() || !current.is_finite() {
        return None;
    }
    Some((current - last) / last * 100.0)
}

/// Signed percentage with two decimals, e.g. "+10.00%".
pub fn format_change(change: f64) -> String {
    format!("{:+.2}%", change)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::apis::fixtures::pair;

    #[test]
    fn price_change_is_signed_percent() {
        let change = percent_change(100.0, 110.0).unwrap();
        assert_eq!(format_change(change), "+10.00%");
        assert_eq!(format_change(percent_change(100.0, 90.0).unwrap()), "-10.00%");
        assert_eq!(percent_change(0.0, 5.0), None);
    }

    #[test]
    fn add_save_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorite_tokens.json");
        let mut favorites = TokenFavorites::load(&path).unwrap();
        assert!(favorites.is_empty());

        let entry = FavoriteToken::new("Test", 1.5, None);
        favorites.add("0xABC", entry.clone()).unwrap();

        let reloaded = TokenFavorites::load(&path).unwrap();
        let got = reloaded.get("0xABC").unwrap();
        assert_eq!(got.name, "Test");
        assert_eq!(got.last_scan_price, 1.5);
        assert_eq!(got.last_scan_fdv, None);
        assert_eq!(got.last_scan_time, entry.last_scan_time);
    }

    #[test]
    fn update_scan_mutates_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorite_tokens.json");
        let mut favorites = TokenFavorites::load(&path).unwrap();
        let entry = FavoriteToken::new("Test", 1.5, None);
        let first_time = entry.last_scan_time;
        favorites.add("0xABC", entry).unwrap();

        let updated = favorites
            .update_scan("0xABC", 2.0, Some(1_000_000.0))
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(updated.name, "Test");
        assert_eq!(updated.last_scan_price, 2.0);
        assert_eq!(updated.last_scan_fdv, Some(1_000_000.0));
        assert!(updated.last_scan_time >= first_time);
        assert_eq!(favorites.update_scan("0xDEF", 1.0, None).unwrap(), None);

        let reloaded = TokenFavorites::load(&path).unwrap();
        assert_eq!(reloaded.get("0xABC"), Some(&updated));
    }

    #[test]
    fn reads_entries_without_fdv() {
        let json = r#"{"0xabc": {"name": "Pepe", "last_scan_price": 0.5, "last_scan_time": "2024-05-01T10:00:00Z"}}"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorite_tokens.json");
        std::fs::write(&path, json).unwrap();
        let favorites = TokenFavorites::load(&path).unwrap();
        let token = favorites.get("0xabc").unwrap();
        assert_eq!(token.last_scan_fdv, None);
        assert_eq!(token.change_since_scan(1.0), Some(100.0));
    }

    #[test]
    fn wallet_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorite_wallets.json");
        let mut wallets = WalletFavorites::load(&path).unwrap();
        wallets
            .add(
                "0xwallet",
                FavoriteWallet {
                    chain: Chain::Bsc,
                    nickname: String::new(),
                },
            )
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["0xwallet"]["chain"], "bsc");
        assert_eq!(value["0xwallet"]["nickname"], "");
    }

    #[test]
    fn new_favorite_takes_price_and_fdv_of_fetched_pair() {
        let entry = FavoriteToken::from_pair(&pair()).unwrap();
        assert_eq!(entry.name, "Pepe");
        assert_eq!(entry.last_scan_price, 110.0);
        assert_eq!(entry.last_scan_fdv, Some(2_000_000.0));

        let mut no_fdv = pair();
        no_fdv.fdv = None;
        assert_eq!(FavoriteToken::from_pair(&no_fdv).unwrap().last_scan_fdv, None);

        let mut unpriced = pair();
        unpriced.price_usd = None;
        assert_eq!(FavoriteToken::from_pair(&unpriced), None);
    }

    #[test]
    fn record_pair_refreshes_scan_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorite_tokens.json");
        let mut favorites = TokenFavorites::load(&path).unwrap();
        favorites.add("0xabc", FavoriteToken::new("Pepe", 100.0, Some(1_000_000.0))).unwrap();

        let mut unpriced = pair();
        unpriced.price_usd = None;
        let kept = favorites.record_pair("0xabc", &unpriced).unwrap().cloned().unwrap();
        assert_eq!(kept.last_scan_price, 100.0);
        assert_eq!(kept.last_scan_fdv, Some(1_000_000.0));

        let mut no_fdv = pair();
        no_fdv.fdv = None;
        let refreshed = favorites.record_pair("0xabc", &no_fdv).unwrap().cloned().unwrap();
        assert_eq!(refreshed.last_scan_price, 110.0);
        assert_eq!(refreshed.last_scan_fdv, None);

        favorites.record_pair("0xabc", &pair()).unwrap();
        let reloaded = TokenFavorites::load(&path).unwrap();
        assert_eq!(reloaded.get("0xabc").unwrap().last_scan_fdv, Some(2_000_000.0));
        assert_eq!(favorites.record_pair("0xdef", &pair()).unwrap(), None);
    }

    #[test]
    fn hex_addresses_share_one_key() {
        let checksummed = "0x6982508145454Ce325dDbE47a25d4ec3d2311933";
        assert_eq!(favorite_key(checksummed), favorite_key(&checksummed.to_lowercase()));
        assert_eq!(favorite_key(" 0XABC "), "0xabc");
        assert_eq!(favorite_key("So11111111111111111111111111111111111111112"), "So11111111111111111111111111111111111111112");
        assert_eq!(favorite_key("0x"), "0x");
    }
}
