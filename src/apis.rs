/*!
## External data sources
- Token pairs and search results are pulled from https://dexscreener.com
- Balances, transaction lists, gas prices and token holders are pulled from
the Etherscan and BscScan explorer APIs, which share one request format.
- Market data and spot prices are pulled from https://www.coingecko.com
- Function signatures are pulled from https://4byte.directory

Every fetcher issues a single GET. Failures are logged and become `None`;
nothing is retried.
*/
use std::{collections::HashMap, fmt::Display};

use anyhow::{anyhow, bail, Result};
use log::{debug, error};
use reqwest::{header::CONTENT_TYPE, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    history::page_params,
    types::{Chain, Config},
};

/// Time frames reported by the DEX aggregator, shortest first.
pub const TIMEFRAMES: [&str; 4] = ["m5", "h1", "h6", "h24"];

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
/// Response for a token or search query at the DEX aggregator.
pub struct DexPairsResponse {
    #[serde(default)]
    pub pairs: Option<Vec<Pair>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
/// One market for a token on one exchange.
pub struct Pair {
    pub chain_id: String,
    pub dex_id: String,
    #[serde(default)]
    pub url: String,
    pub pair_address: String,
    pub base_token: PairToken,
    pub quote_token: PairToken,
    #[serde(default)]
    pub price_native: String,
    pub price_usd: Option<String>,
    #[serde(default)]
    pub txns: HashMap<String, TxnCount>,
    #[serde(default)]
    pub volume: HashMap<String, f64>,
    #[serde(default)]
    pub price_change: HashMap<String, f64>,
    pub liquidity: Option<Liquidity>,
    pub fdv: Option<f64>,
    pub market_cap: Option<f64>,
    /// Milliseconds since the unix epoch.
    pub pair_created_at: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PairToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnCount {
    pub buys: u64,
    pub sells: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Liquidity {
    pub usd: Option<f64>,
    #[serde(default)]
    pub base: f64,
    #[serde(default)]
    pub quote: f64,
}

impl Pair {
    /// Price in USD, if the aggregator reports one that parses.
    pub fn price_usd(&self) -> Option<f64> {
        self.price_usd.as_deref().and_then(|p| p.parse().ok())
    }
    pub fn price_native(&self) -> Option<f64> {
        self.price_native.parse().ok()
    }
    pub fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.and_then(|l| l.usd)
    }
}

#[derive(Deserialize, Debug)]
/// Common envelope of every explorer response.
struct ExplorerEnvelope {
    status: String,
    message: String,
    result: Value,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// A token transfer event touching an address (`action=tokentx`).
pub struct TokenTransfer {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub contract_address: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// A transaction sent to or from an address (`action=txlist`).
pub struct NormalTransaction {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub is_error: String,
    #[serde(default)]
    pub function_name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
/// Gas price estimate in gwei (`module=gastracker`).
pub struct GasOracle {
    #[serde(rename = "LastBlock")]
    pub last_block: String,
    #[serde(rename = "SafeGasPrice")]
    pub safe: String,
    #[serde(rename = "ProposeGasPrice")]
    pub propose: String,
    #[serde(rename = "FastGasPrice")]
    pub fast: String,
    #[serde(rename = "suggestBaseFee", default)]
    pub base_fee: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenHolder {
    #[serde(rename = "TokenHolderAddress")]
    pub address: String,
    /// Raw amount, not scaled by decimals.
    #[serde(rename = "TokenHolderQuantity")]
    pub quantity: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
/// Coin market data from /coins/markets
pub struct CoinMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub fully_diluted_valuation: Option<f64>,
    pub total_volume: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug)]
/// Response for a match query on function signatures at 4byte.directory.
pub struct FourBytePage {
    results: Vec<FourByteResponse>,
}

#[derive(Serialize, Deserialize, Debug)]
/// Content for a single match at 4byte.directory
pub struct FourByteResponse {
    id: u32,
    text_signature: String,
    hex_signature: String,
}

/// Client for every upstream API, built from the loaded configuration.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Config,
}

impl ApiClient {
    pub fn new(config: Config) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// All pairs for a token address.
    ///
    /// Example endpoint:
    ///
    /// https://api.dexscreener.com/latest/dex/tokens/0x6982508145454ce325ddbe47a25d4ec3d2311933
    pub async fn token_pairs(&self, token_address: &str) -> Option<Vec<Pair>> {
        let result: Result<Vec<Pair>> = async {
            let url = join_path(&self.config.dexscreener_url, &["tokens", token_address.trim()])?;
            let response: DexPairsResponse = self.get_json(url).await?;
            Ok(response.pairs.unwrap_or_default())
        }
        .await;
        reported("token pairs", token_address, result)
    }

    /// Pairs matching a free text query (name, symbol or address).
    pub async fn search_pairs(&self, query: &str) -> Option<Vec<Pair>> {
        let result: Result<Vec<Pair>> = async {
            let base = join_path(&self.config.dexscreener_url, &["search"])?;
            let url = Url::parse_with_params(base.as_str(), &[("q", query.trim())])?;
            let response: DexPairsResponse = self.get_json(url).await?;
            Ok(response.pairs.unwrap_or_default())
        }
        .await;
        reported("pair search", query, result)
    }

    /// Native coin balance in wei.
    pub async fn native_balance(&self, address: &str, chain: Chain) -> Option<String> {
        let result: Result<String> = async {
            let url = self.explorer_url(
                chain,
                &[
                    ("module", "account".to_string()),
                    ("action", "balance".to_string()),
                    ("address", address.to_string()),
                    ("tag", "latest".to_string()),
                ],
            )?;
            self.get_explorer::<String>(url).await
        }
        .await;
        reported("balance", address, result)
    }

    /// One page of token transfers for an address, newest first.
    pub async fn token_transfers(
        &self,
        address: &str,
        chain: Chain,
        start: u32,
        limit: u32,
    ) -> Option<Vec<TokenTransfer>> {
        let result: Result<Vec<TokenTransfer>> = async {
            let url = self.explorer_url(chain, &account_list_params("tokentx", address, start, limit)?)?;
            self.get_explorer::<Vec<TokenTransfer>>(url).await
        }
        .await;
        reported("token transfers", address, result)
    }

    /// One page of normal transactions for an address, newest first.
    pub async fn transactions(
        &self,
        address: &str,
        chain: Chain,
        start: u32,
        limit: u32,
    ) -> Option<Vec<NormalTransaction>> {
        let result: Result<Vec<NormalTransaction>> = async {
            let url = self.explorer_url(chain, &account_list_params("txlist", address, start, limit)?)?;
            self.get_explorer::<Vec<NormalTransaction>>(url).await
        }
        .await;
        reported("transactions", address, result)
    }

    pub async fn gas_oracle(&self, chain: Chain) -> Option<GasOracle> {
        let result: Result<GasOracle> = async {
            let url = self.explorer_url(
                chain,
                &[
                    ("module", "gastracker".to_string()),
                    ("action", "gasoracle".to_string()),
                ],
            )?;
            self.get_explorer::<GasOracle>(url).await
        }
        .await;
        reported("gas oracle", chain, result)
    }

    /// Largest holders of a token contract.
    pub async fn token_holders(
        &self,
        contract: &str,
        chain: Chain,
        limit: u32,
    ) -> Option<Vec<TokenHolder>> {
        let result: Result<Vec<TokenHolder>> = async {
            let (page, offset) = page_params(0, limit)?;
            let url = self.explorer_url(
                chain,
                &[
                    ("module", "token".to_string()),
                    ("action", "tokenholderlist".to_string()),
                    ("contractaddress", contract.to_string()),
                    ("page", page.to_string()),
                    ("offset", offset.to_string()),
                ],
            )?;
            self.get_explorer::<Vec<TokenHolder>>(url).await
        }
        .await;
        reported("token holders", contract, result)
    }

    /// Coins ordered by market capitalisation, largest first.
    pub async fn top_coins(&self, count: u32) -> Option<Vec<CoinMarket>> {
        let result: Result<Vec<CoinMarket>> = async {
            let base = join_path(&self.config.coingecko_url, &["coins", "markets"])?;
            let url = Url::parse_with_params(
                base.as_str(),
                &[
                    ("vs_currency", "usd".to_string()),
                    ("order", "market_cap_desc".to_string()),
                    ("per_page", count.to_string()),
                    ("page", "1".to_string()),
                    ("sparkline", "false".to_string()),
                ],
            )?;
            self.get_json::<Vec<CoinMarket>>(url).await
        }
        .await;
        reported("top coins", count, result)
    }

    /// USD price of a coin by aggregator id, e.g. "ethereum".
    pub async fn spot_price(&self, coin_id: &str) -> Option<f64> {
        let result: Result<f64> = async {
            let base = join_path(&self.config.coingecko_url, &["simple", "price"])?;
            let url = Url::parse_with_params(
                base.as_str(),
                &[("ids", coin_id), ("vs_currencies", "usd")],
            )?;
            let prices: HashMap<String, HashMap<String, f64>> = self.get_json(url).await?;
            prices
                .get(coin_id)
                .and_then(|p| p.get("usd"))
                .copied()
                .ok_or_else(|| anyhow!("No usd price in response"))
        }
        .await;
        reported("spot price", coin_id, result)
    }

    /// Returns the oldest match from 4byte api for a function selector.
    ///
    /// Example endpoint:
    ///
    /// https://www.4byte.directory/api/v1/signatures/?hex_signature=0xa9059cbb
    ///
    /// ## Hash collisions
    /// Several texts can share a selector. The earliest submission is
    /// usually the well known one, so the lowest id wins.
    pub async fn function_signature(&self, selector: &str) -> Result<Option<String>> {
        let hex_sig = format!("0x{}", selector.trim_start_matches("0x").to_lowercase());
        let url = Url::parse_with_params(&self.config.fourbyte_url, &[("hex_signature", &hex_sig)])?;
        let response: FourBytePage = self.get_json(url).await?;
        Ok(best_fourbyte_match(response, &hex_sig))
    }

    /// Explorer URL for the chain with the API key appended.
    pub fn explorer_url(&self, chain: Chain, params: &[(&str, String)]) -> Result<Url> {
        let explorer = self.config.explorer(chain);
        let mut url = Url::parse(&explorer.url)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            if !explorer.api_key.is_empty() {
                pairs.append_pair("apikey", &explorer.api_key);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", redact(&url));
        let response = self
            .http
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_explorer<T: DeserializeOwned + Default>(&self, url: Url) -> Result<T> {
        let envelope: ExplorerEnvelope = self.get_json(url).await?;
        explorer_result(envelope)
    }
}

/// Unwraps an explorer envelope. "No ... found" is an empty result, not a failure.
fn explorer_result<T: DeserializeOwned + Default>(envelope: ExplorerEnvelope) -> Result<T> {
    if envelope.status == "1" {
        return Ok(serde_json::from_value(envelope.result)?);
    }
    if envelope.message.starts_with("No ") {
        return Ok(T::default());
    }
    match envelope.result {
        Value::String(detail) => bail!("{}: {}", envelope.message, detail),
        _ => bail!("{}", envelope.message),
    }
}

/// Query parameters for the paginated account lists.
fn account_list_params(
    action: &str,
    address: &str,
    start: u32,
    limit: u32,
) -> Result<Vec<(&'static str, String)>> {
    let (page, offset) = page_params(start, limit)?;
    Ok(vec![
        ("module", "account".to_string()),
        ("action", action.to_string()),
        ("address", address.to_string()),
        ("page", page.to_string()),
        ("offset", offset.to_string()),
        ("sort", "desc".to_string()),
    ])
}

fn best_fourbyte_match(page: FourBytePage, hex_sig: &str) -> Option<String> {
    page.results
        .into_iter()
        .filter(|r| r.hex_signature.eq_ignore_ascii_case(hex_sig))
        .min_by_key(|r| r.id)
        .map(|r| r.text_signature)
}

/// Appends path segments to a base URL.
fn join_path(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Cannot add a path to {}", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// URL for logging, with the API key hidden.
fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "apikey" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        shown.query_pairs_mut().clear().extend_pairs(pairs);
    }
    shown.to_string()
}

/// Logs a failed fetch and turns it into `None`.
fn reported<T>(what: &str, key: impl Display, result: Result<T>) -> Option<T> {
    match result {
        Ok(t) => Some(t),
        Err(e) => {
            error!("Couldn't fetch {} for {} ({})", what, key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        let config = Config::from_lookup(|key| match key {
            "ETHERSCAN_API_KEY" => Some("KEY".to_string()),
            _ => None,
        })
        .unwrap();
        ApiClient::new(config)
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn transfer_page_request() {
        let params = account_list_params("tokentx", "0xabc", 60, 30).unwrap();
        let url = client().explorer_url(Chain::Eth, &params).unwrap();
        let q = query(&url);
        assert_eq!(url.host_str(), Some("api.etherscan.io"));
        assert_eq!(q["action"], "tokentx");
        assert_eq!(q["page"], "3");
        assert_eq!(q["offset"], "30");
        assert_eq!(q["apikey"], "KEY");
    }

    #[test]
    fn bsc_without_key_omits_apikey() {
        let params = account_list_params("txlist", "0xabc", 0, 10).unwrap();
        let url = client().explorer_url(Chain::Bsc, &params).unwrap();
        assert_eq!(url.host_str(), Some("api.bscscan.com"));
        assert!(!query(&url).contains_key("apikey"));
        assert_eq!(query(&url)["page"], "1");
    }

    #[test]
    fn redacts_api_key() {
        let url = client()
            .explorer_url(Chain::Eth, &[("module", "gastracker".to_string())])
            .unwrap();
        let shown = redact(&url);
        assert!(!shown.contains("KEY"));
        assert!(shown.contains("module=gastracker"));
    }

    #[test]
    fn dex_paths() {
        let url = join_path("https://api.dexscreener.com/latest/dex", &["tokens", "0xabc"]).unwrap();
        assert_eq!(url.as_str(), "https://api.dexscreener.com/latest/dex/tokens/0xabc");
        let url = join_path("https://api.coingecko.com/api/v3/", &["simple", "price"]).unwrap();
        assert_eq!(url.as_str(), "https://api.coingecko.com/api/v3/simple/price");
    }

    #[test]
    fn explorer_envelopes() {
        let ok: ExplorerEnvelope = serde_json::from_str(
            r#"{"status":"1","message":"OK","result":"1000000000000000000"}"#,
        )
        .unwrap();
        assert_eq!(explorer_result::<String>(ok).unwrap(), "1000000000000000000");

        let empty: ExplorerEnvelope = serde_json::from_str(
            r#"{"status":"0","message":"No transactions found","result":[]}"#,
        )
        .unwrap();
        assert!(explorer_result::<Vec<TokenTransfer>>(empty).unwrap().is_empty());

        let limited: ExplorerEnvelope = serde_json::from_str(
            r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#,
        )
        .unwrap();
        let err = explorer_result::<Vec<TokenTransfer>>(limited).unwrap_err();
        assert!(err.to_string().contains("Max rate limit reached"));
    }

    #[test]
    fn decodes_gas_oracle() {
        let envelope: ExplorerEnvelope = serde_json::from_str(
            r#"{"status":"1","message":"OK","result":{"LastBlock":"19000000","SafeGasPrice":"20","ProposeGasPrice":"21","FastGasPrice":"25","suggestBaseFee":"19.5","gasUsedRatio":"0.4,0.5"}}"#,
        )
        .unwrap();
        let gas: GasOracle = explorer_result(envelope).unwrap();
        assert_eq!(gas.propose, "21");
        assert_eq!(gas.base_fee.as_deref(), Some("19.5"));
    }

    #[test]
    fn decodes_pairs_with_missing_fields() {
        let json = r#"{"schemaVersion":"1.0.0","pairs":[{"chainId":"ethereum","dexId":"uniswap","url":"https://dexscreener.com/ethereum/0xpair","pairAddress":"0xpair","baseToken":{"address":"0xabc","name":"Pepe","symbol":"PEPE"},"quoteToken":{"address":"0xweth","name":"Wrapped Ether","symbol":"WETH"},"priceNative":"0.0000000031","priceUsd":"0.00001","txns":{"m5":{"buys":1,"sells":2},"h24":{"buys":100,"sells":90}},"volume":{"h24":12345.6},"priceChange":{"h24":-3.2},"liquidity":{"usd":50000.0,"base":100,"quote":5}}]}"#;
        let response: DexPairsResponse = serde_json::from_str(json).unwrap();
        let pair = &response.pairs.unwrap()[0];
        assert_eq!(pair.base_token.symbol, "PEPE");
        assert_eq!(pair.price_usd(), Some(0.00001));
        assert_eq!(pair.fdv, None);
        assert_eq!(pair.txns["h24"].sells, 90);
        assert_eq!(pair.liquidity_usd(), Some(50000.0));

        let none: DexPairsResponse = serde_json::from_str(r#"{"pairs":null}"#).unwrap();
        assert!(none.pairs.is_none());
    }

    #[test]
    fn fourbyte_prefers_oldest_match() {
        let page: FourBytePage = serde_json::from_str(
            r#"{"next":null,"previous":null,"count":2,"results":[
                {"id":313067,"created_at":"2021-01-01","text_signature":"many_msg_babbage(bytes1)","hex_signature":"0xa9059cbb","bytes_signature":"x"},
                {"id":145,"created_at":"2016-07-09","text_signature":"transfer(address,uint256)","hex_signature":"0xa9059cbb","bytes_signature":"x"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            best_fourbyte_match(page, "0xa9059cbb").as_deref(),
            Some("transfer(address,uint256)")
        );
    }
}
