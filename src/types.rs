use std::{fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

const ETHERSCAN: &str = "https://api.etherscan.io/api";
const BSCSCAN: &str = "https://api.bscscan.com/api";
const DEXSCREENER: &str = "https://api.dexscreener.com/latest/dex";
const COINGECKO: &str = "https://api.coingecko.com/api/v3";
const FOURBYTE: &str = "https://www.4byte.directory/api/v1/signatures/";

const FAVORITE_TOKENS_FILE: &str = "favorite_tokens.json";
const FAVORITE_WALLETS_FILE: &str = "favorite_wallets.json";
const LAST_PRICES_FILE: &str = "last_scanned_prices.json";

/// Default number of records requested per explorer page.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Chains with a supported block explorer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[default]
    Eth,
    Bsc,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Eth, Chain::Bsc];

    /// Ticker of the native coin, used for balances.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bsc => "BNB",
        }
    }
    /// Id of the native coin at the market-data aggregator.
    pub fn native_coin_id(&self) -> &'static str {
        match self {
            Chain::Eth => "ethereum",
            Chain::Bsc => "binancecoin",
        }
    }
    /// Name of the explorer serving this chain.
    pub fn explorer_name(&self) -> &'static str {
        match self {
            Chain::Eth => "Etherscan",
            Chain::Bsc => "BscScan",
        }
    }
}

impl FromStr for Chain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "eth" | "ethereum" => Ok(Chain::Eth),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            other => Err(anyhow!("Unsupported chain: {}", other)),
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chain::Eth => write!(f, "eth"),
            Chain::Bsc => write!(f, "bsc"),
        }
    }
}

/// Base URL and key of one block explorer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explorer {
    pub url: String,
    pub api_key: String,
}

/// Settings read once at start up and handed to the fetchers and stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub etherscan: Explorer,
    pub bscscan: Explorer,
    pub dexscreener_url: String,
    pub coingecko_url: String,
    pub fourbyte_url: String,
    /// Directory holding the favorites and price files.
    pub data_dir: PathBuf,
    /// Records per page when walking transaction history.
    pub page_size: u32,
}

impl Config {
    /// Reads the settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let page_size = match lookup("TOKEN_ANALYZER_PAGE_SIZE") {
            Some(s) => s
                .trim()
                .parse::<u32>()
                .map_err(|e| anyhow!("Invalid TOKEN_ANALYZER_PAGE_SIZE '{}': {}", s, e))?,
            None => DEFAULT_PAGE_SIZE,
        };
        if page_size == 0 {
            bail!("TOKEN_ANALYZER_PAGE_SIZE must be greater than zero");
        }
        Ok(Config {
            etherscan: Explorer {
                url: var("ETHERSCAN_API_URL", ETHERSCAN),
                api_key: var("ETHERSCAN_API_KEY", ""),
            },
            bscscan: Explorer {
                url: var("BSCSCAN_API_URL", BSCSCAN),
                api_key: var("BSCSCAN_API_KEY", ""),
            },
            dexscreener_url: var("DEXSCREENER_API_URL", DEXSCREENER),
            coingecko_url: var("COINGECKO_API_URL", COINGECKO),
            fourbyte_url: var("FOURBYTE_API_URL", FOURBYTE),
            data_dir: PathBuf::from(var("TOKEN_ANALYZER_DATA_DIR", ".")),
            page_size,
        })
    }

    /// Explorer serving the given chain.
    pub fn explorer(&self, chain: Chain) -> &Explorer {
        match chain {
            Chain::Eth => &self.etherscan,
            Chain::Bsc => &self.bscscan,
        }
    }

    pub fn favorite_tokens_path(&self) -> PathBuf {
        self.data_dir.join(FAVORITE_TOKENS_FILE)
    }

    pub fn favorite_wallets_path(&self) -> PathBuf {
        self.data_dir.join(FAVORITE_WALLETS_FILE)
    }

    pub fn last_prices_path(&self) -> PathBuf {
        self.data_dir.join(LAST_PRICES_FILE)
    }
}

/// A resource may have been looked up before. This stores the result of that attempt.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum VisitNote {
    #[default]
    NotVisited,
    PriorSuccess,
    PriorFailure,
}
