use std::{collections::BTreeMap, io::BufRead};

use anyhow::Result;
use colored::Colorize;
use log::{debug, warn};

use crate::{
    apis::{ApiClient, Pair},
    cache::SignatureCache,
    display::{print_error, print_success, print_warning},
    favorites::{
        favorite_key, format_change, FavoriteToken, FavoriteWallet, PriceHistory, PriceSnapshot,
        TokenFavorites, WalletFavorites,
    },
    history::{TransactionHistory, TransferHistory},
    prompt::Prompt,
    report,
    selectors::{decode_call, DecodedCall, UNKNOWN_FUNCTION},
    types::{Chain, Config},
};

const MAX_SEARCH_RESULTS: usize = 20;

/// Everything the interactive session works on.
pub struct App<R> {
    client: ApiClient,
    tokens: TokenFavorites,
    wallets: WalletFavorites,
    prices: PriceHistory,
    signatures: SignatureCache,
    prompt: Prompt<R>,
}

impl<R: BufRead> App<R> {
    /// Loads the favorites files named by the configuration.
    pub fn new(config: Config, input: R) -> Result<Self> {
        let tokens = TokenFavorites::load(config.favorite_tokens_path())?;
        let wallets = WalletFavorites::load(config.favorite_wallets_path())?;
        let prices = PriceHistory::load(config.last_prices_path())?;
        debug!(
            "Loaded {} favorite tokens, {} favorite wallets, {} prices",
            tokens.len(),
            wallets.len(),
            prices.len()
        );
        Ok(App {
            client: ApiClient::new(config),
            tokens,
            wallets,
            prices,
            signatures: SignatureCache::default(),
            prompt: Prompt::new(input),
        })
    }

    /// Main menu loop. Returns when the user exits or input closes.
    pub async fn run(&mut self) -> Result<()> {
        println!("{}", "Welcome to the Crypto Token Analyzer!".green().bold());
        println!("This tool fetches and displays information about cryptocurrency tokens and wallets.");
        loop {
            println!("\n{}", "Menu:".cyan().bold());
            println!("1. Analyze a token");
            println!("2. View favorite tokens");
            println!("3. Scan all favorite tokens");
            println!("4. Search meme tokens");
            println!("5. Top coins by market cap");
            println!("6. Gas prices");
            println!("7. Look up a wallet");
            println!("8. View favorite wallets");
            println!("9. Token holders");
            println!("0. Exit");
            let choices = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "0"];
            let Some(choice) = self.prompt.choose("Enter your choice", &choices)? else {
                break;
            };
            // Store failures end the action, not the session.
            let outcome = match choice.as_str() {
                "1" => self.analyze_token_prompt().await,
                "2" => self.favorite_tokens_menu().await,
                "3" => self.scan_all_favorites().await,
                "4" => self.search_tokens().await,
                "5" => self.top_coins().await,
                "6" => self.gas_prices().await,
                "7" => self.wallet_prompt().await,
                "8" => self.favorite_wallets_menu().await,
                "9" => self.token_holders().await,
                _ => break,
            };
            if let Err(e) = outcome {
                warn!("Action {} failed: {:?}", choice, e);
                print_error(&format!("Error: {:#}", e));
            }
        }
        println!("{}", "Thank you for using the Crypto Token Analyzer!".green().bold());
        Ok(())
    }

    async fn analyze_token_prompt(&mut self) -> Result<()> {
        let address = self.prompt.ask("\nEnter the token address")?;
        if address.is_empty() {
            print_error("No address entered.");
            return Ok(());
        }
        self.analyze_token(&address, true).await
    }

    /// Shows every table for a token. Favorites get their scan data refreshed.
    async fn analyze_token(&mut self, address: &str, offer_favorite: bool) -> Result<()> {
        let Some(pair) = self.fetch_main_pair(address).await else {
            print_error("No data found for the given token address.");
            print_warning("Please check the address and try again.");
            return Ok(());
        };
        println!("{}", report::token_panel(&pair));
        println!("{}", report::pair_panel(&pair));
        println!("{}", report::price_change_table(&pair));
        println!("{}", report::liquidity_table(&pair));
        println!("{}", report::volume_table(&pair));
        println!("{}", report::txns_table(&pair));

        // Entries saved under another spelling are still found by their exact key.
        let key = if self.tokens.contains(address) {
            address.to_string()
        } else {
            favorite_key(address)
        };
        if let Some(favorite) = self.tokens.get(&key) {
            if let Some(change) = pair.price_usd().and_then(|p| favorite.change_since_scan(p)) {
                println!(
                    "Change since last scan ({}): {}",
                    favorite.last_scan_time.format("%Y-%m-%d %H:%M UTC"),
                    report_change(change)
                );
            }
            self.tokens.record_pair(&key, &pair)?;
            if offer_favorite && self.prompt.confirm("Remove this token from favorites?")? {
                self.remove_favorite_token(&key)?;
            }
        } else if offer_favorite {
            match FavoriteToken::from_pair(&pair) {
                Some(entry) => {
                    if self.prompt.confirm("Add this token to favorites?")? {
                        self.tokens.add(&key, entry)?;
                        print_success(&format!("Added {} to favorites!", pair.base_token.name));
                    }
                }
                None => print_warning("No USD price reported, so this token cannot be tracked as a favorite."),
            }
        }
        Ok(())
    }

    /// First pair the aggregator lists, which is its most liquid market.
    async fn fetch_main_pair(&self, address: &str) -> Option<Pair> {
        println!("{}", "Fetching data...".green());
        self.client.token_pairs(address).await?.into_iter().next()
    }

    fn remove_favorite_token(&mut self, address: &str) -> Result<()> {
        match self.tokens.remove(address)? {
            Some(removed) => print_warning(&format!("Removed {} from favorites.", removed.name)),
            None => print_error("Token not found in favorites."),
        }
        Ok(())
    }

    async fn favorite_tokens_menu(&mut self) -> Result<()> {
        if self.tokens.is_empty() {
            print_warning("No favorites saved yet.");
            return Ok(());
        }
        println!("{}", report::favorite_tokens_table(self.tokens.iter()));
        println!("\n{}", "Favorite Token Options:".cyan().bold());
        println!("1. Enter the number of a favorite token to analyze");
        println!("2. Scan all favorite tokens");
        println!("3. Remove a favorite token by number");
        println!("4. Remove all favorite tokens");
        println!("5. Return to the main menu");
        let Some(choice) = self.prompt.choose("Enter your choice", &["1", "2", "3", "4", "5"])? else {
            return Ok(());
        };
        match choice.as_str() {
            "1" => {
                let Some(address) = self.pick_favorite_token("analyze")? else {
                    return Ok(());
                };
                self.analyze_token(&address, false).await?;
            }
            "2" => self.scan_all_favorites().await?,
            "3" => {
                if let Some(address) = self.pick_favorite_token("remove")? {
                    self.remove_favorite_token(&address)?;
                }
            }
            "4" => {
                if self.prompt.confirm("Are you sure you want to remove all favorites?")? {
                    self.tokens.clear()?;
                    print_warning("All favorites have been removed.");
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn pick_favorite_token(&mut self, verb: &str) -> Result<Option<String>> {
        let question = format!("Enter the number of the favorite token to {}", verb);
        match self.prompt.pick_index(&question, self.tokens.len())? {
            Ok(i) => Ok(self.tokens.nth(i).map(|(address, _)| address.clone())),
            Err(message) => {
                print_error(&message);
                Ok(None)
            }
        }
    }

    /// Scans favorites one after another, refreshing each entry.
    async fn scan_all_favorites(&mut self) -> Result<()> {
        if self.tokens.is_empty() {
            print_warning("No favorites saved yet.");
            return Ok(());
        }
        let favorites: Vec<(String, FavoriteToken)> = self
            .tokens
            .iter()
            .map(|(a, f)| (a.clone(), f.clone()))
            .collect();
        for (address, favorite) in favorites {
            let Some(pair) = self.fetch_main_pair(&address).await else {
                print_error(&format!("Failed to fetch data for {}", favorite.name));
                continue;
            };
            println!("{}", report::favorite_summary(&address, &favorite, &pair));
            self.tokens.record_pair(&address, &pair)?;
        }
        Ok(())
    }

    async fn search_tokens(&mut self) -> Result<()> {
        let query = self.prompt.ask("\nEnter a token name, symbol or address to search")?;
        if query.is_empty() {
            print_error("No search term entered.");
            return Ok(());
        }
        println!("{}", "Searching...".green());
        let Some(mut pairs) = self.client.search_pairs(&query).await else {
            print_error("Search failed.");
            return Ok(());
        };
        if pairs.is_empty() {
            print_warning(&format!("No pairs found for '{}'.", query));
            return Ok(());
        }
        pairs.truncate(MAX_SEARCH_RESULTS);
        println!("{}", report::search_table(&query, &pairs));

        let answer = self.prompt.ask("Enter a result number to analyze (or press Enter to go back)")?;
        if answer.is_empty() {
            return Ok(());
        }
        match crate::prompt::parse_index(&answer, pairs.len()) {
            Ok(i) => {
                let address = pairs[i].base_token.address.clone();
                self.analyze_token(&address, true).await?;
            }
            Err(message) => print_error(&message),
        }
        Ok(())
    }

    /// Top coins compared with the previous run, then recorded for the next one.
    async fn top_coins(&mut self) -> Result<()> {
        let count = self.prompt.ask_or("How many coins?", "20")?;
        let count = match count.parse::<u32>() {
            Ok(n) if (1..=250).contains(&n) => n,
            _ => {
                print_error("Please enter a number between 1 and 250.");
                return Ok(());
            }
        };
        println!("{}", "Fetching market data...".green());
        let Some(coins) = self.client.top_coins(count).await else {
            print_error("Failed to fetch market data.");
            return Ok(());
        };
        let previous: BTreeMap<String, PriceSnapshot> = self
            .prices
            .iter()
            .map(|(s, p)| (s.clone(), p.clone()))
            .collect();
        println!("{}", report::top_coins_table(&coins, &previous));
        self.prices.replace_all(report::price_snapshots(&coins))?;
        Ok(())
    }

    async fn gas_prices(&mut self) -> Result<()> {
        println!("{}", "Fetching gas prices...".green());
        let mut estimates = vec![];
        for chain in Chain::ALL {
            estimates.push((chain, self.client.gas_oracle(chain).await));
        }
        println!("{}", report::gas_table(&estimates));
        Ok(())
    }

    fn ask_chain(&mut self) -> Result<Option<Chain>> {
        let answer = self.prompt.ask_or("Chain (eth/bsc)", "eth")?;
        match answer.parse::<Chain>() {
            Ok(chain) => Ok(Some(chain)),
            Err(e) => {
                print_error(&e.to_string());
                Ok(None)
            }
        }
    }

    async fn wallet_prompt(&mut self) -> Result<()> {
        let address = self.prompt.ask("\nEnter the wallet address")?;
        if address.is_empty() {
            print_error("No address entered.");
            return Ok(());
        }
        let Some(chain) = self.ask_chain()? else {
            return Ok(());
        };
        self.wallet_lookup(&address, chain).await?;
        let key = favorite_key(&address);
        if !self.wallets.contains(&key) && self.prompt.confirm("Add this wallet to favorites?")? {
            let nickname = self.prompt.ask("Nickname (optional)")?;
            self.wallets.add(&key, FavoriteWallet { chain, nickname })?;
            print_success("Wallet added to favorites!");
        }
        Ok(())
    }

    /// Balance, paged token transfers and decoded recent transactions.
    async fn wallet_lookup(&mut self, address: &str, chain: Chain) -> Result<()> {
        println!("{}", format!("Fetching {} data...", chain.explorer_name()).green());
        match self.client.native_balance(address, chain).await {
            Some(wei) => {
                let price = self.client.spot_price(chain.native_coin_id()).await;
                println!("{}", report::balance_panel(address, chain, &wei, price));
            }
            None => print_error("Failed to fetch wallet balance."),
        }

        let page_size = self.client.config().page_size;
        let mut transfers = TransferHistory::new(address, chain, page_size);
        loop {
            match transfers.fetch_next_page(&self.client).await {
                Ok(0) if transfers.is_empty() => {
                    print_warning("No token transfers found.");
                    break;
                }
                Ok(added) => {
                    println!("{}", report::transfers_table(&transfers));
                    if added == 0 || transfers.is_exhausted() {
                        print_warning("No more transfers.");
                        break;
                    }
                }
                Err(e) => {
                    print_error(&format!("{}", e));
                    break;
                }
            }
            if !self.prompt.confirm("Fetch more transfers?")? {
                break;
            }
        }

        let mut transactions = TransactionHistory::new(address, chain, page_size);
        match transactions.fetch_next_page(&self.client).await {
            Ok(_) if transactions.is_empty() => print_warning("No transactions found."),
            Ok(_) => {
                let mut calls = Vec::with_capacity(transactions.len());
                for tx in &transactions.records {
                    calls.push(self.label_call(decode_call(&tx.input)).await);
                }
                println!(
                    "{}",
                    report::transactions_table(address, chain, &transactions.records, &calls)
                );
            }
            Err(e) => print_error(&format!("{}", e)),
        }
        Ok(())
    }

    /// Pairs a decoded call with its label, asking 4byte about unknown selectors.
    async fn label_call(&mut self, call: DecodedCall) -> (DecodedCall, String) {
        if call.is_known() || call.selector.is_empty() {
            let label = call.name.to_string();
            return (call, label);
        }
        let label = match self.signatures.try_sig(&call.selector, &self.client).await {
            Some(text) => format!("{} ({})", UNKNOWN_FUNCTION, text),
            None => format!("{} {}", UNKNOWN_FUNCTION, call.selector),
        };
        (call, label)
    }

    async fn favorite_wallets_menu(&mut self) -> Result<()> {
        if self.wallets.is_empty() {
            print_warning("No favorite wallets saved yet.");
            return Ok(());
        }
        println!("{}", report::favorite_wallets_table(self.wallets.iter()));
        println!("\n{}", "Favorite Wallet Options:".cyan().bold());
        println!("1. Enter the number of a favorite wallet to look up");
        println!("2. Remove a favorite wallet by number");
        println!("3. Remove all favorite wallets");
        println!("4. Return to the main menu");
        let Some(choice) = self.prompt.choose("Enter your choice", &["1", "2", "3", "4"])? else {
            return Ok(());
        };
        match choice.as_str() {
            "1" => {
                if let Some((address, wallet)) = self.pick_favorite_wallet("look up")? {
                    self.wallet_lookup(&address, wallet.chain).await?;
                }
            }
            "2" => {
                if let Some((address, _)) = self.pick_favorite_wallet("remove")? {
                    match self.wallets.remove(&address)? {
                        Some(_) => print_warning(&format!("Removed {} from favorites.", address)),
                        None => print_error("Wallet not found in favorites."),
                    }
                }
            }
            "3" => {
                if self.prompt.confirm("Are you sure you want to remove all favorite wallets?")? {
                    self.wallets.clear()?;
                    print_warning("All favorite wallets have been removed.");
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn pick_favorite_wallet(&mut self, verb: &str) -> Result<Option<(String, FavoriteWallet)>> {
        let question = format!("Enter the number of the favorite wallet to {}", verb);
        match self.prompt.pick_index(&question, self.wallets.len())? {
            Ok(i) => Ok(self.wallets.nth(i).map(|(a, w)| (a.clone(), w.clone()))),
            Err(message) => {
                print_error(&message);
                Ok(None)
            }
        }
    }

    async fn token_holders(&mut self) -> Result<()> {
        let contract = self.prompt.ask("\nEnter the token contract address")?;
        if contract.is_empty() {
            print_error("No address entered.");
            return Ok(());
        }
        let Some(chain) = self.ask_chain()? else {
            return Ok(());
        };
        let decimals = self.prompt.ask_or("Token decimals", "18")?;
        let limit = self.prompt.ask_or("How many holders?", "10")?;
        let Ok(limit) = limit.parse::<u32>() else {
            print_error("Invalid input. Please enter a number.");
            return Ok(());
        };
        if limit == 0 {
            print_error("Please enter a number greater than zero.");
            return Ok(());
        }
        println!("{}", "Fetching holders...".green());
        match self.client.token_holders(&contract, chain, limit).await {
            Some(holders) if holders.is_empty() => print_warning("No holders found."),
            Some(holders) => println!("{}", report::holders_table(&holders, &decimals)),
            None => print_error("Failed to fetch token holders."),
        }
        Ok(())
    }
}

fn report_change(change: f64) -> String {
    let text = format_change(change);
    if change >= 0.0 {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::*;

    /// Session on a temporary data directory. Upstream URLs point at a closed
    /// local port so lookups fail fast.
    fn app(dir: &TempDir, input: &str) -> App<Cursor<Vec<u8>>> {
        let data_dir = dir.path().to_string_lossy().into_owned();
        let config = Config::from_lookup(|key| match key {
            "TOKEN_ANALYZER_DATA_DIR" => Some(data_dir.clone()),
            "ETHERSCAN_API_URL" | "BSCSCAN_API_URL" => Some("http://127.0.0.1:9/api".to_string()),
            "DEXSCREENER_API_URL" | "COINGECKO_API_URL" | "FOURBYTE_API_URL" => {
                Some("http://127.0.0.1:9/".to_string())
            }
            _ => None,
        })
        .unwrap();
        App::new(config, Cursor::new(input.as_bytes().to_vec())).unwrap()
    }

    fn seed_tokens(dir: &TempDir) {
        let mut tokens = TokenFavorites::load(dir.path().join("favorite_tokens.json")).unwrap();
        tokens.add("0xaaa", FavoriteToken::new("Alpha", 1.0, None)).unwrap();
        tokens.add("0xbbb", FavoriteToken::new("Beta", 2.0, None)).unwrap();
    }

    #[tokio::test]
    async fn remove_favorite_by_number() {
        let dir = TempDir::new().unwrap();
        seed_tokens(&dir);
        let mut app = app(&dir, "2\n3\n2\n0\n");
        app.run().await.unwrap();
        let tokens = TokenFavorites::load(dir.path().join("favorite_tokens.json")).unwrap();
        assert!(tokens.contains("0xaaa"));
        assert!(!tokens.contains("0xbbb"));
    }

    #[tokio::test]
    async fn clear_favorites_needs_confirmation() {
        let dir = TempDir::new().unwrap();
        seed_tokens(&dir);
        let mut app = app(&dir, "2\n4\nn\n2\n4\ny\n");
        app.run().await.unwrap();
        let tokens = TokenFavorites::load(dir.path().join("favorite_tokens.json")).unwrap();
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn invalid_numbers_leave_favorites_untouched() {
        let dir = TempDir::new().unwrap();
        seed_tokens(&dir);
        let mut app = app(&dir, "2\n3\n9\n2\n3\nabc\n");
        app.run().await.unwrap();
        let tokens = TokenFavorites::load(dir.path().join("favorite_tokens.json")).unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[tokio::test]
    async fn remove_favorite_wallet() {
        let dir = TempDir::new().unwrap();
        let mut wallets = WalletFavorites::load(dir.path().join("favorite_wallets.json")).unwrap();
        wallets
            .add(
                "0xwallet",
                FavoriteWallet {
                    chain: Chain::Eth,
                    nickname: "main".to_string(),
                },
            )
            .unwrap();
        let mut app = app(&dir, "8\n2\n1\n");
        app.run().await.unwrap();
        let wallets = WalletFavorites::load(dir.path().join("favorite_wallets.json")).unwrap();
        assert!(wallets.is_empty());
    }

    #[tokio::test]
    async fn closed_input_exits() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, "");
        app.run().await.unwrap();
        assert!(!dir.path().join("favorite_tokens.json").exists());
    }

    #[tokio::test]
    async fn wallet_spellings_share_one_favorite() {
        let dir = TempDir::new().unwrap();
        let checksummed = "0xAbC0000000000000000000000000000000000001";
        let input = format!(
            "7\n{}\neth\ny\nmain\n7\n{}\n\n",
            checksummed,
            checksummed.to_lowercase()
        );
        let mut app = app(&dir, &input);
        app.run().await.unwrap();
        let wallets = WalletFavorites::load(dir.path().join("favorite_wallets.json")).unwrap();
        assert_eq!(wallets.len(), 1);
        let wallet = wallets.get("0xabc0000000000000000000000000000000000001").unwrap();
        assert_eq!(wallet.nickname, "main");
        assert_eq!(wallet.chain, Chain::Eth);
    }

    #[tokio::test]
    async fn unreachable_token_is_not_added() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, "1\n0xabc\ny\n");
        app.run().await.unwrap();
        assert!(!dir.path().join("favorite_tokens.json").exists());
    }
}
