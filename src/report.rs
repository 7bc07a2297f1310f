//! Builds the panels and tables for each kind of fetched data.
use std::collections::BTreeMap;

use colored::Colorize;
use tabled::{builder::Builder, Table};

use crate::{
    apis::{CoinMarket, GasOracle, NormalTransaction, Pair, TokenHolder, TokenTransfer, TIMEFRAMES},
    display::{
        change_cell, format_number, format_price, format_timestamp, format_usd, not_available, panel,
        scale_amount, short_address, timeframe_label, titled_table, Align,
    },
    favorites::{percent_change, FavoriteToken, FavoriteWallet, PriceSnapshot},
    history::{Direction, TransferHistory},
    selectors::{CallDetails, DecodedCall, RawAmount},
    types::Chain,
};

const NATIVE_DECIMALS: &str = "18";

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn optional_usd(value: Option<f64>) -> String {
    value.map(format_usd).unwrap_or_else(not_available)
}

fn optional_change(value: Option<f64>) -> String {
    value.map(change_cell).unwrap_or_else(not_available)
}

fn optional_price(value: Option<f64>) -> String {
    value
        .map(|p| format_price(p).yellow().to_string())
        .unwrap_or_else(not_available)
}

/// Appends one label/value line to a panel under construction.
fn line(rows: &mut Builder, label: &str, value: String) {
    rows.push_record([label.to_string(), value]);
}

pub fn token_panel(pair: &Pair) -> Table {
    let mut rows = Builder::default();
    line(&mut rows, "Name", pair.base_token.name.cyan().to_string());
    line(&mut rows, "Symbol", format!("${}", pair.base_token.symbol).magenta().to_string());
    line(&mut rows, "Address", pair.base_token.address.green().to_string());
    if let Some(fdv) = pair.fdv {
        line(&mut rows, "Fully Diluted Valuation", format_usd(fdv));
    }
    if let Some(cap) = pair.market_cap {
        line(&mut rows, "Market Cap", format_usd(cap));
    }
    panel("Token Information", rows)
}

pub fn pair_panel(pair: &Pair) -> Table {
    let quote = &pair.quote_token.symbol;
    let mut rows = Builder::default();
    line(
        &mut rows,
        "Pair",
        format!("{}/{}", pair.base_token.symbol, quote).cyan().to_string(),
    );
    line(&mut rows, "DEX", capitalize(&pair.dex_id).magenta().to_string());
    line(&mut rows, "Chain", capitalize(&pair.chain_id).green().to_string());
    line(&mut rows, "Price (USD)", optional_price(pair.price_usd()));
    if let Some(native) = pair.price_native() {
        line(
            &mut rows,
            "Price (Native)",
            format!("{} {}", format_price(native).trim_start_matches('$'), quote)
                .yellow()
                .to_string(),
        );
    }
    line(&mut rows, "Pair Address", pair.pair_address.blue().to_string());
    if let Some(created) = pair.pair_created_at {
        line(&mut rows, "Created", format_timestamp(&(created / 1000).to_string()));
    }
    if !pair.url.is_empty() {
        line(&mut rows, "DEX URL", pair.url.blue().to_string());
    }
    panel("Pair Information", rows)
}

pub fn price_change_table(pair: &Pair) -> Table {
    let rows = TIMEFRAMES
        .iter()
        .filter_map(|frame| {
            let change = pair.price_change.get(*frame)?;
            Some(vec![timeframe_label(frame).cyan().to_string(), change_cell(*change)])
        })
        .collect();
    titled_table(
        "Price Changes",
        &[("Time Frame", Align::Left), ("Change %", Align::Right)],
        rows,
    )
}

pub fn liquidity_table(pair: &Pair) -> Table {
    let mut rows = vec![];
    if let Some(liquidity) = pair.liquidity {
        rows.push(vec!["USD".to_string(), optional_usd(liquidity.usd)]);
        rows.push(vec![pair.base_token.symbol.clone(), format_number(liquidity.base, 2)]);
        rows.push(vec![pair.quote_token.symbol.clone(), format_number(liquidity.quote, 2)]);
    }
    titled_table(
        "Liquidity",
        &[("Metric", Align::Left), ("Value", Align::Right)],
        rows,
    )
}

pub fn volume_table(pair: &Pair) -> Table {
    let rows = TIMEFRAMES
        .iter()
        .filter_map(|frame| {
            let volume = pair.volume.get(*frame)?;
            Some(vec![timeframe_label(frame).cyan().to_string(), format_usd(*volume)])
        })
        .collect();
    titled_table(
        "Volume",
        &[("Time Frame", Align::Left), ("Volume (USD)", Align::Right)],
        rows,
    )
}

pub fn txns_table(pair: &Pair) -> Table {
    let rows = TIMEFRAMES
        .iter()
        .filter_map(|frame| {
            let count = pair.txns.get(*frame)?;
            Some(vec![
                timeframe_label(frame).cyan().to_string(),
                count.buys.to_string().green().to_string(),
                count.sells.to_string().red().to_string(),
            ])
        })
        .collect();
    titled_table(
        "Transactions",
        &[
            ("Time Frame", Align::Left),
            ("Buys", Align::Right),
            ("Sells", Align::Right),
        ],
        rows,
    )
}

/// Short summary used when scanning favorites.
pub fn favorite_summary(address: &str, favorite: &FavoriteToken, pair: &Pair) -> Table {
    let price = pair.price_usd();
    let mut rows = Builder::default();
    line(&mut rows, "Name", favorite.name.cyan().to_string());
    line(&mut rows, "Address", address.green().to_string());
    line(&mut rows, "Price", optional_price(price));
    line(&mut rows, "24h Change", optional_change(pair.price_change.get("h24").copied()));
    line(
        &mut rows,
        "Last Scan",
        format!(
            "{} at {}",
            format_price(favorite.last_scan_price),
            favorite.last_scan_time.format("%Y-%m-%d %H:%M UTC")
        ),
    );
    line(
        &mut rows,
        "Since Last Scan",
        optional_change(price.and_then(|p| favorite.change_since_scan(p))),
    );
    line(&mut rows, "Liquidity", optional_usd(pair.liquidity_usd()));
    line(&mut rows, "24h Volume", optional_usd(pair.volume.get("h24").copied()));
    if let Some(t) = pair.txns.get("h24") {
        line(&mut rows, "24h Transactions", format!("Buys: {}, Sells: {}", t.buys, t.sells));
    }
    if let Some(fdv) = pair.fdv {
        line(&mut rows, "Market Cap (FDV)", format_usd(fdv));
        if let Some(last) = favorite.last_scan_fdv {
            line(&mut rows, "FDV Since Last Scan", optional_change(percent_change(last, fdv)));
        }
    }
    panel(&format!("Summary for {}", favorite.name), rows)
}

pub fn favorite_tokens_table<'a>(
    favorites: impl Iterator<Item = (&'a String, &'a FavoriteToken)>,
) -> Table {
    let rows = favorites
        .enumerate()
        .map(|(i, (address, token))| {
            vec![
                (i + 1).to_string().cyan().to_string(),
                address.cyan().to_string(),
                token.name.magenta().to_string(),
                format_price(token.last_scan_price),
                optional_usd(token.last_scan_fdv),
                token.last_scan_time.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    titled_table(
        "Favorite Tokens",
        &[
            ("#", Align::Right),
            ("Address", Align::Left),
            ("Name", Align::Left),
            ("Last Price", Align::Right),
            ("Last FDV", Align::Right),
            ("Last Scan", Align::Left),
        ],
        rows,
    )
}

pub fn favorite_wallets_table<'a>(
    wallets: impl Iterator<Item = (&'a String, &'a FavoriteWallet)>,
) -> Table {
    let rows = wallets
        .enumerate()
        .map(|(i, (address, wallet))| {
            vec![
                (i + 1).to_string().cyan().to_string(),
                address.green().to_string(),
                wallet.chain.to_string().to_uppercase(),
                wallet.nickname.magenta().to_string(),
            ]
        })
        .collect();
    titled_table(
        "Favorite Wallets",
        &[
            ("#", Align::Right),
            ("Address", Align::Left),
            ("Chain", Align::Left),
            ("Nickname", Align::Left),
        ],
        rows,
    )
}

pub fn search_table(query: &str, pairs: &[Pair]) -> Table {
    let rows = pairs
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            vec![
                (i + 1).to_string(),
                format!("{}/{}", pair.base_token.symbol, pair.quote_token.symbol)
                    .cyan()
                    .to_string(),
                pair.chain_id.clone(),
                pair.dex_id.clone(),
                pair.price_usd().map(format_price).unwrap_or_else(not_available),
                optional_change(pair.price_change.get("h24").copied()),
                optional_usd(pair.liquidity_usd()),
                optional_usd(pair.volume.get("h24").copied()),
                optional_usd(pair.fdv),
                pair.base_token.address.green().to_string(),
            ]
        })
        .collect();
    titled_table(
        &format!("Search results for '{}'", query),
        &[
            ("#", Align::Right),
            ("Pair", Align::Left),
            ("Chain", Align::Left),
            ("DEX", Align::Left),
            ("Price", Align::Right),
            ("24h", Align::Right),
            ("Liquidity", Align::Right),
            ("24h Volume", Align::Right),
            ("FDV", Align::Right),
            ("Token Address", Align::Left),
        ],
        rows,
    )
}

/// Top coins, with the change against the previous scan where one exists.
pub fn top_coins_table(coins: &[CoinMarket], previous: &BTreeMap<String, PriceSnapshot>) -> Table {
    let rows = coins
        .iter()
        .map(|coin| {
            let symbol = coin.symbol.to_uppercase();
            let since = match (previous.get(&symbol), coin.current_price) {
                (Some(last), Some(now)) => percent_change(last.price, now),
                _ => None,
            };
            vec![
                coin.market_cap_rank.map(|r| r.to_string()).unwrap_or_default(),
                coin.name.cyan().to_string(),
                symbol.magenta().to_string(),
                coin.current_price.map(format_price).unwrap_or_else(not_available),
                optional_change(coin.price_change_percentage_24h),
                optional_usd(coin.market_cap),
                optional_usd(coin.total_volume),
                optional_change(since),
            ]
        })
        .collect();
    titled_table(
        "Top Coins by Market Cap",
        &[
            ("Rank", Align::Right),
            ("Name", Align::Left),
            ("Symbol", Align::Left),
            ("Price", Align::Right),
            ("24h", Align::Right),
            ("Market Cap", Align::Right),
            ("24h Volume", Align::Right),
            ("Since Last Scan", Align::Right),
        ],
        rows,
    )
}

/// Snapshot of the current prices keyed by uppercase symbol.
pub fn price_snapshots(coins: &[CoinMarket]) -> BTreeMap<String, PriceSnapshot> {
    coins
        .iter()
        .filter_map(|c| Some((c.symbol.to_uppercase(), PriceSnapshot::now(c.current_price?))))
        .collect()
}

pub fn gas_table(estimates: &[(Chain, Option<GasOracle>)]) -> Table {
    let rows = estimates
        .iter()
        .map(|(chain, estimate)| {
            let name = chain.to_string().to_uppercase().cyan().to_string();
            match estimate {
                Some(gas) => vec![
                    name,
                    gas.safe.green().to_string(),
                    gas.propose.yellow().to_string(),
                    gas.fast.red().to_string(),
                    gas.base_fee.clone().unwrap_or_else(not_available),
                    gas.last_block.clone(),
                ],
                None => vec![name, "unavailable".red().to_string()],
            }
        })
        .collect();
    titled_table(
        "Gas Prices (Gwei)",
        &[
            ("Chain", Align::Left),
            ("Safe", Align::Right),
            ("Proposed", Align::Right),
            ("Fast", Align::Right),
            ("Base Fee", Align::Right),
            ("Last Block", Align::Right),
        ],
        rows,
    )
}

pub fn balance_panel(address: &str, chain: Chain, wei: &str, usd_price: Option<f64>) -> Table {
    let mut rows = Builder::default();
    line(&mut rows, "Address", address.green().to_string());
    line(&mut rows, "Chain", chain.explorer_name().to_string());
    let amount = scale_amount(wei, NATIVE_DECIMALS);
    let balance = match amount {
        Some(a) => format!("{} {}", format_number(a, 6), chain.native_symbol())
            .yellow()
            .to_string(),
        None => wei.to_string(),
    };
    line(&mut rows, "Balance", balance);
    if let Some(price) = usd_price {
        line(&mut rows, &format!("{} Price", chain.native_symbol()), format_usd(price));
        if let Some(a) = amount {
            line(&mut rows, "Value (USD)", format_usd(a * price).yellow().to_string());
        }
    }
    panel("Wallet Balance", rows)
}

fn direction_cell(direction: Direction) -> String {
    let label = direction.label();
    match direction {
        Direction::In => label.green().to_string(),
        Direction::Out => label.red().to_string(),
        Direction::Own | Direction::Other => label.yellow().to_string(),
    }
}

pub fn transfers_table(history: &TransferHistory) -> Table {
    let rows = history
        .records
        .iter()
        .enumerate()
        .map(|(i, t)| transfer_row(i, t, history.direction(&t.from, &t.to)))
        .collect();
    titled_table(
        &format!("Token Transfers ({} loaded)", history.len()),
        &[
            ("#", Align::Right),
            ("Time (UTC)", Align::Left),
            ("Dir", Align::Left),
            ("Token", Align::Left),
            ("Amount", Align::Right),
            ("From", Align::Left),
            ("To", Align::Left),
            ("Hash", Align::Left),
        ],
        rows,
    )
}

fn transfer_row(i: usize, t: &TokenTransfer, direction: Direction) -> Vec<String> {
    let amount = scale_amount(&t.value, &t.token_decimal)
        .map(|a| format_number(a, 4))
        .unwrap_or_else(|| t.value.clone());
    vec![
        (i + 1).to_string(),
        format_timestamp(&t.time_stamp),
        direction_cell(direction),
        t.token_symbol.magenta().to_string(),
        amount,
        short_address(&t.from),
        short_address(&t.to),
        short_address(&t.hash).blue().to_string(),
    ]
}
/// Human readable account of what a decoded call does.
pub fn describe_call(call: &DecodedCall, chain: Chain) -> String {
    let Some(details) = &call.details else {
        return String::new();
    };
    match details {
        CallDetails::Transfer { from: Some(from), to, amount } => {
            format!("{} from {} to {}", amount, short_address(from), short_address(to))
        }
        CallDetails::Transfer { from: None, to, amount } => {
            format!("{} to {}", amount, short_address(to))
        }
        CallDetails::Approve { spender, amount } => {
            format!("{} for {}", short_address(spender), amount)
        }
        CallDetails::Swap {
            amount_in,
            amount_out,
            exact_out,
            path,
            native_in,
            native_out,
            ..
        } => {
            let token = |native: bool, address: Option<&String>| {
                if native {
                    chain.native_symbol().to_string()
                } else {
                    address.map(|a| short_address(a)).unwrap_or_else(|| "?".to_string())
                }
            };
            let sell = token(*native_in, path.first());
            let buy = token(*native_out, path.last());
            let amount = |a: &Option<RawAmount>| {
                a.map(|a| format!("{} ", a)).unwrap_or_default()
            };
            let (in_word, out_word) = if *exact_out { ("max ", "") } else { ("", "min ") };
            let in_text = if amount_in.is_some() {
                format!("{}{}{}", in_word, amount(amount_in), sell)
            } else {
                sell
            };
            format!("{} -> {}{}{} ({} hops)", in_text, out_word, amount(amount_out), buy, path.len().saturating_sub(1))
        }
    }
}

/// Transactions with the function each one calls.
///
/// `calls` pairs each record, in order, with its decoded call and display label.
pub fn transactions_table(
    owner: &str,
    chain: Chain,
    transactions: &[NormalTransaction],
    calls: &[(DecodedCall, String)],
) -> Table {
    let rows = transactions
        .iter()
        .zip(calls)
        .enumerate()
        .map(|(i, (tx, (call, label)))| {
            let value = scale_amount(&tx.value, NATIVE_DECIMALS)
                .map(|v| format_number(v, 6))
                .unwrap_or_else(|| tx.value.clone());
            let function = if tx.is_error == "1" {
                format!("{} (failed)", label).red().to_string()
            } else if call.is_known() {
                label.cyan().to_string()
            } else {
                label.yellow().to_string()
            };
            vec![
                (i + 1).to_string(),
                format_timestamp(&tx.time_stamp),
                direction_cell(Direction::of(owner, &tx.from, &tx.to)),
                function,
                describe_call(call, chain),
                value,
                short_address(&tx.hash).blue().to_string(),
            ]
        })
        .collect();
    let value_header = format!("Value ({})", chain.native_symbol());
    titled_table(
        "Recent Transactions",
        &[
            ("#", Align::Right),
            ("Time (UTC)", Align::Left),
            ("Dir", Align::Left),
            ("Function", Align::Left),
            ("Details", Align::Left),
            (value_header.as_str(), Align::Right),
            ("Hash", Align::Left),
        ],
        rows,
    )
}

pub fn holders_table(holders: &[TokenHolder], decimals: &str) -> Table {
    let total: f64 = holders
        .iter()
        .filter_map(|h| scale_amount(&h.quantity, decimals))
        .sum();
    let rows = holders
        .iter()
        .enumerate()
        .map(|(i, holder)| {
            let quantity = scale_amount(&holder.quantity, decimals);
            let share = match quantity {
                Some(q) if total > 0.0 => format!("{:.2}%", q / total * 100.0),
                _ => not_available(),
            };
            vec![
                (i + 1).to_string(),
                holder.address.green().to_string(),
                quantity
                    .map(|q| format_number(q, 2))
                    .unwrap_or_else(|| holder.quantity.clone()),
                share,
            ]
        })
        .collect();
    titled_table(
        "Top Token Holders",
        &[
            ("#", Align::Right),
            ("Address", Align::Left),
            ("Quantity", Align::Right),
            ("Share of Listed", Align::Right),
        ],
        rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{apis::fixtures::pair, selectors::decode_call};

    #[test]
    fn summary_shows_change_since_last_scan() {
        colored::control::set_override(false);
        let favorite = FavoriteToken::new("Pepe", 100.0, Some(1_000_000.0));
        let text = favorite_summary("0xabc", &favorite, &pair()).to_string();
        assert!(text.contains("Summary for Pepe"));
        assert!(text.contains("+10.00%"));
        assert!(text.contains("+100.00%"));
        assert!(text.contains("Buys: 3, Sells: 4"));
    }

    #[test]
    fn volume_rows_follow_timeframe_order() {
        colored::control::set_override(false);
        let text = volume_table(&pair()).to_string();
        let m5 = text.find("5m").unwrap();
        let h24 = text.find("24h").unwrap();
        assert!(m5 < h24);
    }

    #[test]
    fn snapshots_and_comparison() {
        colored::control::set_override(false);
        let coins = vec![CoinMarket {
            id: "bitcoin".to_string(),
            symbol: "btc".to_string(),
            name: "Bitcoin".to_string(),
            current_price: Some(110.0),
            market_cap: Some(1e12),
            market_cap_rank: Some(1),
            fully_diluted_valuation: None,
            total_volume: None,
            price_change_percentage_24h: Some(1.0),
        }];
        let snapshots = price_snapshots(&coins);
        assert_eq!(snapshots["BTC"].price, 110.0);

        let mut previous = BTreeMap::new();
        previous.insert("BTC".to_string(), PriceSnapshot::now(100.0));
        let text = top_coins_table(&coins, &previous).to_string();
        assert!(text.contains("+10.00%"));
        assert!(text.contains("$1,000,000,000,000.00"));
    }

    #[test]
    fn describes_transfer_call() {
        let input = format!(
            "0xa9059cbb{:0>64}{:064x}",
            "1111111111111111111111111111111111111111", 42u8
        );
        let call = decode_call(&input);
        assert_eq!(describe_call(&call, Chain::Eth), "42 to 0x1111...1111");
        assert_eq!(describe_call(&decode_call("0x12345678"), Chain::Eth), "");
    }

    #[test]
    fn holder_shares() {
        colored::control::set_override(false);
        let holders = vec![
            TokenHolder {
                address: "0x1".to_string(),
                quantity: "3000000".to_string(),
            },
            TokenHolder {
                address: "0x2".to_string(),
                quantity: "1000000".to_string(),
            },
        ];
        let text = holders_table(&holders, "6").to_string();
        assert!(text.contains("75.00%"));
        assert!(text.contains("3.00"));
    }
}
