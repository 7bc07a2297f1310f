//! Recognises a handful of common token and router calls from raw call data.
//!
//! Only the fixed argument layouts in [`SELECTORS`] are understood. Anything
//! else is reported as [`UNKNOWN_FUNCTION`] rather than guessed at.
use std::fmt::Display;

/// Name reported for selectors not present in the table.
pub const UNKNOWN_FUNCTION: &str = "Unknown Function";
/// Name reported for calls without data, i.e. plain value transfers.
pub const NATIVE_TRANSFER: &str = "Native Transfer";

const WORD: usize = 32;

/// Where the arguments of a known function sit, by 32-byte word index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Transfer {
        from: Option<usize>,
        to: usize,
        amount: usize,
    },
    Approve {
        spender: usize,
        amount: usize,
    },
    Swap {
        amount_in: Option<usize>,
        amount_out: Option<usize>,
        /// Word holding the byte offset of the `address[]` path.
        path: usize,
        to: usize,
        /// The exact side is the output (`swap...ForExact...`).
        exact_out: bool,
        native_in: bool,
        native_out: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub selector: [u8; 4],
    pub name: &'static str,
    pub layout: Layout,
}

const fn swap(
    amount_in: Option<usize>,
    amount_out: Option<usize>,
    path: usize,
    to: usize,
    exact_out: bool,
    native_in: bool,
    native_out: bool,
) -> Layout {
    Layout::Swap {
        amount_in,
        amount_out,
        path,
        to,
        exact_out,
        native_in,
        native_out,
    }
}

/// Known selectors: ERC-20 calls and the Uniswap V2 style router swaps.
pub const SELECTORS: &[Descriptor] = &[
    Descriptor {
        selector: [0xa9, 0x05, 0x9c, 0xbb],
        name: "transfer",
        layout: Layout::Transfer { from: None, to: 0, amount: 1 },
    },
    Descriptor {
        selector: [0x23, 0xb8, 0x72, 0xdd],
        name: "transferFrom",
        layout: Layout::Transfer { from: Some(0), to: 1, amount: 2 },
    },
    Descriptor {
        selector: [0x09, 0x5e, 0xa7, 0xb3],
        name: "approve",
        layout: Layout::Approve { spender: 0, amount: 1 },
    },
    Descriptor {
        selector: [0x38, 0xed, 0x17, 0x39],
        name: "swapExactTokensForTokens",
        layout: swap(Some(0), Some(1), 2, 3, false, false, false),
    },
    Descriptor {
        selector: [0x5c, 0x11, 0xd7, 0x95],
        name: "swapExactTokensForTokensSupportingFeeOnTransferTokens",
        layout: swap(Some(0), Some(1), 2, 3, false, false, false),
    },
    Descriptor {
        selector: [0x88, 0x03, 0xdb, 0xee],
        name: "swapTokensForExactTokens",
        layout: swap(Some(1), Some(0), 2, 3, true, false, false),
    },
    Descriptor {
        selector: [0x7f, 0xf3, 0x6a, 0xb5],
        name: "swapExactETHForTokens",
        layout: swap(None, Some(0), 1, 2, false, true, false),
    },
    Descriptor {
        selector: [0xb6, 0xf9, 0xde, 0x95],
        name: "swapExactETHForTokensSupportingFeeOnTransferTokens",
        layout: swap(None, Some(0), 1, 2, false, true, false),
    },
    Descriptor {
        selector: [0xfb, 0x3b, 0xdb, 0x41],
        name: "swapETHForExactTokens",
        layout: swap(None, Some(0), 1, 2, true, true, false),
    },
    Descriptor {
        selector: [0x18, 0xcb, 0xaf, 0xe5],
        name: "swapExactTokensForETH",
        layout: swap(Some(0), Some(1), 2, 3, false, false, true),
    },
    Descriptor {
        selector: [0x79, 0x1a, 0xc9, 0x47],
        name: "swapExactTokensForETHSupportingFeeOnTransferTokens",
        layout: swap(Some(0), Some(1), 2, 3, false, false, true),
    },
    Descriptor {
        selector: [0x4a, 0x25, 0xd9, 0x4a],
        name: "swapTokensForExactETH",
        layout: swap(Some(1), Some(0), 2, 3, true, false, true),
    },
];

/// Finds the descriptor for a 4-byte selector.
pub fn lookup(selector: [u8; 4]) -> Option<&'static Descriptor> {
    SELECTORS.iter().find(|d| d.selector == selector)
}

/// An unsigned 256-bit argument, kept as its big-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAmount([u8; WORD]);

impl RawAmount {
    /// Exact value if it fits in 128 bits.
    pub fn as_u128(&self) -> Option<u128> {
        if self.0[..16].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&self.0[16..]);
        Some(u128::from_be_bytes(low))
    }
    /// Approximate value, for display.
    pub fn as_f64(&self) -> f64 {
        self.0.iter().fold(0.0, |acc, b| acc * 256.0 + f64::from(*b))
    }
    /// All bits set, the conventional "unlimited" approval.
    pub fn is_max(&self) -> bool {
        self.0.iter().all(|b| *b == 0xff)
    }
}

impl Display for RawAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_max() {
            return write!(f, "unlimited");
        }
        match self.as_u128() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "{:e}", self.as_f64()),
        }
    }
}

/// What a recognised call does, with its arguments pulled out.
#[derive(Debug, Clone, PartialEq)]
pub enum CallDetails {
    Transfer {
        from: Option<String>,
        to: String,
        amount: RawAmount,
    },
    Approve {
        spender: String,
        amount: RawAmount,
    },
    Swap {
        amount_in: Option<RawAmount>,
        amount_out: Option<RawAmount>,
        exact_out: bool,
        path: Vec<String>,
        to: String,
        native_in: bool,
        native_out: bool,
    },
}

/// Result of matching call data against the selector table.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    /// "0x" and 8 hex characters, or empty when there was no selector.
    pub selector: String,
    pub name: &'static str,
    /// `None` for unknown functions and for data that does not fit the layout.
    pub details: Option<CallDetails>,
}

impl DecodedCall {
    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN_FUNCTION
    }
}

/// Decodes transaction input, e.g. "0xa9059cbb000...".
///
/// Never panics: short or non-hex data yields the matched name without
/// details, or [`UNKNOWN_FUNCTION`] if the selector itself is unreadable.
pub fn decode_call(input: &str) -> DecodedCall {
    let data = input.trim().trim_start_matches("0x");
    if data.is_empty() {
        return DecodedCall {
            selector: String::new(),
            name: NATIVE_TRANSFER,
            details: None,
        };
    }
    let unknown = |selector: String| DecodedCall {
        selector,
        name: UNKNOWN_FUNCTION,
        details: None,
    };
    let Some(head) = data.get(..8) else {
        return unknown(String::new());
    };
    let mut selector = [0u8; 4];
    if hex::decode_to_slice(head, &mut selector).is_err() {
        return unknown(String::new());
    }
    let selector_text = format!("0x{}", hex::encode(selector));
    let Some(descriptor) = lookup(selector) else {
        return unknown(selector_text);
    };
    let details = hex::decode(&data[8..])
        .ok()
        .and_then(|args| interpret(&descriptor.layout, &args));
    DecodedCall {
        selector: selector_text,
        name: descriptor.name,
        details,
    }
}

fn interpret(layout: &Layout, args: &[u8]) -> Option<CallDetails> {
    let details = match *layout {
        Layout::Transfer { from, to, amount } => CallDetails::Transfer {
            from: match from {
                Some(i) => Some(address_at(args, i)?),
                None => None,
            },
            to: address_at(args, to)?,
            amount: amount_at(args, amount)?,
        },
        Layout::Approve { spender, amount } => CallDetails::Approve {
            spender: address_at(args, spender)?,
            amount: amount_at(args, amount)?,
        },
        Layout::Swap {
            amount_in,
            amount_out,
            path,
            to,
            exact_out,
            native_in,
            native_out,
        } => CallDetails::Swap {
            amount_in: match amount_in {
                Some(i) => Some(amount_at(args, i)?),
                None => None,
            },
            amount_out: match amount_out {
                Some(i) => Some(amount_at(args, i)?),
                None => None,
            },
            exact_out,
            path: address_array_at(args, path)?,
            to: address_at(args, to)?,
            native_in,
            native_out,
        },
    };
    Some(details)
}

fn word(args: &[u8], index: usize) -> Option<&[u8]> {
    let start = index.checked_mul(WORD)?;
    args.get(start..start.checked_add(WORD)?)
}

fn amount_at(args: &[u8], index: usize) -> Option<RawAmount> {
    let mut bytes = [0u8; WORD];
    bytes.copy_from_slice(word(args, index)?);
    Some(RawAmount(bytes))
}

fn address_at(args: &[u8], index: usize) -> Option<String> {
    let w = word(args, index)?;
    Some(format!("0x{}", hex::encode(&w[12..])))
}

/// Small unsigned integer (offset or length) held in a word.
fn usize_at(args: &[u8], index: usize) -> Option<usize> {
    let value = amount_at(args, index)?.as_u128()?;
    usize::try_from(value).ok()
}

/// Follows the head offset of a dynamic `address[]` argument.
fn address_array_at(args: &[u8], index: usize) -> Option<Vec<String>> {
    let offset = usize_at(args, index)?;
    if offset % WORD != 0 {
        return None;
    }
    let len_index = offset / WORD;
    let len = usize_at(args, len_index)?;
    // Bounds check before allocating for a hostile length.
    word(args, len_index.checked_add(len)?)?;
    (1..=len).map(|i| address_at(args, len_index + i)).collect()
}
