use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub min_amount: Decimal,
    pub network: Option<String>,
    pub icon: Option<String>,
    pub exchange_rate: Decimal,
    pub is_active: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Seed row for a supported currency.
#[derive(Debug, Clone, Copy)]
pub struct CurrencySpec {
    pub code: &'static str,
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u32,
    /// Minimum transferable amount, as (mantissa, scale).
    pub min_amount: (i64, u32),
    pub network: &'static str,
    pub icon: &'static str,
    pub display_name: Option<&'static str>,
    /// USD per unit used when no live rate is available, as (mantissa, scale).
    pub fallback_rate: (i64, u32),
}

impl CurrencySpec {
    pub fn min_amount(&self) -> Decimal {
        Decimal::new(self.min_amount.0, self.min_amount.1)
    }

    pub fn fallback_rate(&self) -> Decimal {
        Decimal::new(self.fallback_rate.0, self.fallback_rate.1)
    }

    pub fn to_currency(&self) -> Currency {
        Currency {
            code: self.code.to_string(),
            name: self.name.to_string(),
            symbol: self.symbol.to_string(),
            decimals: self.decimals,
            min_amount: self.min_amount(),
            network: Some(self.network.to_string()),
            icon: Some(self.icon.to_string()),
            exchange_rate: self.fallback_rate(),
            is_active: true,
            last_updated: None,
        }
    }
}

pub const SUPPORTED_CURRENCIES: &[CurrencySpec] = &[
    CurrencySpec {
        code: "USDT",
        name: "Tether",
        symbol: "USDT",
        decimals: 6,
        min_amount: (10, 1),
        network: "TRC20",
        icon: "₮",
        display_name: None,
        fallback_rate: (100, 2),
    },
    CurrencySpec {
        code: "USDT_BEP20",
        name: "Tether (BEP20)",
        symbol: "USDT",
        decimals: 18,
        min_amount: (10, 1),
        network: "BEP20",
        icon: "₮",
        display_name: Some("USDT (BEP20)"),
        fallback_rate: (100, 2),
    },
    CurrencySpec {
        code: "BTC",
        name: "Bitcoin",
        symbol: "BTC",
        decimals: 8,
        min_amount: (1, 4),
        network: "Bitcoin",
        icon: "₿",
        display_name: None,
        fallback_rate: (45000, 0),
    },
    CurrencySpec {
        code: "ETH",
        name: "Ethereum",
        symbol: "ETH",
        decimals: 18,
        min_amount: (1, 3),
        network: "ERC20",
        icon: "Ξ",
        display_name: None,
        fallback_rate: (2500, 0),
    },
    CurrencySpec {
        code: "BCH",
        name: "Bitcoin Cash",
        symbol: "BCH",
        decimals: 8,
        min_amount: (1, 3),
        network: "Bitcoin Cash",
        icon: "₿",
        display_name: None,
        fallback_rate: (300, 0),
    },
    CurrencySpec {
        code: "TRX",
        name: "TRON",
        symbol: "TRX",
        decimals: 6,
        min_amount: (100, 1),
        network: "TRON",
        icon: "⚡",
        display_name: None,
        fallback_rate: (6, 2),
    },
    CurrencySpec {
        code: "XMR",
        name: "Monero",
        symbol: "XMR",
        decimals: 12,
        min_amount: (1, 2),
        network: "Monero",
        icon: "ɱ",
        display_name: None,
        fallback_rate: (150, 0),
    },
    CurrencySpec {
        code: "DASH",
        name: "Dash",
        symbol: "DASH",
        decimals: 8,
        min_amount: (1, 2),
        network: "Dash",
        icon: "Đ",
        display_name: None,
        fallback_rate: (40, 0),
    },
    CurrencySpec {
        code: "ZEC",
        name: "Zcash",
        symbol: "ZEC",
        decimals: 8,
        min_amount: (1, 2),
        network: "Zcash",
        icon: "ⓩ",
        display_name: None,
        fallback_rate: (30, 0),
    },
];

pub fn spec_for(code: &str) -> Option<&'static CurrencySpec> {
    SUPPORTED_CURRENCIES.iter().find(|c| c.code == code)
}

/// Static USD rate for `code`, `1.00` when the code is unknown.
pub fn fallback_rate(code: &str) -> Decimal {
    spec_for(code)
        .map(CurrencySpec::fallback_rate)
        .unwrap_or(Decimal::ONE)
}

static BTC_LEGACY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[13][a-km-zA-HJ-NP-Z1-9]{25,34}$").unwrap());
static BTC_BECH32: Lazy<Regex> = Lazy::new(|| Regex::new(r"^bc1[a-z0-9]{39,59}$").unwrap());
static EVM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").unwrap());
static TRON: Lazy<Regex> = Lazy::new(|| Regex::new(r"^T[A-Za-z1-9]{33}$").unwrap());
static MONERO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[48][0-9AB][1-9A-HJ-NP-Za-km-z]{93}$").unwrap());
static DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^X[1-9A-HJ-NP-Za-km-z]{33}$").unwrap());
static ZEC_TRANSPARENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^t1[0-9a-zA-Z]{33}$").unwrap());
static ZEC_SAPLING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^zs1[0-9a-z]{75}$").unwrap());

pub fn validate_address(address: &str, code: &str) -> bool {
    match code {
        "BTC" | "BCH" => BTC_LEGACY.is_match(address) || BTC_BECH32.is_match(address),
        "ETH" | "USDT" | "USDT_BEP20" => EVM.is_match(address),
        "TRX" => TRON.is_match(address),
        "XMR" => MONERO.is_match(address),
        "DASH" => DASH.is_match(address),
        "ZEC" => ZEC_TRANSPARENT.is_match(address) || ZEC_SAPLING.is_match(address),
        _ => address.chars().count() >= 20,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bech32_length_bounds() {
        let ok = format!("bc1{}", "q".repeat(39));
        let short = format!("bc1{}", "q".repeat(38));
        let long = format!("bc1{}", "q".repeat(60));
        assert!(validate_address(&ok, "BTC"));
        assert!(!validate_address(&short, "BTC"));
        assert!(!validate_address(&long, "BTC"));
    }

    #[test]
    fn legacy_bitcoin_and_evm() {
        assert!(validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", "BTC"));
        assert!(!validate_address("0A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", "BTC"));
        let evm = format!("0x{}", "aB3".repeat(13) + "f");
        assert!(validate_address(&evm, "ETH"));
        assert!(validate_address(&evm, "USDT_BEP20"));
        assert!(!validate_address(&evm[..41], "ETH"));
    }

    #[test]
    fn tron_dash_zcash_monero() {
        assert!(validate_address(&format!("T{}", "a".repeat(33)), "TRX"));
        assert!(!validate_address(&format!("T{}", "0".repeat(33)), "TRX"));
        assert!(validate_address(&format!("X{}", "b".repeat(33)), "DASH"));
        assert!(validate_address(&format!("t1{}", "Z".repeat(33)), "ZEC"));
        assert!(validate_address(&format!("zs1{}", "q".repeat(75)), "ZEC"));
        assert!(validate_address(&format!("4A{}", "a".repeat(93)), "XMR"));
        assert!(!validate_address(&format!("5A{}", "a".repeat(93)), "XMR"));
    }

    #[test]
    fn unknown_codes_use_length_heuristic() {
        assert!(validate_address("abcdefghijklmnopqrst", "DOGE"));
        assert!(!validate_address("abcdefghijklmnopqrs", "DOGE"));
    }

    #[test]
    fn fallback_rates_cover_static_table() {
        assert_eq!(fallback_rate("BTC"), Decimal::from(45000));
        assert_eq!(fallback_rate("TRX"), Decimal::new(6, 2));
        assert_eq!(fallback_rate("NOPE"), Decimal::ONE);
        assert!(SUPPORTED_CURRENCIES.iter().all(|c| c.fallback_rate() > Decimal::ZERO));
    }
}
