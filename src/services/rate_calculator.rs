//! Tax and shipping quotes. Pure and deterministic: the cart page and order
//! creation call the same function and must get identical numbers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const BPS_SCALE: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaxRule {
    pub country: String,
    /// `None` matches every region of the country.
    pub region: Option<String>,
    pub postal_prefix: Option<String>,
    /// Rate in basis points (725 = 7.25%).
    pub rate_bps: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingRule {
    /// `None` is the catch-all rule.
    pub country: Option<String>,
    pub region: Option<String>,
    pub base_cents: i64,
    pub per_item_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateTable {
    pub tax_rules: Vec<TaxRule>,
    pub shipping_rules: Vec<ShippingRule>,
    pub free_shipping_threshold_cents: Option<i64>,
    /// Currencies whose prices already include tax.
    #[serde(default)]
    pub tax_inclusive_currencies: Vec<String>,
}

impl Default for RateTable {
    fn default() -> Self {
        let tax = |country: &str, region: Option<&str>, rate_bps| TaxRule {
            country: country.to_string(),
            region: region.map(str::to_string),
            postal_prefix: None,
            rate_bps,
        };
        Self {
            tax_rules: vec![
                tax("US", Some("CA"), 725),
                tax("US", Some("NY"), 400),
                tax("US", Some("TX"), 625),
                tax("GB", None, 2000),
                tax("DE", None, 1900),
            ],
            shipping_rules: vec![
                ShippingRule {
                    country: Some("US".to_string()),
                    region: None,
                    base_cents: 599,
                    per_item_cents: 100,
                },
                ShippingRule {
                    country: None,
                    region: None,
                    base_cents: 1999,
                    per_item_cents: 300,
                },
            ],
            free_shipping_threshold_cents: Some(7500),
            tax_inclusive_currencies: vec!["gbp".to_string(), "eur".to_string()],
        }
    }
}

impl RateTable {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                let table = Self::from_json(&raw)?;
                tracing::info!(path, tax_rules = table.tax_rules.len(), "rate table loaded");
                Ok(table)
            }
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Destination {
    pub country: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateInput<'a> {
    pub subtotal_cents: i64,
    pub item_count: i64,
    pub destination: &'a Destination,
    pub currency: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RateBreakdown {
    pub tax_rate_bps: i64,
    pub tax_inclusive: bool,
    /// Tax already contained in the subtotal (tax-inclusive currencies only).
    pub included_tax_cents: i64,
    pub shipping_base_cents: i64,
    pub shipping_per_item_cents: i64,
    pub item_count: i64,
    pub free_shipping_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RateQuote {
    /// Tax added on top of the subtotal. Zero for tax-inclusive currencies.
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub breakdown: RateBreakdown,
}

pub fn quote(table: &RateTable, input: &RateInput<'_>) -> RateQuote {
    let dest = input.destination;
    let subtotal = input.subtotal_cents.max(0);
    let item_count = input.item_count.max(0);

    let rate_bps = table
        .tax_rules
        .iter()
        .find(|rule| tax_rule_matches(rule, dest))
        .map(|rule| rule.rate_bps)
        .unwrap_or(0);

    let tax_inclusive = table
        .tax_inclusive_currencies
        .iter()
        .any(|c| c.eq_ignore_ascii_case(input.currency));

    let (tax_cents, included_tax_cents) = if tax_inclusive {
        let net = div_round_half_up(subtotal * BPS_SCALE, BPS_SCALE + rate_bps);
        (0, subtotal - net)
    } else {
        (div_round_half_up(subtotal * rate_bps, BPS_SCALE), 0)
    };

    let shipping_rule = table
        .shipping_rules
        .iter()
        .find(|rule| shipping_rule_matches(rule, dest));
    let (base, per_item) = shipping_rule
        .map(|r| (r.base_cents, r.per_item_cents))
        .unwrap_or((0, 0));
    let free_shipping_applied = table
        .free_shipping_threshold_cents
        .is_some_and(|threshold| subtotal >= threshold);
    let shipping_cents = if free_shipping_applied {
        0
    } else {
        base + per_item * item_count
    };

    RateQuote {
        tax_cents,
        shipping_cents,
        breakdown: RateBreakdown {
            tax_rate_bps: rate_bps,
            tax_inclusive,
            included_tax_cents,
            shipping_base_cents: base,
            shipping_per_item_cents: per_item,
            item_count,
            free_shipping_applied,
        },
    }
}

fn tax_rule_matches(rule: &TaxRule, dest: &Destination) -> bool {
    rule.country.eq_ignore_ascii_case(&dest.country)
        && optional_matches(rule.region.as_deref(), dest.region.as_deref())
        && match (&rule.postal_prefix, &dest.postal_code) {
            (None, _) => true,
            (Some(prefix), Some(postal)) => postal.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
}

fn shipping_rule_matches(rule: &ShippingRule, dest: &Destination) -> bool {
    optional_matches(rule.country.as_deref(), Some(&dest.country))
        && optional_matches(rule.region.as_deref(), dest.region.as_deref())
}

fn optional_matches(rule: Option<&str>, actual: Option<&str>) -> bool {
    match (rule, actual) {
        (None, _) => true,
        (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
        (Some(_), None) => false,
    }
}

/// Integer division rounding halves away from zero; inputs are non-negative.
fn div_round_half_up(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator / 2) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_ca() -> Destination {
        Destination {
            country: "US".into(),
            region: Some("CA".into()),
            postal_code: Some("94105".into()),
        }
    }

    #[test]
    fn california_scenario_matches_expected_totals() {
        let table = RateTable::default();
        let dest = us_ca();
        let quote = quote(
            &table,
            &RateInput {
                subtotal_cents: 1200,
                item_count: 2,
                destination: &dest,
                currency: "usd",
            },
        );

        assert_eq!(quote.tax_cents, 87);
        assert_eq!(quote.shipping_cents, 799);
        assert_eq!(1200 + quote.tax_cents + quote.shipping_cents, 2086);
        assert!(!quote.breakdown.free_shipping_applied);
    }

    #[test]
    fn identical_inputs_give_identical_quotes() {
        let table = RateTable::default();
        let dest = us_ca();
        let input = RateInput {
            subtotal_cents: 4321,
            item_count: 3,
            destination: &dest,
            currency: "usd",
        };
        let first = serde_json::to_vec(&quote(&table, &input)).unwrap();
        let second = serde_json::to_vec(&quote(&table, &input)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn free_shipping_kicks_in_at_threshold() {
        let table = RateTable::default();
        let dest = us_ca();
        let quote = quote(
            &table,
            &RateInput {
                subtotal_cents: 7500,
                item_count: 5,
                destination: &dest,
                currency: "usd",
            },
        );
        assert_eq!(quote.shipping_cents, 0);
        assert!(quote.breakdown.free_shipping_applied);
    }

    #[test]
    fn region_without_rule_falls_back_to_zero_tax() {
        let table = RateTable::default();
        let dest = Destination {
            country: "US".into(),
            region: Some("OR".into()),
            postal_code: None,
        };
        let quote = quote(
            &table,
            &RateInput {
                subtotal_cents: 1000,
                item_count: 1,
                destination: &dest,
                currency: "usd",
            },
        );
        assert_eq!(quote.tax_cents, 0);
        assert_eq!(quote.shipping_cents, 699);
    }

    #[test]
    fn tax_inclusive_currency_backs_tax_out_of_subtotal() {
        let table = RateTable::default();
        let dest = Destination {
            country: "GB".into(),
            region: None,
            postal_code: None,
        };
        let quote = quote(
            &table,
            &RateInput {
                subtotal_cents: 1200,
                item_count: 1,
                destination: &dest,
                currency: "GBP",
            },
        );
        // 1200 / 1.2 = 1000 net, 200 of it is tax.
        assert_eq!(quote.tax_cents, 0);
        assert!(quote.breakdown.tax_inclusive);
        assert_eq!(quote.breakdown.included_tax_cents, 200);
        assert_eq!(quote.shipping_cents, 1999 + 300);
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut table = RateTable::default();
        table.tax_rules.insert(
            0,
            TaxRule {
                country: "US".into(),
                region: Some("CA".into()),
                postal_prefix: Some("941".into()),
                rate_bps: 863,
            },
        );
        let dest = us_ca();
        let quote = quote(
            &table,
            &RateInput {
                subtotal_cents: 10000,
                item_count: 1,
                destination: &dest,
                currency: "usd",
            },
        );
        assert_eq!(quote.breakdown.tax_rate_bps, 863);
        assert_eq!(quote.tax_cents, 863);
    }
}
