use std::collections::BTreeMap;

use fabula_config::ModelPrice;
use fabula_utils::types::Usage;
use tracing::debug;

/// USD prices per model, used to attribute cost to each gateway call.
///
/// Lookups match the exact model id first, then the longest configured
/// prefix, so dated ids such as `claude-sonnet-4-5-20250929` price like
/// their family. Unknown models cost zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let text = |input: f64, output: f64| ModelPrice {
            input_per_mtok: input,
            output_per_mtok: output,
            per_image: 0.0,
        };
        let image = |per_image: f64| ModelPrice {
            per_image,
            ..ModelPrice::default()
        };

        let prices = [
            ("claude-opus-4-1", text(15.0, 75.0)),
            ("claude-sonnet-4-5", text(3.0, 15.0)),
            ("claude-haiku-4-5", text(1.0, 5.0)),
            ("openai/gpt-5", text(1.25, 10.0)),
            ("gpt-image-1", image(0.04)),
            ("black-forest-labs/FLUX.1-schnell", image(0.003)),
        ]
        .into_iter()
        .map(|(model, price)| (model.to_string(), price))
        .collect();

        Self { prices }
    }
}

impl PricingTable {
    /// Built-in prices with `overrides` layered on top.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, ModelPrice>) -> Self {
        let mut table = Self::default();
        for (model, price) in overrides {
            table.prices.insert(model.clone(), *price);
        }
        table
    }

    #[must_use]
    pub fn price_for(&self, model: &str) -> Option<&ModelPrice> {
        if let Some(price) = self.prices.get(model) {
            return Some(price);
        }
        self.prices
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, price)| price)
    }

    #[must_use]
    pub fn text_cost(&self, model: &str, usage: &Usage) -> f64 {
        let Some(price) = self.price_for(model) else {
            debug!(model, "No price configured; recording zero cost");
            return 0.0;
        };
        (usage.input_tokens as f64 * price.input_per_mtok
            + usage.output_tokens as f64 * price.output_per_mtok)
            / 1_000_000.0
    }

    #[must_use]
    pub fn image_cost(&self, model: &str) -> f64 {
        match self.price_for(model) {
            Some(price) => price.per_image,
            None => {
                debug!(model, "No image price configured; recording zero cost");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> Usage {
        Usage {
            input_tokens: input,
            output_tokens: output,
            ..Usage::default()
        }
    }

    #[test]
    fn test_text_cost_per_million() {
        let table = PricingTable::default();
        let cost = table.text_cost("claude-sonnet-4-5", &usage(1_000_000, 100_000));
        assert!((cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_dated_model_uses_family_price() {
        let table = PricingTable::default();
        let dated = table.text_cost("claude-haiku-4-5-20251001", &usage(1_000_000, 0));
        assert!((dated - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PricingTable::default();
        assert_eq!(table.text_cost("mystery", &usage(10, 10)), 0.0);
        assert_eq!(table.image_cost("mystery"), 0.0);
    }

    #[test]
    fn test_overrides_replace_builtins() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "gpt-image-1".to_string(),
            ModelPrice {
                per_image: 0.5,
                ..ModelPrice::default()
            },
        );
        let table = PricingTable::with_overrides(&overrides);
        assert!((table.image_cost("gpt-image-1") - 0.5).abs() < 1e-9);
    }
}
