//! Per-model token pricing used to estimate spend.

/// USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

const fn price(input_per_1k: f64, output_per_1k: f64) -> ModelPrice {
    ModelPrice {
        input_per_1k,
        output_per_1k,
    }
}

/// Known model prefixes. Lookup picks the longest matching prefix, so
/// `gpt-4o-mini-2024-07-18` resolves to `gpt-4o-mini`, not `gpt-4`.
const PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4", price(0.03, 0.06)),
    ("gpt-4-turbo", price(0.01, 0.03)),
    ("gpt-4o", price(0.005, 0.015)),
    ("gpt-4o-mini", price(0.00015, 0.0006)),
    ("gpt-3.5-turbo", price(0.0005, 0.0015)),
    ("text-embedding-3-small", price(0.00002, 0.0)),
    ("text-embedding-3-large", price(0.00013, 0.0)),
    ("text-embedding-ada-002", price(0.0001, 0.0)),
];

/// Unknown models are priced like gpt-4o so spend is never underestimated badly.
const UNKNOWN_MODEL_PRICE: ModelPrice = price(0.005, 0.015);

pub fn price_for(model: &str) -> ModelPrice {
    PRICES
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, p)| *p)
        .unwrap_or(UNKNOWN_MODEL_PRICE)
}

/// Estimated cost in USD for one call.
pub fn estimate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let p = price_for(model);
    (prompt_tokens as f64 / 1000.0) * p.input_per_1k
        + (completion_tokens as f64 / 1000.0) * p.output_per_1k
}
