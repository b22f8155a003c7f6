use crate::{
    config::PricingConfig,
    error::{LedgerError, LedgerResult},
    models::orders::ActionDescriptor,
};

/// Turns an order description into a credit cost
#[derive(Debug, Clone)]
pub struct Pricing {
    config: PricingConfig,
}

impl Pricing {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn quote(&self, descriptor: &ActionDescriptor) -> LedgerResult<i64> {
        let cost = match descriptor {
            ActionDescriptor::HumanProduction { script, .. } => {
                let words = script.split_whitespace().count() as i64;
                if words == 0 {
                    return Err(LedgerError::InvalidOrder("script is empty".to_string()));
                }
                let wpm = i64::from(self.config.words_per_minute.max(1));
                div_ceil(words, wpm) * self.config.human_credits_per_minute
            }
            ActionDescriptor::AiSynthesis { text, .. } => {
                let chars = text.trim().chars().count() as i64;
                if chars == 0 {
                    return Err(LedgerError::InvalidOrder("text is empty".to_string()));
                }
                div_ceil(chars, 1_000) * self.config.ai_credits_per_thousand_chars
            }
        };

        Ok(cost.max(self.config.minimum_order_credits))
    }
}

fn div_ceil(value: i64, divisor: i64) -> i64 {
    (value + divisor - 1) / divisor
}
