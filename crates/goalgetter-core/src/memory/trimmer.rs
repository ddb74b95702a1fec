//! Budgeted context trimming.
//!
//! The trimmer picks a token budget from the raw message count and then keeps
//! the longest suffix of the history that fits it. A kept suffix always starts
//! on a user message and ends on a user or tool message, so the reasoning step
//! never sees half of an exchange. When no such suffix fits, the most recent
//! user message is kept anyway and the selection is flagged as over budget.

use crate::config::TrimmingConfig;
use crate::core_types::{Message, Role};
use crate::memory::tokens::estimate_message;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimTier {
    /// At or below the low watermark; nothing is trimmed.
    None,
    Light,
    Moderate,
    Heavy,
}

/// Suffix chosen by [`select_suffix`]. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
    pub tokens: usize,
    pub over_budget: bool,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

#[derive(Debug, Clone)]
pub struct TrimOutcome {
    pub messages: Vec<Message>,
    pub tier: TrimTier,
    pub budget: Option<usize>,
    pub over_budget: bool,
}

/// Selects the longest suffix of `messages` whose estimated size fits `budget`
/// while starting on a user message and ending on a user or tool message.
///
/// Returns `None` when the history holds no user message before its last user
/// or tool message, i.e. there is no valid suffix at all.
pub fn select_suffix(messages: &[Message], budget: usize) -> Option<Selection> {
    let last = messages
        .iter()
        .rposition(|m| matches!(m.role, Role::User | Role::Tool))?;

    let costs: Vec<usize> = messages[..=last].iter().map(estimate_message).collect();

    // Earliest index whose suffix up to `last` fits the budget.
    let mut fits_from = last + 1;
    let mut running = 0usize;
    for idx in (0..=last).rev() {
        if running + costs[idx] > budget {
            break;
        }
        running += costs[idx];
        fits_from = idx;
    }

    let sum = |start: usize| costs[start..=last].iter().sum::<usize>();

    if let Some(start) = (fits_from..=last).find(|&i| messages[i].role == Role::User) {
        return Some(Selection {
            start,
            end: last + 1,
            tokens: sum(start),
            over_budget: false,
        });
    }

    let start = messages[..=last].iter().rposition(|m| m.role == Role::User)?;
    Some(Selection {
        start,
        end: last + 1,
        tokens: sum(start),
        over_budget: true,
    })
}

#[derive(Debug, Clone)]
pub struct ContextTrimmer {
    policy: TrimmingConfig,
}

impl ContextTrimmer {
    pub fn new(policy: TrimmingConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TrimmingConfig {
        &self.policy
    }

    pub fn tier_for(&self, message_count: usize) -> TrimTier {
        if message_count <= self.policy.low_watermark {
            TrimTier::None
        } else if message_count <= self.policy.mid_watermark {
            TrimTier::Light
        } else if message_count <= self.policy.high_watermark {
            TrimTier::Moderate
        } else {
            TrimTier::Heavy
        }
    }

    pub fn budget_for(&self, message_count: usize) -> Option<usize> {
        match self.tier_for(message_count) {
            TrimTier::None => None,
            TrimTier::Light => Some(self.policy.light_budget),
            TrimTier::Moderate => Some(self.policy.moderate_budget),
            TrimTier::Heavy => Some(self.policy.heavy_budget),
        }
    }

    pub fn trim(&self, messages: &[Message], message_count: usize) -> Vec<Message> {
        self.trim_with_outcome(messages, message_count).messages
    }

    pub fn trim_with_outcome(&self, messages: &[Message], message_count: usize) -> TrimOutcome {
        let tier = self.tier_for(message_count);
        let budget = match self.budget_for(message_count) {
            Some(budget) => budget,
            None => {
                return TrimOutcome {
                    messages: messages.to_vec(),
                    tier,
                    budget: None,
                    over_budget: false,
                }
            }
        };

        match select_suffix(messages, budget) {
            Some(selection) => {
                if selection.over_budget {
                    log::warn!(
                        "No suffix fits the {} token budget; keeping the latest user turn ({} messages, ~{} tokens)",
                        budget,
                        selection.len(),
                        selection.tokens
                    );
                } else {
                    log::info!(
                        "Trimmed history from {} to {} messages (~{} of {} tokens, tier {:?})",
                        messages.len(),
                        selection.len(),
                        selection.tokens,
                        budget,
                        tier
                    );
                }
                TrimOutcome {
                    messages: messages[selection.start..selection.end].to_vec(),
                    tier,
                    budget: Some(budget),
                    over_budget: selection.over_budget,
                }
            }
            None => {
                log::warn!(
                    "History of {} messages has no user turn to anchor on; forwarding nothing",
                    messages.len()
                );
                TrimOutcome {
                    messages: Vec::new(),
                    tier,
                    budget: Some(budget),
                    over_budget: false,
                }
            }
        }
    }
}

impl Default for ContextTrimmer {
    fn default() -> Self {
        Self::new(TrimmingConfig::default())
    }
}
