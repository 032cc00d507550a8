// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Markdown body of the weekly announcement post.

use crate::{db::TimeRecord, ledger::Asset, shares::RewardEntry};

const DEFAULT_TEMPLATE: &str = include_str!("../templates/post.md");
const NO_TIME_WINNERS: &str = "| No winners this week! |||||";

/// Values substituted into the post template.
#[derive(Clone, Debug)]
pub struct PostContext<'a> {
    /// Week being announced.
    pub week: u64,
    pub pool: &'a Asset,
    pub rewards: &'a [RewardEntry],
    pub time_winners: &'a [TimeRecord],
    /// Label of the flat token award, e.g. `Gnar Coin`.
    pub token_label: &'a str,
}

/// Fills the `{{table}}`, `{{times_table}}`, `{{week}}`, `{{pool}}` and `{{token}}` slots.
#[derive(Clone, Debug)]
pub struct PostRenderer {
    template: String,
}

impl Default for PostRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PostRenderer {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn render(&self, ctx: &PostContext<'_>) -> String {
        self.template
            .replace("{{table}}", &score_table(ctx))
            .replace("{{times_table}}", &times_table(ctx))
            .replace("{{week}}", &ctx.week.to_string())
            .replace("{{pool}}", &ctx.pool.to_string())
            .replace("{{token}}", ctx.token_label)
    }
}

fn score_table(ctx: &PostContext<'_>) -> String {
    let currency = ctx.pool.symbol();
    ctx.rewards
        .iter()
        .map(|entry| {
            format!(
                "| {} | @{} | {} | {:.2}% | {:.3} {currency} & 1 {} |",
                entry.share.rank,
                entry.share.username,
                entry.share.highscore,
                entry.share.share_percent,
                entry.reward,
                ctx.token_label,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn times_table(ctx: &PostContext<'_>) -> String {
    if ctx.time_winners.is_empty() {
        return NO_TIME_WINNERS.to_string();
    }
    ctx.time_winners
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            format!(
                "| {} | @{} | {} | 1 {} |",
                idx + 1,
                record.username,
                format_duration(record.time),
                ctx.token_label
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `95` renders as `1m 35s`, anything up to a minute as plain seconds.
pub fn format_duration(secs: u64) -> String {
    if secs > 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
