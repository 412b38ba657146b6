//! Hover, then wait for revealed content to settle.
//!
//! Menus rendered on hover give no completion signal. Instead of sleeping a
//! fixed interval, the number of visible probe elements (links by default)
//! is polled until it changes and then holds steady for one interval, or
//! until the budget runs out. A fixed delay of the whole budget is used only
//! when the probe cannot be evaluated.

use crate::renderer::{ElementHandle, RenderContext};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How a settle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The probe count changed and then stabilised.
    Revealed,
    /// Nothing changed within the budget.
    Unchanged,
    /// The probe failed; a fixed delay was used.
    Fallback,
}

/// Hover `element` and wait up to `budget` for the page to react.
///
/// Hover failures are tolerated: the caller carries on with whatever
/// content is already present.
pub async fn hover_and_settle(
    ctx: &dyn RenderContext,
    element: ElementHandle,
    probe: &str,
    budget: Duration,
    poll_interval: Duration,
) -> SettleOutcome {
    let baseline = match ctx.count_visible(probe).await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("reveal probe failed, using fixed delay: {e:#}");
            None
        }
    };

    if let Err(e) = ctx.hover(element).await {
        debug!("hover on {element:?} failed: {e:#}");
    }

    match baseline {
        Some(baseline) => wait_for_change(ctx, probe, baseline, budget, poll_interval).await,
        None => {
            ctx.wait(budget).await;
            SettleOutcome::Fallback
        }
    }
}

async fn wait_for_change(
    ctx: &dyn RenderContext,
    probe: &str,
    baseline: usize,
    budget: Duration,
    poll_interval: Duration,
) -> SettleOutcome {
    let start = Instant::now();
    let mut last = baseline;
    let mut changed = false;

    loop {
        let elapsed = start.elapsed();
        if elapsed >= budget {
            break;
        }
        ctx.wait(poll_interval.min(budget - elapsed)).await;

        match ctx.count_visible(probe).await {
            Ok(n) if n != last => {
                changed |= n != baseline;
                last = n;
            }
            Ok(_) if changed => return SettleOutcome::Revealed,
            Ok(_) => {}
            Err(e) => {
                debug!("reveal probe failed mid-wait: {e:#}");
                break;
            }
        }
    }

    if changed {
        SettleOutcome::Revealed
    } else {
        SettleOutcome::Unchanged
    }
}
