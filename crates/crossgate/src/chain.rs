//! Redirect-chain state machine.
//!
//! The runner's `i` query parameter indexes into a run's steps; this module
//! interprets it as an explicit transition so the sequencing logic is
//! testable without HTTP. The chain is strictly linear: home -> target(i)
//! receiver -> home runner(i+1) -> ... -> done. A rejected step halts the
//! chain; there is no retry path.

use crossgate_common::{RunPlan, RunStep, SsoMode};

/// Next action for a loaded run at step `index`.
#[derive(Debug)]
pub enum Advance<'a> {
    /// Visit `step`'s receiver, then come back to the runner at `next_index`
    Visit {
        step: &'a RunStep,
        next_index: usize,
    },
    /// Step index reached the step count; the run is finished
    Complete,
}

/// Pure transition function: where does a run at `index` go next?
pub fn advance(plan: &RunPlan, index: usize) -> Advance<'_> {
    match plan.steps.get(index) {
        Some(step) => Advance::Visit {
            step,
            next_index: index + 1,
        },
        None => Advance::Complete,
    }
}

/// Runner URL on the home domain for a given step index.
pub fn runner_url(
    scheme: &str,
    home: &str,
    mode: SsoMode,
    run_id: &str,
    index: usize,
    ret: Option<&str>,
    suffix: &str,
    slow: bool,
) -> String {
    let mut url = format!(
        "{scheme}://{home}{path}{suffix}?run={run}&i={index}",
        path = mode.runner_path(),
        run = urlencoding::encode(run_id),
    );
    if let Some(ret) = ret {
        url.push_str("&ret=");
        url.push_str(&urlencoding::encode(ret));
    }
    if slow {
        url.push_str("&slow=1");
    }
    url
}

/// Receiver URL on a step's target domain. Receivers are always addressed
/// over https; the session cookie they set is Secure.
pub fn receiver_url(
    step: &RunStep,
    mode: SsoMode,
    return_url: &str,
    suffix: &str,
    slow: bool,
) -> String {
    let mut url = format!(
        "https://{host}{path}{suffix}?c={code}&return={ret}",
        host = step.host,
        path = mode.receiver_path(),
        code = urlencoding::encode(&step.code),
        ret = urlencoding::encode(return_url),
    );
    if slow {
        url.push_str("&slow=1");
    }
    url
}
