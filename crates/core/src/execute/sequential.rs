//! Sequential executor.
//!
//! A linear walk of the plan in its deterministic topological order. The
//! walk repeats until quiescent: a trigger cascade can mark a target invoked
//! after the cursor has already passed its position, so a single pass is not
//! enough. The same walk doubles as the recovery pass after an abort:
//! targets marked assured still run, everything else not yet started is
//! marked aborted.

use std::sync::Arc;

use tracing::debug;

use crate::status::ExecutionStatus;

use super::{RunContext, run_target};

pub(crate) async fn walk(ctx: &Arc<RunContext>) {
  let mut pass = 0usize;
  loop {
    let mut progressed = false;

    for &index in ctx.plan.topological_order() {
      let target = ctx.plan.target(index);
      if !target.is_invoked() || target.status() != ExecutionStatus::NotRun {
        continue;
      }
      // a dependency freshly invoked behind the cursor runs next pass
      if !ctx.aborting() && has_pending_dependency(ctx, index) {
        continue;
      }

      run_target(ctx, index).await;
      progressed = true;
    }

    pass += 1;
    if !progressed {
      break;
    }
    debug!(pass, "sequential walk pass complete");
  }
}

fn has_pending_dependency(ctx: &RunContext, index: usize) -> bool {
  ctx.plan.target(index).all_dependencies().iter().any(|&dep| {
    let dep = ctx.plan.target(dep);
    dep.is_invoked() && !dep.status().is_terminal()
  })
}
