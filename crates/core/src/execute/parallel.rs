//! Parallel executor.
//!
//! Walks the plan in rounds. A round partitions every invoked,
//! not-yet-started target into execution items and launches one branch per
//! item; each branch recurses into the item's dependencies before attempting
//! the claim, so a node reachable over several paths is executed by exactly
//! the first path to arrive while the others wait on the item's gate.
//!
//! Cancellation is cooperative: the abort signal is observed before new work
//! starts, in-flight actions always run to completion, and once the walk
//! stops the sequential executor replays the targets marked assured.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::status::ExecutionStatus;

use super::gate::ArrivalGate;
use super::{RunContext, run_target, sequential};

struct RoundItem {
  targets: Vec<usize>,
  dependencies: Vec<usize>,
  gate: ArrivalGate,
}

pub(crate) async fn walk(ctx: &Arc<RunContext>) {
  loop {
    let pending: Vec<usize> = ctx
      .plan
      .topological_order()
      .iter()
      .copied()
      .filter(|&index| {
        let target = ctx.plan.target(index);
        target.is_invoked() && target.status() == ExecutionStatus::NotRun
      })
      .collect();

    if pending.is_empty() || ctx.aborting() {
      break;
    }

    let round = build_round(ctx, &pending);
    debug!(items = round.len(), targets = pending.len(), "starting parallel round");

    let mut branches = JoinSet::new();
    for index in 0..round.len() {
      branches.spawn(visit(ctx.clone(), round.clone(), index));
    }
    while let Some(joined) = branches.join_next().await {
      if let Err(err) = joined {
        error!(error = %err, "executor branch panicked");
      }
    }

    if ctx.aborting() {
      break;
    }
    // a trigger cascade may have invoked new targets; the next round picks
    // them up
  }

  if ctx.aborting() {
    info!("parallel walk stopped; replaying assured targets sequentially");
    sequential::walk(ctx).await;
  }
}

/// Build the gated items for one round. The gate of each item expects one
/// arrival per distinct visiting path: its own top-level branch plus every
/// path that reaches it through a dependent.
fn build_round(ctx: &RunContext, pending: &[usize]) -> Arc<Vec<RoundItem>> {
  let items = ctx.plan.items_for(pending);

  let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
  for (index, item) in items.iter().enumerate() {
    for &dep in item.dependencies() {
      dependents[dep].push(index);
    }
  }

  // dependencies always point at earlier items, so dependent counts are
  // final when walking back to front
  let mut visits = vec![1usize; items.len()];
  for index in (0..items.len()).rev() {
    visits[index] = 1 + dependents[index].iter().map(|&dependent| visits[dependent]).sum::<usize>();
  }

  Arc::new(
    items
      .into_iter()
      .zip(visits)
      .map(|(item, expected)| RoundItem {
        targets: item.targets().to_vec(),
        dependencies: item.dependencies().to_vec(),
        gate: ArrivalGate::new(expected),
      })
      .collect(),
  )
}

/// One path visiting one item: finish the dependencies, race for the claim,
/// do the work if won, then wait until every other path has arrived.
fn visit(ctx: Arc<RunContext>, round: Arc<Vec<RoundItem>>, index: usize) -> Pin<Box<dyn Future<Output = ()> + Send>> {
  Box::pin(async move {
    let item = &round[index];

    if !item.dependencies.is_empty() {
      let mut branches = JoinSet::new();
      for &dep in &item.dependencies {
        branches.spawn(visit(ctx.clone(), round.clone(), dep));
      }
      while let Some(joined) = branches.join_next().await {
        if let Err(err) = joined {
          error!(error = %err, "executor branch panicked");
        }
      }
    }

    if item.gate.claim() {
      // not-yet-started work is suppressed once the run is aborting;
      // assured targets get their dedicated replay afterwards
      if !ctx.aborting() {
        for &target in &item.targets {
          run_target(&ctx, target).await;
        }
      }
      item.gate.arrive();
    } else {
      item.gate.arrive();
    }

    tokio::select! {
      _ = item.gate.join() => {}
      _ = ctx.cancelled() => {}
    }
  })
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Barrier, Mutex};
  use std::time::Duration;

  use tokio::time::timeout;

  use crate::build::Build;
  use crate::execute::testing::{counting, failing, recording, test_options};
  use crate::execute::{ExecutionMode, RunReport, run_build};
  use crate::status::ExecutionStatus;
  use crate::target::Target;

  fn options() -> crate::execute::ExecuteOptions {
    test_options(ExecutionMode::Parallel)
  }

  async fn run(build: &Build, requested: &[&str]) -> RunReport {
    timeout(Duration::from_secs(30), run_build(build, requested, &options()))
      .await
      .expect("parallel run deadlocked")
      .unwrap()
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn diamond_executes_shared_dependency_once() {
    //     d
    //    / \
    //   b   c
    //    \ /
    //     a
    let counter = Arc::new(AtomicUsize::new(0));
    let shared = Arc::new(AtomicUsize::new(0));
    let build = Build::new("diamond")
      .target(counting("a", &counter).depends_on(["b", "c"]).finish())
      .target(counting("b", &counter).depends_on(["d"]).finish())
      .target(counting("c", &counter).depends_on(["d"]).finish())
      .target(counting("d", &shared).finish());

    let report = run(&build, &["a"]).await;

    assert!(report.is_success());
    assert_eq!(shared.load(Ordering::SeqCst), 1, "shared dependency ran more than once");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    for name in ["a", "b", "c", "d"] {
      assert_eq!(report.target(name).unwrap().status, ExecutionStatus::Succeeded);
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn wide_fan_in_still_executes_each_node_once() {
    let root = Arc::new(AtomicUsize::new(0));
    let counter = Arc::new(AtomicUsize::new(0));
    let mut build = Build::new("fan").target(counting("root", &root).finish());
    for index in 0..6 {
      build = build.target(counting(&format!("mid{index}"), &counter).depends_on(["root"]).finish());
    }
    build = build.target(
      counting("top", &counter)
        .depends_on((0..6).map(|index| format!("mid{index}")))
        .finish(),
    );

    let report = run(&build, &["top"]).await;

    assert!(report.is_success());
    assert_eq!(root.load(Ordering::SeqCst), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 7);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn dependencies_complete_before_dependents_start() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let build = Build::new("order")
      .target(recording("pack", &trace).depends_on(["compile"]).finish())
      .target(recording("compile", &trace).depends_on(["restore"]).finish())
      .target(recording("restore", &trace).finish());

    let report = run(&build, &["pack"]).await;

    assert!(report.is_success());
    assert_eq!(*trace.lock().unwrap(), vec!["restore", "compile", "pack"]);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn independent_branches_overlap() {
    // both actions block until the other arrives; only concurrent
    // execution lets the run finish
    let rendezvous = Arc::new(Barrier::new(2));

    let left = rendezvous.clone();
    let right = rendezvous.clone();
    let build = Build::new("overlap")
      .target(
        Target::named("left")
          .executes(move |_| {
            left.wait();
            Ok(())
          })
          .finish(),
      )
      .target(
        Target::named("right")
          .executes(move |_| {
            right.wait();
            Ok(())
          })
          .finish(),
      );

    let report = run(&build, &["left", "right"]).await;
    assert!(report.is_success());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn failure_cancels_pending_work_and_replays_assured_targets() {
    let counter = Arc::new(AtomicUsize::new(0));
    let build = Build::new("abort")
      .target(failing("deploy").finish())
      .target(counting("verify", &counter).depends_on(["deploy"]).finish())
      .target(
        counting("teardown", &counter)
          .depends_on(["verify"])
          .assured_after_failure()
          .finish(),
      );

    let report = run(&build, &["teardown"]).await;

    assert!(report.aborted);
    assert_eq!(report.target("deploy").unwrap().status, ExecutionStatus::Failed);
    assert_eq!(report.target("verify").unwrap().status, ExecutionStatus::Aborted);
    assert_eq!(report.target("teardown").unwrap().status, ExecutionStatus::Succeeded);
    assert_eq!(report.primary_failure.unwrap().target, "deploy");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn trigger_cascade_runs_in_a_follow_up_round() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let build = Build::new("cascade")
      .target(recording("t", &trace).triggers(["u"]).finish())
      .target(recording("u", &trace).depends_on(["v"]).finish())
      .target(recording("v", &trace).finish());

    let report = run(&build, &["t"]).await;

    assert!(report.is_success());
    assert_eq!(*trace.lock().unwrap(), vec!["t", "v", "u"]);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn order_linked_cohort_runs_in_sequence_inside_one_item() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let build = Build::new("cohort")
      .target(recording("snapshot", &trace).finish())
      .target(recording("migrate", &trace).after(["snapshot"]).finish())
      .target(recording("reindex", &trace).after(["migrate"]).finish());

    let report = run(&build, &["snapshot", "migrate", "reindex"]).await;

    assert!(report.is_success());
    assert_eq!(*trace.lock().unwrap(), vec!["snapshot", "migrate", "reindex"]);
  }
}
