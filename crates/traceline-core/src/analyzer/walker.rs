//! Non-recursive fragment traversal with budgets and cancellation.
//!
//! The walker drives a FIFO queue of fragments. For each dequeued fragment it
//! checks the visited set (pointer identity), consults the budgets, pushes a
//! metadata scope, dispatches to the handler table, and restores the scope on
//! every exit path, success and failure alike. A handler either fully processes its
//! fragment (typically walking sub-structures itself, inside whatever
//! metadata it established) or defers, in which case the walker schedules the
//! fragment's structural children breadth-first.
//!
//! When a budget trips or cancellation fires, the walk drains: queued
//! fragments are discarded without dispatch and no new ones are scheduled,
//! leaving a partial but well-formed graph.

use super::handlers::{self, Handled};
use super::Analysis;
use crate::ast::FragmentRef;
use crate::types::{issue_codes, Severity};
use std::collections::VecDeque;
use tracing::{debug, warn};

impl<'a> Analysis<'a> {
    /// Walks `root` and everything reachable from it. Handlers re-enter this
    /// to process nested structures inside their own metadata scope; the
    /// visited set and budgets are shared across re-entries, so each
    /// fragment is processed at most once per script.
    pub(crate) fn walk(&mut self, root: FragmentRef<'_>) {
        let mut queue: VecDeque<FragmentRef<'_>> = VecDeque::new();
        queue.push_back(root);

        while let Some(fragment) = queue.pop_front() {
            if self.should_stop {
                continue;
            }
            if !self.enter(fragment) {
                continue;
            }

            let depth = self.ctx.push_scope();
            let outcome = handlers::dispatch(self, fragment);
            self.ctx.restore_to(depth);

            match outcome {
                Ok(Handled::Yes) => {}
                Ok(Handled::No) => {
                    if !self.should_stop {
                        let mut children = Vec::new();
                        fragment.children(&mut children);
                        queue.extend(children);
                    }
                }
                Err(err) => {
                    warn!(
                        statement = self.statement_index,
                        kind = ?fragment.kind(),
                        error = %err,
                        "handler failed; continuing with siblings"
                    );
                    self.issue(
                        Severity::Warning,
                        issue_codes::HANDLER_FAILURE,
                        format!("handler for {:?} failed: {err}", fragment.kind()),
                    );
                }
            }
        }
    }

    /// Marks a fragment visited without dispatching it. Used by handlers
    /// that consume sub-fragments inline; those fragments still count
    /// against the fragment budget.
    pub(crate) fn mark_visited(&mut self, fragment: FragmentRef<'_>) {
        if self.visited.insert(fragment.addr()) {
            self.fragments_visited += 1;
            self.check_budgets();
        }
    }

    /// Visited/budget gate. Returns false when the fragment must be skipped.
    fn enter(&mut self, fragment: FragmentRef<'_>) -> bool {
        if !self.visited.insert(fragment.addr()) {
            return false;
        }
        self.fragments_visited += 1;
        self.check_budgets();
        !self.should_stop
    }

    /// Trips `should_stop` once when cancellation fires or a budget is
    /// exhausted.
    fn check_budgets(&mut self) {
        if self.should_stop {
            return;
        }
        if self.cancel.is_cancelled() {
            self.should_stop = true;
            debug!(statement = self.statement_index, "analysis cancelled");
            self.issue(
                Severity::Warning,
                issue_codes::CANCELLED,
                "analysis cancelled; graph is partial",
            );
        } else if self.fragments_visited > self.options.max_fragments {
            self.should_stop = true;
            debug!(
                limit = self.options.max_fragments,
                "fragment budget exceeded"
            );
            self.issue(
                Severity::Warning,
                issue_codes::BUDGET_EXCEEDED,
                format!(
                    "fragment budget of {} exceeded; graph is partial",
                    self.options.max_fragments
                ),
            );
        } else if self.started.elapsed() > self.options.time_budget {
            self.should_stop = true;
            debug!(budget = ?self.options.time_budget, "time budget exceeded");
            self.issue(
                Severity::Warning,
                issue_codes::BUDGET_EXCEEDED,
                "time budget exceeded; graph is partial",
            );
        }
    }
}
