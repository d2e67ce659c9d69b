//! Leaves that finish immediately with a fixed result.

use tbox_event::Loop;

use crate::action::{Action, Behavior, Finisher};

struct FixedBehavior {
	result: bool,
}

impl Behavior for FixedBehavior {
	fn on_start(&mut self, ctx: &Finisher) -> bool {
		ctx.finish(self.result);
		true
	}
}

/// Finishes successfully as soon as it starts.
pub fn succ(ev_loop: &Loop) -> Action {
	Action::new(ev_loop, "Succ", Box::new(FixedBehavior { result: true }))
}

/// Finishes with failure as soon as it starts.
pub fn fail(ev_loop: &Loop) -> Action {
	Action::new(ev_loop, "Fail", Box::new(FixedBehavior { result: false }))
}
