//! Leaf action around a plain closure.

use tbox_event::Loop;

use crate::action::{Action, Behavior, Finisher};

struct FunctionBehavior {
	func: Box<dyn FnMut() -> bool>,
}

impl Behavior for FunctionBehavior {
	fn on_start(&mut self, ctx: &Finisher) -> bool {
		ctx.finish((self.func)());
		true
	}
}

/// Runs `f` on start and finishes immediately with its return value.
pub fn function(ev_loop: &Loop, f: impl FnMut() -> bool + 'static) -> Action {
	Action::new(ev_loop, "Function", Box::new(FunctionBehavior { func: Box::new(f) }))
}
