//! Leaf action that waits for a duration.

use std::time::Duration;

use tbox_event::time::{duration_ns, now_ns};
use tbox_event::{Loop, Mode, TimerEvent};

use crate::action::{Action, Behavior, Finisher, Json};

struct SleepBehavior {
	ev_loop: Loop,
	duration: Duration,
	timer: Option<TimerEvent>,
	/// Monotonic deadline of the armed timer; drives pause bookkeeping.
	deadline_ns: u64,
	remaining: Duration,
}

impl SleepBehavior {
	fn arm(&mut self, ctx: &Finisher, interval: Duration) {
		let timer = self.ev_loop.new_timer_event();
		let ctx = ctx.clone();
		timer.set_callback(move || ctx.finish(true));
		timer.initialize(interval, Mode::Oneshot);
		timer.enable();
		self.deadline_ns = now_ns() + duration_ns(interval);
		self.timer = Some(timer);
	}
}

impl Behavior for SleepBehavior {
	fn on_start(&mut self, ctx: &Finisher) -> bool {
		self.remaining = self.duration;
		self.arm(ctx, self.duration);
		true
	}

	fn on_stop(&mut self) {
		self.timer = None;
	}

	fn on_pause(&mut self) {
		self.timer = None;
		self.remaining = Duration::from_nanos(self.deadline_ns.saturating_sub(now_ns()));
	}

	fn on_resume(&mut self, ctx: &Finisher) {
		let remaining = self.remaining;
		self.arm(ctx, remaining);
	}

	fn on_reset(&mut self) {
		self.timer = None;
	}

	fn to_json(&self, doc: &mut serde_json::Map<String, Json>) {
		doc.insert("duration_ms".into(), (self.duration.as_millis() as u64).into());
	}
}

/// Finishes successfully `duration` after starting. Pausing freezes the
/// remaining time.
pub fn sleep(ev_loop: &Loop, duration: Duration) -> Action {
	Action::new(
		ev_loop,
		"Sleep",
		Box::new(SleepBehavior {
			ev_loop: ev_loop.clone(),
			duration,
			timer: None,
			deadline_ns: 0,
			remaining: duration,
		}),
	)
}
