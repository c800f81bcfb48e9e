//! Built-in demo programs.
//!
//! Small concurrent programs with known bugs (and one without), used by the
//! `weft` binary and by the integration tests.

use std::sync::Arc;
use weft_runtime::{program, Monitor, Program, Shared, ThreadCtx};
use weft_trace::Value;

/// A named program with a one-line description.
#[derive(Clone)]
pub struct DemoProgram {
    pub name: &'static str,
    pub description: &'static str,
    pub program: Program,
}

impl std::fmt::Debug for DemoProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoProgram")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Every built-in program.
pub fn catalog() -> Vec<DemoProgram> {
    vec![
        DemoProgram {
            name: "racy-counter",
            description: "two workers increment a shared counter without a lock (lost update)",
            program: program(racy_counter),
        },
        DemoProgram {
            name: "locked-counter",
            description: "two workers increment a shared counter under a monitor (correct)",
            program: program(locked_counter),
        },
        DemoProgram {
            name: "lock-order",
            description: "two workers take the same two monitors in opposite order (deadlock)",
            program: program(lock_order),
        },
        DemoProgram {
            name: "join-stall",
            description: "main joins a worker that parks forever (stalled deadlock)",
            program: program(join_stall),
        },
        DemoProgram {
            name: "park-handoff",
            description: "a worker parks until main unparks it (correct, permit semantics)",
            program: program(park_handoff),
        },
        DemoProgram {
            name: "cas-latch",
            description: "two workers claim a latch with compare-and-swap; one wins (correct)",
            program: program(cas_latch),
        },
        DemoProgram {
            name: "mailbox-order",
            description: "main assumes two workers' messages arrive in spawn order (assertion)",
            program: program(mailbox_order),
        },
    ]
}

pub fn find(name: &str) -> Option<DemoProgram> {
    catalog().into_iter().find(|p| p.name == name)
}

fn increment_twice(ctx: &ThreadCtx, guard: Option<Monitor>) -> i64 {
    let counter = Arc::new(Shared::new(ctx, "Counter", "value", 0i64));
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let counter = Arc::clone(&counter);
            ctx.spawn(move |ctx| match guard {
                Some(monitor) => monitor.synchronized(ctx, || {
                    counter.update(ctx, |v| v + 1);
                }),
                None => {
                    counter.update(ctx, |v| v + 1);
                }
            })
        })
        .collect();
    for worker in &workers {
        worker.join(ctx);
    }
    counter.read(ctx)
}

fn racy_counter(ctx: &ThreadCtx) {
    let total = increment_twice(ctx, None);
    ctx.check(total == 2, format!("lost update: counter is {}", total));
}

fn locked_counter(ctx: &ThreadCtx) {
    let monitor = Monitor::new(ctx);
    let total = increment_twice(ctx, Some(monitor));
    ctx.check(total == 2, format!("lost update: counter is {}", total));
}

fn lock_order(ctx: &ThreadCtx) {
    let a = Monitor::new(ctx);
    let b = Monitor::new(ctx);
    let first = ctx.spawn(move |ctx| {
        a.synchronized(ctx, || b.synchronized(ctx, || {}));
    });
    let second = ctx.spawn(move |ctx| {
        b.synchronized(ctx, || a.synchronized(ctx, || {}));
    });
    first.join(ctx);
    second.join(ctx);
}

fn join_stall(ctx: &ThreadCtx) {
    let worker = ctx.spawn(|ctx| ctx.park());
    worker.join(ctx);
}

fn park_handoff(ctx: &ThreadCtx) {
    let ready = Arc::new(Shared::new(ctx, "Handoff", "ready", false));
    let worker = {
        let ready = Arc::clone(&ready);
        ctx.spawn(move |ctx| {
            ctx.park();
            ctx.check(ready.read(ctx), "woken before the flag was set");
        })
    };
    ready.write(ctx, true);
    if let Some(id) = worker.thread() {
        ctx.unpark(id);
    }
    worker.join(ctx);
}

fn cas_latch(ctx: &ThreadCtx) {
    let latch = Arc::new(Shared::new(ctx, "Latch", "taken", false));
    let winners = Arc::new(Shared::new(ctx, "Latch", "winners", 0i64));
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let latch = Arc::clone(&latch);
            let winners = Arc::clone(&winners);
            ctx.spawn(move |ctx| {
                if latch.compare_and_swap(ctx, false, true) {
                    winners.update(ctx, |n| n + 1);
                }
            })
        })
        .collect();
    for w in &workers {
        w.join(ctx);
    }
    let total = winners.read(ctx);
    ctx.check(total == 1, format!("{} workers claimed the latch", total));
}

fn mailbox_order(ctx: &ThreadCtx) {
    let main = ctx.id();
    let senders: Vec<_> = (1..=2i64)
        .map(|n| ctx.spawn(move |ctx| ctx.send(main, n)))
        .collect();
    let first = ctx.receive();
    let second = ctx.receive();
    for s in &senders {
        s.join(ctx);
    }
    ctx.check(
        first == Value::Int(1),
        format!("messages arrived as {}, {}", first, second),
    );
}
