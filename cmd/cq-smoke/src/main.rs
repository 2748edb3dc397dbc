//! Completion Queue End-to-End Smoke Test
//!
//! Exercises the queue engine the way a provider and an application do:
//!   Part A - Open/close: attribute checks, capacity, reference counting
//!   Part B - Producer/consumer: threads writing while a reader blocks
//!   Part C - Errors: markers interleaved with completions, err_data
//!   Part D - Progress: endpoints that only produce when driven
//!   Part E - Wait sets: one wait object shared by several queues
//!
//! Run: RUST_LOG=fabric=debug ./target/release/cq-smoke

use fabric_core::entry::comp_flags;
use fabric_core::{
    BindFlags, CqAttr, CqEntry, CqErrEntry, CqFormat, Domain, DomainCaps, Endpoint, FabricError,
    FidId, TaggedEntry, Version, WaitObjKind, WaitObject, FI_ADDR_NOTAVAIL,
};
use fabric_util::{CompletionQueue, CondWait};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

fn domain(caps: DomainCaps) -> Arc<Domain> {
    Arc::new(Domain::new("smoke", caps, Version::CURRENT))
}

fn entry(ctx: usize) -> TaggedEntry {
    TaggedEntry { op_context: ctx, flags: comp_flags::RECV, len: 64, tag: ctx as u64, ..Default::default() }
}

/// Helper: open or report the failure and bail out of the section.
fn open(t: &mut TestRunner, name: &str, dom: &Arc<Domain>, attr: &CqAttr) -> Option<Arc<CompletionQueue>> {
    match CompletionQueue::open(dom, attr, None, 0) {
        Ok(cq) => { t.pass(name); Some(cq) }
        Err(e) => { t.fail(name, &e.to_string()); None }
    }
}

// ════════════════════════════════════════════════════════════
// Part A: Open / close
// ════════════════════════════════════════════════════════════

fn test_lifecycle(t: &mut TestRunner) {
    t.section("Part A: Open / close");
    let dom = domain(DomainCaps::empty());

    let bad = CqAttr::new().wait_obj(WaitObjKind::Set);
    t.check(
        "reject Set without wait set",
        matches!(CompletionQueue::open(&dom, &bad, None, 0), Err(FabricError::InvalidArgument(_))),
        "open succeeded",
    );
    let bad = CqAttr::new().flags(1 << 3);
    t.check("reject unknown flags", CompletionQueue::open(&dom, &bad, None, 0).is_err(), "open succeeded");
    t.check("domain untouched by failed opens", dom.ref_count() == 0, "domain ref leaked");

    let Some(cq) = open(t, "open size 100", &dom, &CqAttr::new().size(100)) else { return };
    t.check("capacity rounded to 128", cq.capacity() == 128, &format!("capacity {}", cq.capacity()));
    t.check("domain reference taken", dom.ref_count() == 1, "no domain ref");

    cq.acquire_ref();
    t.check("close refused while referenced", matches!(cq.close(), Err(FabricError::Busy)), "close succeeded");
    cq.release_ref();
    t.check("close", cq.close().is_ok(), "close failed");
    t.check("second close is OpBadState", matches!(cq.close(), Err(FabricError::OpBadState)), "no error");
    t.check("domain reference released", dom.ref_count() == 0, "domain ref leaked");
}

// ════════════════════════════════════════════════════════════
// Part B: Producer / consumer
// ════════════════════════════════════════════════════════════

fn test_producer_consumer(t: &mut TestRunner) {
    t.section("Part B: Producer / consumer");
    const PER_PRODUCER: usize = 2000;
    const PRODUCERS: usize = 3;

    for kind in [WaitObjKind::Unspec, WaitObjKind::MutexCond] {
        let dom = domain(DomainCaps::SOURCE);
        let attr = CqAttr::new().size(256).format(CqFormat::Tagged).wait_obj(kind);
        let Some(cq) = open(t, &format!("open {:?} wait", kind), &dom, &attr) else { continue };

        let mut buf = [CqEntry::default(); 1];
        let start = Instant::now();
        let timed_out = cq.sread(&mut buf, 0).map_or_else(|e| e.is_again(), |_| false);
        t.check("sread(0) on empty queue", timed_out && start.elapsed() < Duration::from_millis(100), "did not time out");

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let cq = Arc::clone(&cq);
                thread::spawn(move || {
                    let mut i = 0;
                    while i < PER_PRODUCER {
                        match cq.write_src(entry(p * PER_PRODUCER + i), p as u64) {
                            Ok(()) => i += 1,
                            Err(FabricError::Overrun) => thread::yield_now(),
                            Err(e) => panic!("producer {}: {}", p, e),
                        }
                    }
                })
            })
            .collect();

        let mut buf = [CqEntry::default(); 32];
        let mut addrs = [0u64; 32];
        let mut last = [None::<usize>; PRODUCERS];
        let mut received = 0;
        let mut in_order = true;
        let mut addrs_ok = true;
        while received < PER_PRODUCER * PRODUCERS {
            match cq.sread_from(&mut buf, &mut addrs, 1000) {
                Ok(n) => {
                    for (e, &src) in buf[..n].iter().zip(&addrs[..n]) {
                        let p = e.op_context() / PER_PRODUCER;
                        addrs_ok &= src == p as u64 && e.tag() == Some(e.op_context() as u64);
                        in_order &= last[p].map_or(true, |prev| prev < e.op_context());
                        last[p] = Some(e.op_context());
                    }
                    received += n;
                }
                Err(e) if e.is_again() => {}
                Err(e) => {
                    t.fail("consume", &e.to_string());
                    break;
                }
            }
        }
        for h in handles {
            let _ = h.join();
        }

        t.check("all completions delivered", received == PER_PRODUCER * PRODUCERS, &format!("got {}", received));
        t.check("per-producer FIFO order", in_order, "out of order");
        t.check("source addresses paired", addrs_ok, "address mismatch");

        let waker = Arc::clone(&cq);
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.signal();
        });
        t.check("signal wakes sread(-1)", cq.sread(&mut buf, -1).is_err(), "read returned data");
        let _ = h.join();
        t.check("close", cq.close().is_ok(), "close failed");
    }
}

// ════════════════════════════════════════════════════════════
// Part C: Errors
// ════════════════════════════════════════════════════════════

fn test_errors(t: &mut TestRunner) {
    t.section("Part C: Errors");
    let dom = domain(DomainCaps::empty());
    let attr = CqAttr::new().size(4).format(CqFormat::Tagged);
    let Some(cq) = open(t, "open capacity 4 tagged", &dom, &attr) else { return };

    for i in 1..=3 {
        let _ = cq.write(entry(i));
    }
    let err = CqErrEntry { op_context: 4, err: 5, prov_errno: 77, err_data: b"provider detail".to_vec(), ..Default::default() };
    t.check("write_error", cq.write_error(err).is_ok(), "write_error failed");
    t.check("full ring overruns", matches!(cq.write(entry(5)), Err(FabricError::Overrun)), "write succeeded");

    let mut buf = [CqEntry::default(); 4];
    t.check("read stops before marker", matches!(cq.read(&mut buf), Ok(3)), "wrong count");
    t.check("marker reports ErrorAvailable", matches!(cq.read(&mut buf), Err(FabricError::ErrorAvailable)), "no error");

    let mut e = CqErrEntry { err_data_size: 8, ..Default::default() };
    let ok = cq.read_err(&mut e, 0).is_ok();
    t.check("read_err", ok && e.op_context == 4 && e.prov_errno == 77, "wrong record");
    t.check("err_data truncated to caller size", e.err_data == b"provider", &format!("{:?}", e.err_data));
    println!("       strerror: {}", cq.strerror(e.prov_errno, &e.err_data));
    t.check("queue empty afterwards", cq.read(&mut buf).is_err_and(|e| e.is_again()), "not empty");
    let _ = cq.close();
}

// ════════════════════════════════════════════════════════════
// Part D: Progress
// ════════════════════════════════════════════════════════════

struct LazyEndpoint {
    fid: FidId,
    bound: BindFlags,
    progressed: AtomicUsize,
    pending: Mutex<usize>,
    cq: Mutex<Weak<CompletionQueue>>,
}

impl Endpoint for LazyEndpoint {
    fn fid(&self) -> FidId {
        self.fid
    }

    fn progress(&self) {
        self.progressed.fetch_add(1, Ordering::Relaxed);
        let Some(cq) = self.cq.lock().map(|w| w.upgrade()).ok().flatten() else { return };
        if let Ok(mut pending) = self.pending.lock() {
            while *pending > 0 && cq.write(entry(*pending)).is_ok() {
                *pending -= 1;
            }
        }
    }

    fn cq_bindings(&self) -> BindFlags {
        self.bound
    }
}

fn test_progress(t: &mut TestRunner) {
    t.section("Part D: Progress");
    let dom = domain(DomainCaps::empty());
    let Some(cq) = open(t, "open", &dom, &CqAttr::new().size(16)) else { return };

    let ep = Arc::new(LazyEndpoint {
        fid: FidId::next(),
        bound: BindFlags::empty(),
        progressed: AtomicUsize::new(0),
        pending: Mutex::new(5),
        cq: Mutex::new(Arc::downgrade(&cq)),
    });
    t.check("bind RECV", cq.bind(ep.clone(), BindFlags::RECV.bits()).is_ok(), "bind failed");
    t.check(
        "rebind RECV is duplicate",
        matches!(cq.bind(ep.clone(), BindFlags::RECV.bits()), Err(FabricError::DuplicateBinding)),
        "accepted",
    );
    let taken = Arc::new(LazyEndpoint {
        fid: FidId::next(),
        bound: BindFlags::TRANSMIT,
        progressed: AtomicUsize::new(0),
        pending: Mutex::new(0),
        cq: Mutex::new(Weak::new()),
    });
    t.check(
        "endpoint with TRANSMIT elsewhere rejected",
        matches!(cq.bind(taken, BindFlags::TRANSMIT.bits()), Err(FabricError::DuplicateBinding)),
        "accepted",
    );

    let mut buf = [CqEntry::default(); 16];
    t.check("read drives endpoint progress", matches!(cq.read(&mut buf), Ok(5)), "no completions");
    t.check("progress ran once", ep.progressed.load(Ordering::Relaxed) == 1, "wrong count");

    let mut addrs = [0u64; 16];
    let _ = cq.write(entry(9));
    let n = cq.read_from(&mut buf, &mut addrs).unwrap_or(0);
    t.check("untracked source is NOTAVAIL", n == 1 && addrs[0] == FI_ADDR_NOTAVAIL, "address set");

    t.check("close refused while bound", matches!(cq.close(), Err(FabricError::Busy)), "closed");
    t.check("unbind", cq.unbind(ep.fid).is_ok(), "unbind failed");
    t.check("close", cq.close().is_ok(), "close failed");
}

// ════════════════════════════════════════════════════════════
// Part E: Wait sets
// ════════════════════════════════════════════════════════════

fn test_wait_set(t: &mut TestRunner) {
    t.section("Part E: Wait sets");
    let dom = domain(DomainCaps::empty());
    let set: Arc<dyn WaitObject> = Arc::new(CondWait::new());
    let attr = CqAttr::new().wait_set(Arc::clone(&set));

    let queues: Vec<_> = (1..=3)
        .filter_map(|ctx| CompletionQueue::open(&dom, &attr, None, ctx).ok())
        .collect();
    t.check("three queues share one wait set", set.pollset().len() == 3, "registration failed");
    if queues.len() != 3 {
        return;
    }

    let producer = Arc::clone(&queues[1]);
    let h = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let _ = producer.write(entry(1));
    });
    t.check("wait set wakes on member write", set.wait(2000).is_ok(), "timed out");
    let _ = h.join();

    let mut ready = [0usize; 3];
    let n = set.pollset().poll(&mut ready);
    t.check("poll reports the ready queue", n == 1 && ready[0] == 2, &format!("{:?}", &ready[..n]));

    for cq in &queues {
        let _ = cq.close();
    }
    t.check("closed queues leave the set", set.pollset().is_empty(), "still registered");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .init();

    println!("=== Completion Queue Smoke Test ===");

    let mut t = TestRunner::new();

    test_lifecycle(&mut t);
    test_producer_consumer(&mut t);
    test_errors(&mut t);
    test_progress(&mut t);
    test_wait_set(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
