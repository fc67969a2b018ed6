//! Demo device program
//!
//! Blinks an LED cell from a timer, feeds samples from a producer thread
//! through an [`AsyncFlow`], polls an uptime counter and runs a small
//! coroutine that reports once the first sample has arrived.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use rivulet::prelude::*;
use tracing::info;

const SAMPLE_SEEN: u32 = 0x01;

/// Timer ids used by this program
const BLINK_TIMER: u32 = 1;
const POLL_TIMER: u32 = 2;
const COROUTINE_TIMER: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "rivulet-blink", about = "RIVULET blink demo", version)]
struct Cli {
    /// How long to run the main loop
    #[arg(long, default_value_t = 3_000)]
    duration_ms: u64,

    /// Runtime configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// LED toggle period
    #[arg(long, default_value_t = 250)]
    blink_ms: u64,

    /// Samples produced by the background thread
    #[arg(long, default_value_t = 20)]
    samples: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Report {
    #[default]
    WaitSample,
    Announce,
    Idle,
}

/// Announces the first sample, then checks in every second
struct Reporter;

impl Coroutine for Reporter {
    type Point = Report;

    fn name(&self) -> &str {
        "reporter"
    }

    fn setup(&mut self, _ctx: &mut Context<'_>) {
        info!("Reporter waiting for samples");
    }

    fn step(&mut self, at: Report, ctx: &mut Context<'_>) -> Resume<Report> {
        match at {
            Report::WaitSample => Resume::wait_until(
                ctx.signals().has_bits(SAMPLE_SEEN),
                Report::WaitSample,
                Report::Announce,
            ),
            Report::Announce => {
                info!("First sample seen at {} ms", ctx.now_ms());
                ctx.set_timeout(1_000);
                Resume::yield_to(Report::Idle)
            }
            Report::Idle => {
                if !ctx.timeout() {
                    return Resume::Yield(Report::Idle);
                }
                info!("Reporter alive at {} ms", ctx.now_ms());
                ctx.set_timeout(1_000);
                Resume::Yield(Report::Idle)
            }
        }
    }
}

fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    info!("Starting rivulet-blink {}", rivulet::version());
    let mut scheduler = Scheduler::new(runtime.task("main"))?;

    // LED toggled by a repeating timer
    let led = Rc::new(ValueFlow::on_change("led", false));
    led.on_each(|on| info!("LED {}", if *on { "on" } else { "off" }));
    let blink = scheduler.timer(BLINK_TIMER, cli.blink_ms, true)?;
    let target = led.clone();
    blink.on_each(move |_| target.set(!target.get()));

    // Samples pushed from another thread
    let registry = Rc::new(RefCell::new(CoroutineRegistry::with_config(
        scheduler.clock().clone(),
        runtime.coroutines.clone(),
    )));
    let signals = registry.borrow().signals().clone();
    let samples = scheduler.async_flow::<u32>("samples", 8)?;
    samples.on_each(move |sample| {
        signals.set_bits(SAMPLE_SEEN);
        info!("Sample {}", sample);
    });

    let producer = samples.sender();
    let count = cli.samples;
    std::thread::Builder::new()
        .name("sampler".into())
        .spawn(move || {
            for i in 0..count {
                std::thread::sleep(Duration::from_millis(100));
                producer.push(i * 10);
            }
        })?;

    // Uptime polled periodically
    let started = Instant::now();
    let uptime = Rc::new(LambdaSource::new(move || started.elapsed().as_millis() as u64));
    uptime.on_each(|ms| info!("Uptime {} ms", ms));
    let poller = Poller::new(&mut scheduler, POLL_TIMER, 1_000)?;
    poller.add(uptime);

    // Coroutines ticked every 50 ms
    registry.borrow_mut().register(Reporter);
    registry.borrow_mut().setup_all();
    let tick = scheduler.timer(COROUTINE_TIMER, 50, true)?;
    tick.subscribe(&Rc::new(RegistryTicker::new(registry.clone())));

    scheduler.run_for(Duration::from_millis(cli.duration_ms));

    let stats = scheduler.stats();
    let queue = samples.stats();
    info!(
        "Done: {} iterations, {} timer and {} work dispatches, {} samples delivered",
        stats.iterations, stats.timer_dispatches, stats.work_dispatches, queue.delivered
    );
    Ok(())
}
